//! Catalog commands: fill the local catalog and browse it.

pub mod browse;
pub mod import;
pub mod search;
pub mod sync;
