//! Management commands: configuration, metadata cache and catalog status.

pub mod cache;
pub mod config;
pub mod status;
