//! Command Line Interface module
//!
//! - `core`: building and browsing the catalog (sync, import, search, shows)
//! - `operations`: downloads and ratings
//! - `management`: configuration, cache and status

pub mod core;
pub mod management;
pub mod operations;

pub use self::core::*;
pub use self::management::*;
pub use self::operations::*;
