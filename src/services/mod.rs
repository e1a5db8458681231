//! Service wiring
//!
//! - `ServiceFactory`: builds clients, caches and core services from `Config`
//! - `SimpleServices`: per-command container sharing one database handle

pub mod factory;
pub mod simple_container;

pub use factory::ServiceFactory;
pub use simple_container::SimpleServices;
