//! Utility modules for common functionality
//!
//! - `logging`: tracing subscriber setup
//! - `progress`: indicatif bars and spinners for CLI feedback

pub mod logging;
pub mod progress;
