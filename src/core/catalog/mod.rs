//! Catalog building: normalization, grouping, import, sync and ratings.

pub mod grouping;
pub mod importer;
pub mod normalize;
pub mod progress;
pub mod ratings;
pub mod sync;

pub use importer::{CatalogImporter, ImportStats};
pub use progress::{ProgressTracker, SyncPhase, SyncProgress};
pub use sync::{CatalogSync, SyncStats};
