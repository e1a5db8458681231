//! Commands that reach out to Archive.org for files and reviews.

pub mod download;
pub mod ratings;
