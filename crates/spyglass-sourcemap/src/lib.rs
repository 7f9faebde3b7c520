//! Source map v3 support.
//!
//! [`SourceMap`] parses a map payload and answers generated -> original and
//! original -> generated lookups. [`SourceMapCache`] deduplicates concurrent
//! loads of the same map URL, and [`SourceMapFetcher`] is the async seam that
//! actually retrieves map text.

mod cache;
mod fetch;
mod map;
mod vlq;

use thiserror::Error;

pub use cache::{CacheLookup, SourceMapCache};
pub use fetch::{FetchError, LocalFetcher, SourceMapFetcher};
pub use map::{complete_url, MappingEntry, OriginalLocation, SourceMap};

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("invalid source map json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid base64 VLQ at offset {offset}")]
    InvalidVlq { offset: usize },
    #[error("mapping segment at offset {offset} points outside the valid range")]
    InvalidMapping { offset: usize },
}
