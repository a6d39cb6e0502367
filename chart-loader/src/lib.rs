//! Loading FHIR bundles from URLs or files and indexing them into patients.
//!
//! [`BundleLoader`] fetches through a [`Fetch`] implementation, so callers
//! can swap the HTTP/filesystem [`SourceFetcher`] for their own source.

use chart_core::{ChartError, Patient};

mod batch;
pub mod discovery;
pub mod fetch;

pub use batch::{
    BundleLoader, LoadConfig, LoadReport, LoadSummary, Progress, ProgressFn, SourceError, Sources,
};
pub use fetch::{Fetch, SourceFetcher};

/// Loads one bundle from a URL or file path.
pub async fn load_one(location: &str) -> Result<Patient, ChartError> {
    BundleLoader::<SourceFetcher>::default()
        .load_one(location)
        .await
}

/// Loads many bundles with the default [`SourceFetcher`].
pub async fn load_many(sources: Sources, config: LoadConfig) -> Result<LoadReport, ChartError> {
    BundleLoader::<SourceFetcher>::default()
        .load_many(sources, config)
        .await
}
