//! Shared model for patient charts built from FHIR bundles.
//!
//! The crate holds the typed resource model, the [`Patient`] record produced by
//! the indexer, the flat chart types returned by the views and the error type
//! used across the workspace.

use serde::{Deserialize, Serialize};

pub mod chart;
pub mod model;
pub mod patient;

pub use chart::*;
pub use model::*;
pub use patient::{Patient, ResourceKind, ResourceRef};

/// Options for the clinical notes view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotesConfig {
    /// Decode base64-shaped attachment payloads into text.
    pub decode: bool,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self { decode: true }
    }
}

/// Errors raised while loading bundles and building patients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChartError {
    #[error("failed to retrieve {location}: {message}")]
    Retrieval { location: String, message: String },
    #[error("invalid JSON: {0}")]
    Parse(String),
    #[error("bundle does not contain a Patient resource")]
    MissingPatientResource,
    #[error("no JSON sources found in {0}")]
    NoValidSources(String),
    #[error("all {total} sources failed, first error: {first}")]
    AllSourcesFailed { total: usize, first: String },
}

impl ChartError {
    pub fn retrieval(location: impl Into<String>, message: impl ToString) -> Self {
        Self::Retrieval {
            location: location.into(),
            message: message.to_string(),
        }
    }
}
