/// Export error types and construction helpers
use std::fmt::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for export operations. Every variant is fatal to the
/// enclosing export; nothing here is retried.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Descriptor failed validation before any work started
    #[error("Invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// Scratch directory setup failed
    #[error("Preparation error in {operation}: {reason}")]
    Preparation { operation: String, reason: String },

    /// Image pull or save failed
    #[error("Materialization error in {operation} for {image}: {reason}")]
    Materialization {
        operation: String,
        image: String,
        reason: String,
    },

    /// A package layout step failed
    #[error("Layout error in {operation}: {reason}")]
    Layout { operation: String, reason: String },

    /// A raw resource manifest could not be normalized
    #[error("Normalization error in resource #{resource}: {reason}")]
    Normalization { resource: usize, reason: String },

    /// Archival or compression failed
    #[error("Packaging error in {operation}: {reason}")]
    Packaging { operation: String, reason: String },

    /// A bounded wait ran out of attempts
    #[error("Timed out in {operation} after {attempts} attempts ({waited_ms}ms)")]
    Timeout {
        operation: String,
        attempts: u32,
        waited_ms: u64,
    },
}

impl ExportError {
    pub fn preparation<E: Display>(operation: impl Into<String>) -> impl FnOnce(E) -> Self {
        let operation = operation.into();
        move |err| Self::Preparation {
            operation,
            reason: err.to_string(),
        }
    }

    pub fn layout<E: Display>(operation: impl Into<String>) -> impl FnOnce(E) -> Self {
        let operation = operation.into();
        move |err| Self::Layout {
            operation,
            reason: err.to_string(),
        }
    }

    pub fn packaging<E: Display>(operation: impl Into<String>) -> impl FnOnce(E) -> Self {
        let operation = operation.into();
        move |err| Self::Packaging {
            operation,
            reason: err.to_string(),
        }
    }

    pub fn pull<E: Display>(image: impl Into<String>) -> impl FnOnce(E) -> Self {
        let image = image.into();
        move |err| Self::Materialization {
            operation: "pull".to_string(),
            image,
            reason: err.to_string(),
        }
    }

    pub fn save<E: Display>(image: impl Into<String>) -> impl FnOnce(E) -> Self {
        let image = image.into();
        move |err| Self::Materialization {
            operation: "save".to_string(),
            image,
            reason: err.to_string(),
        }
    }

    /// Stable taxonomy name, used as the `stage` field in logs
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidDescriptor { .. } => "validation",
            Self::Preparation { .. } => "preparation",
            Self::Materialization { .. } => "materialization",
            Self::Layout { .. } => "layout",
            Self::Normalization { .. } => "normalization",
            Self::Packaging { .. } => "packaging",
            Self::Timeout { .. } => "timeout",
        }
    }
}
