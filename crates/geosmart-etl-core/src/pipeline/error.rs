//! Pipeline error type wrapping every stage.
use snafu::prelude::*;

use crate::{
    container::ContainerError, folding::FoldError, insight::InsightError,
    narrowing::NarrowingError, profile::ProfileError, schema::SchemaError,
    standardize::StandardizeError, storage::StorageError,
};

/// Errors surfaced by [`super::EtlPipeline`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// The configuration document could not be parsed.
    #[snafu(display("Invalid pipeline configuration: {source}"))]
    Config {
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The layout or the batch shape is invalid.
    #[snafu(display("Schema error: {source}"))]
    Schema {
        /// Underlying schema error.
        source: SchemaError,
    },

    /// A dataset version string is not usable as a key segment.
    #[snafu(display("Invalid dataset version {version:?}: {reason}"))]
    InvalidVersion {
        /// The rejected version.
        version: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The version has an artifact but no profile, or nothing at all.
    #[snafu(display("Dataset version {version} is not committed: {source}"))]
    Uncommitted {
        /// The requested version.
        version: String,
        /// Error from fetching the profile.
        source: StorageError,
    },

    /// The version already has a profile; committed versions are immutable.
    #[snafu(display("Dataset version {version} is already committed"))]
    AlreadyCommitted {
        /// The requested version.
        version: String,
    },

    /// Type narrowing failed.
    #[snafu(display("Narrowing failed: {source}"))]
    Narrowing {
        /// Underlying narrowing error.
        source: NarrowingError,
    },

    /// One-hot folding failed.
    #[snafu(display("Folding failed: {source}"))]
    Fold {
        /// Underlying fold error.
        source: FoldError,
    },

    /// Profile extraction or rendering failed.
    #[snafu(display("Profile failed: {source}"))]
    Profile {
        /// Underlying profile error.
        source: ProfileError,
    },

    /// Standardization failed.
    #[snafu(display("Standardization failed: {source}"))]
    Standardize {
        /// Underlying standardization error.
        source: StandardizeError,
    },

    /// Writing or reading the columnar container failed.
    #[snafu(display("Container error: {source}"))]
    Container {
        /// Underlying container error.
        source: ContainerError,
    },

    /// The object store failed.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// The AI insight request failed.
    #[snafu(display("Insight request failed: {source}"))]
    Insight {
        /// Underlying insight error.
        source: InsightError,
    },
}

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = Result<T, PipelineError>;
