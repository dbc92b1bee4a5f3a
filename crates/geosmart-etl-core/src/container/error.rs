//! Container write and read errors.
use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use super::schema::SchemaMismatchError;

/// Errors from writing or reading the columnar container.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ContainerError {
    /// The batch or the stored file does not match the expected schema.
    #[snafu(display("Container schema mismatch: {source}"))]
    SchemaMismatch {
        /// What disagreed.
        source: SchemaMismatchError,
    },

    /// Parquet encoding failed.
    #[snafu(display("Failed to write Parquet container: {source}"))]
    ParquetWrite {
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Parquet decoding failed.
    #[snafu(display("Failed to read Parquet container: {source}"))]
    ParquetRead {
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Arrow failed while assembling the result batch.
    #[snafu(display("Arrow error in container: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The embedded schema JSON could not be encoded or decoded.
    #[snafu(display("Invalid embedded container schema JSON: {source}"))]
    SchemaJson {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// A column type has no physical-type mapping.
    #[snafu(display("Column {column} has unsupported Arrow type {data_type}"))]
    UnsupportedType {
        /// The column name.
        column: String,
        /// Arrow type found.
        data_type: String,
    },
}

/// Result alias for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
