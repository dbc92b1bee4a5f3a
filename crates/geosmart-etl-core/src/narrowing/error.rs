//! Errors raised while narrowing column widths.
use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::schema::SchemaError;

/// Errors from the type-narrowing pass.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NarrowingError {
    /// The batch does not match the declared layout.
    #[snafu(display("Batch does not match the dataset layout: {source}"))]
    Schema {
        /// Underlying layout validation error.
        source: SchemaError,
    },

    /// A narrowed or passthrough column contains nulls.
    #[snafu(display("Column {column} contains {count} null value(s)"))]
    NullValues {
        /// The offending column.
        column: String,
        /// Number of null slots found.
        count: usize,
    },

    /// A value (or the declared domain) does not fit the chosen storage type.
    #[snafu(display("Column {column} cannot be narrowed: {detail}"))]
    RangeOverflow {
        /// The offending column.
        column: String,
        /// What did not fit.
        detail: String,
    },

    /// The column's Arrow type has no physical-type mapping.
    #[snafu(display("Column {column} has unsupported Arrow type {data_type}"))]
    UnsupportedType {
        /// The offending column.
        column: String,
        /// Arrow type found in the batch.
        data_type: String,
    },

    /// A column named in a narrowing plan is absent from the batch.
    #[snafu(display("Column {column} from the narrowing plan is missing from the batch"))]
    MissingColumn {
        /// The missing column name.
        column: String,
    },

    /// Arrow failed to cast a column.
    #[snafu(display("Failed to cast column {column}: {source}"))]
    Cast {
        /// The column being cast.
        column: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Arrow rejected the reassembled batch.
    #[snafu(display("Failed to assemble narrowed batch: {source}"))]
    Assemble {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Result alias for the narrowing pass.
pub type NarrowingResult<T> = Result<T, NarrowingError>;
