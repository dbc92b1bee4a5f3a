//! Profile errors.
use arrow::error::ArrowError;
use snafu::prelude::*;

/// Errors from summary extraction and profile rendering.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProfileError {
    /// The rendered profile exceeds its byte budget.
    #[snafu(display("Profile is {size} bytes, over the {limit} byte budget"))]
    ProfileTooLarge {
        /// Rendered size in bytes.
        size: usize,
        /// Configured budget in bytes.
        limit: usize,
    },

    /// JSON rendering failed.
    #[snafu(display("Failed to serialize profile: {source}"))]
    Serialize {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// A persisted profile could not be parsed.
    #[snafu(display("Failed to parse profile JSON: {source}"))]
    Deserialize {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// A column named by the layout or manifest is absent.
    #[snafu(display("Column {column} is missing from the dataset"))]
    MissingColumn {
        /// The missing column.
        column: String,
    },

    /// A code column holds a value outside its group's code domain.
    #[snafu(display("Group {group}: invalid code {code} at row {row}"))]
    InvalidCode {
        /// The group name.
        group: String,
        /// Zero-based row index.
        row: usize,
        /// The offending code.
        code: i64,
    },

    /// Target columns must hold integer labels.
    #[snafu(display("Target column {column} has non-integer type {data_type}"))]
    UnsupportedLabelType {
        /// The target column.
        column: String,
        /// Arrow type found in the batch.
        data_type: String,
    },

    /// An Arrow cast failed.
    #[snafu(display("Failed to read column {column}: {source}"))]
    Arrow {
        /// The column being read.
        column: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Result alias for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;
