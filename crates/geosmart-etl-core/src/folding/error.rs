//! Folding errors.
use arrow::error::ArrowError;
use snafu::prelude::*;

/// Errors from folding indicator groups into code columns and back.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FoldError {
    /// A group member or code column is absent from the batch.
    #[snafu(display("Group {group}: column {column} is missing from the batch"))]
    MissingColumn {
        /// The group being folded or unfolded.
        group: String,
        /// The missing column.
        column: String,
    },

    /// A member column is not an integer or boolean column.
    #[snafu(display("Group {group}: member {column} has non-integer type {data_type}"))]
    UnsupportedMember {
        /// The group name.
        group: String,
        /// The member column.
        column: String,
        /// Arrow type found in the batch.
        data_type: String,
    },

    /// A member column holds something other than 0 or 1.
    #[snafu(display("Group {group}: member {column} {detail}"))]
    RangeOverflow {
        /// The group name.
        group: String,
        /// The member column.
        column: String,
        /// What was found.
        detail: String,
    },

    /// Under the strict policy, a row does not have exactly one active member.
    #[snafu(display("Group {group}: row {row} has {active} active members, expected exactly 1"))]
    InvariantViolation {
        /// The group name.
        group: String,
        /// Zero-based row index.
        row: usize,
        /// Number of active members found in the row.
        active: usize,
    },

    /// A code column holds a value that maps to no member and is not the sentinel.
    #[snafu(display("Group {group}: invalid code at row {row}: {detail}"))]
    InvalidCode {
        /// The group name.
        group: String,
        /// Zero-based row index.
        row: usize,
        /// What was found.
        detail: String,
    },

    /// The fold manifest does not describe the batch it is applied to.
    #[snafu(display("Corrupt fold manifest: {detail}"))]
    CorruptManifest {
        /// What is inconsistent.
        detail: String,
    },

    /// An Arrow kernel or batch assembly failed.
    #[snafu(display("Arrow error while folding: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Result alias for folding operations.
pub type FoldResult<T> = Result<T, FoldError>;
