//! Layout and schema validation errors.
use snafu::prelude::*;

/// Errors raised while building a [`DatasetLayout`](crate::schema::DatasetLayout)
/// or checking a batch against it.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// The same column name is declared twice.
    #[snafu(display("Duplicate column declaration: {column}"))]
    DuplicateColumn {
        /// The duplicated column name.
        column: String,
    },

    /// The batch contains a column the layout does not declare.
    #[snafu(display("Column {column} is not declared in the dataset layout"))]
    UndeclaredColumn {
        /// The undeclared column name.
        column: String,
    },

    /// A declared column is absent from the batch.
    #[snafu(display("Declared column {column} is missing from the dataset"))]
    MissingColumn {
        /// The missing column name.
        column: String,
    },

    /// The column's Arrow type cannot carry the declared semantic type.
    #[snafu(display("Column {column} has unsupported type {data_type} for a {semantic} column"))]
    UnsupportedType {
        /// The column name.
        column: String,
        /// The Arrow data type found in the batch.
        data_type: String,
        /// Semantic kind declared for the column.
        semantic: String,
    },

    /// A continuous domain is empty, unbounded or otherwise malformed.
    #[snafu(display("Invalid numeric domain for column {column}: {details}"))]
    InvalidDomain {
        /// The column name.
        column: String,
        /// Human-readable description of the problem.
        details: String,
    },

    /// Identifier and target columns are stored as-is and cannot pin a width.
    #[snafu(display("Column {column} is passed through unchanged and cannot pin a storage type"))]
    PinnedPassthrough {
        /// The column name.
        column: String,
    },

    /// Two indicator groups share a name.
    #[snafu(display("Duplicate indicator group name: {group}"))]
    DuplicateGroup {
        /// The duplicated group name.
        group: String,
    },

    /// An indicator group has no members or an empty name.
    #[snafu(display("Indicator group '{group}' must have a name and at least one member"))]
    EmptyGroup {
        /// The offending group name.
        group: String,
    },

    /// A group member is not declared in the layout.
    #[snafu(display("Indicator group {group} references undeclared column {column}"))]
    UnknownGroupMember {
        /// The group name.
        group: String,
        /// The undeclared member column.
        column: String,
    },

    /// A group member is declared with a non-indicator semantic type.
    #[snafu(display("Column {column} in group {group} is not declared as a binary indicator"))]
    NotAnIndicator {
        /// The group name.
        group: String,
        /// The member column.
        column: String,
    },

    /// A column appears in more than one group (or twice in one group).
    #[snafu(display("Indicator column {column} is listed in both {first} and {second}"))]
    MemberInMultipleGroups {
        /// The member column.
        column: String,
        /// The first group that lists it.
        first: String,
        /// The second group that lists it.
        second: String,
    },

    /// A binary indicator column does not belong to any group.
    #[snafu(display("Binary indicator column {column} does not belong to any indicator group"))]
    UngroupedIndicator {
        /// The indicator column.
        column: String,
    },

    /// The folded code column name clashes with an existing column.
    #[snafu(display("Folded code column {column} of group {group} collides with another column"))]
    CodeColumnCollision {
        /// The group name.
        group: String,
        /// The colliding code column name.
        column: String,
    },
}

/// A convenience type alias for schema validation results.
pub type SchemaResult<T> = Result<T, SchemaError>;
