//! Logical schema embedded in every container, and exact-match checking.
//!
//! Rule: **no schema evolution**. A reader states the schema it expects and
//! the stored file must match it exactly: same columns in the same order,
//! same physical types and nullability, same fold manifest.
use std::{collections::HashMap, fmt};

use arrow::datatypes::{Field, Schema};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{folding::FoldManifest, schema::PhysicalType};

use super::error::{ContainerResult, UnsupportedTypeSnafu};

/// Version of the embedded schema layout.
pub const CONTAINER_FORMAT_VERSION: u32 = 1;

/// Parquet key/value metadata entry holding the JSON [`ContainerSchema`].
pub const SCHEMA_METADATA_KEY: &str = "geosmart.container_schema";

/// One stored column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerField {
    /// Column name.
    pub name: String,
    /// Physical type.
    pub data_type: PhysicalType,
    /// Whether nulls are allowed.
    pub nullable: bool,
}

impl fmt::Display for ContainerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let null = if self.nullable { "null" } else { "not null" };
        write!(f, "{}: {} {null}", self.name, self.data_type)
    }
}

/// Logical description of a stored dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSchema {
    /// Embedded schema layout version.
    pub format_version: u32,
    /// Columns in storage order.
    pub columns: Vec<ContainerField>,
    /// Folds applied before storage.
    pub folds: FoldManifest,
}

impl ContainerSchema {
    /// Derive the container schema of a batch with the given Arrow schema.
    pub fn for_batch(schema: &Schema, folds: &FoldManifest) -> ContainerResult<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let data_type = PhysicalType::from_arrow(field.data_type()).context(
                    UnsupportedTypeSnafu {
                        column: field.name(),
                        data_type: field.data_type().to_string(),
                    },
                )?;
                Ok(ContainerField {
                    name: field.name().clone(),
                    data_type,
                    nullable: field.is_nullable(),
                })
            })
            .collect::<ContainerResult<Vec<_>>>()?;
        Ok(Self {
            format_version: CONTAINER_FORMAT_VERSION,
            columns,
            folds: folds.clone(),
        })
    }

    /// Arrow schema with the stored physical types.
    pub fn to_arrow(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(&c.name, c.data_type.to_arrow(), c.nullable))
                .collect::<Vec<_>>(),
        )
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ContainerField> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Ways a stored container can disagree with the expected schema.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaMismatchError {
    /// The file carries no embedded container schema.
    #[snafu(display("Container has no embedded schema under key {key}"))]
    MissingEmbeddedSchema {
        /// The metadata key looked up.
        key: String,
    },

    /// The embedded schema layout version differs.
    #[snafu(display("Container format version {found} does not match expected {expected}"))]
    FormatVersion {
        /// Version the reader expects.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// An expected column is absent.
    #[snafu(display("Container is missing column {column}"))]
    MissingColumn {
        /// The missing column.
        column: String,
    },

    /// The container has a column the reader does not expect.
    #[snafu(display("Container has unexpected column {column}"))]
    ExtraColumn {
        /// The extra column.
        column: String,
    },

    /// A column's physical type differs.
    #[snafu(display("Type mismatch for column {column}: expected {expected}, found {found}"))]
    TypeMismatch {
        /// The column name.
        column: String,
        /// Expected physical type.
        expected: PhysicalType,
        /// Stored physical type.
        found: PhysicalType,
    },

    /// A column's nullability differs.
    #[snafu(display(
        "Nullability mismatch for column {column}: expected nullable={expected}, found nullable={found}"
    ))]
    NullabilityMismatch {
        /// The column name.
        column: String,
        /// Expected nullability.
        expected: bool,
        /// Stored nullability.
        found: bool,
    },

    /// Columns are present but in a different order.
    #[snafu(display("Column order differs at position {position}: expected {expected}, found {found}"))]
    ColumnOrder {
        /// Zero-based position.
        position: usize,
        /// Expected column at that position.
        expected: String,
        /// Stored column at that position.
        found: String,
    },

    /// The stored fold manifest differs.
    #[snafu(display("Fold manifest mismatch: {details}"))]
    FoldManifest {
        /// What differs.
        details: String,
    },

    /// The Parquet file's own Arrow schema contradicts the embedded schema.
    #[snafu(display("Stored Arrow schema disagrees with embedded schema: {details}"))]
    ArrowSchemaDisagrees {
        /// What differs.
        details: String,
    },
}

fn columns_by_name(schema: &ContainerSchema) -> HashMap<&str, &ContainerField> {
    schema
        .columns
        .iter()
        .map(|col| (col.name.as_str(), col))
        .collect()
}

/// Enforce an exact match between the expected and the stored schema.
///
/// - Every expected column must be stored, and nothing else.
/// - Type and nullability must match exactly.
/// - Columns must appear in the same order.
/// - The fold manifests must be identical.
pub fn ensure_exact_match(
    expected: &ContainerSchema,
    found: &ContainerSchema,
) -> Result<(), SchemaMismatchError> {
    ensure!(
        expected.format_version == found.format_version,
        FormatVersionSnafu {
            expected: expected.format_version,
            found: found.format_version,
        }
    );

    let found_cols = columns_by_name(found);
    for want in &expected.columns {
        let have = found_cols
            .get(want.name.as_str())
            .context(MissingColumnSnafu { column: &want.name })?;
        ensure!(
            want.data_type == have.data_type,
            TypeMismatchSnafu {
                column: &want.name,
                expected: want.data_type,
                found: have.data_type,
            }
        );
        ensure!(
            want.nullable == have.nullable,
            NullabilityMismatchSnafu {
                column: &want.name,
                expected: want.nullable,
                found: have.nullable,
            }
        );
    }

    let expected_cols = columns_by_name(expected);
    if let Some(extra) = found
        .columns
        .iter()
        .find(|c| !expected_cols.contains_key(c.name.as_str()))
    {
        return ExtraColumnSnafu {
            column: &extra.name,
        }
        .fail();
    }

    for (position, (want, have)) in expected.columns.iter().zip(&found.columns).enumerate() {
        ensure!(
            want.name == have.name,
            ColumnOrderSnafu {
                position,
                expected: &want.name,
                found: &have.name,
            }
        );
    }

    if expected.folds != found.folds {
        let expected_groups: Vec<&str> = expected.folds.groups.iter().map(|g| g.name.as_str()).collect();
        let found_groups: Vec<&str> = found.folds.groups.iter().map(|g| g.name.as_str()).collect();
        let details = if expected_groups != found_groups {
            format!("expected groups {expected_groups:?}, found {found_groups:?}")
        } else {
            "group members, positions or code types differ".to_string()
        };
        return FoldManifestSnafu { details }.fail();
    }
    Ok(())
}
