//! Declared column semantics (the dataset's column schema).
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use arrow::datatypes::Schema;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::schema::{
    PhysicalType,
    error::{
        CodeColumnCollisionSnafu, DuplicateColumnSnafu, DuplicateGroupSnafu, EmptyGroupSnafu,
        InvalidDomainSnafu, MissingColumnSnafu, NotAnIndicatorSnafu, PinnedPassthroughSnafu,
        SchemaError, SchemaResult, UndeclaredColumnSnafu, UngroupedIndicatorSnafu,
        UnknownGroupMemberSnafu, UnsupportedTypeSnafu,
    },
};

/// Declared legal value range of a continuous column.
///
/// The domain, not the observed data, decides the storage width: a column
/// whose domain is `[0, 4000]` is stored as `uint16` even if one batch only
/// happens to contain values below 256.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NumericDomain {
    /// Smallest legal value (inclusive).
    pub min: f64,
    /// Largest legal value (inclusive).
    pub max: f64,
    /// Whether only whole numbers are legal.
    #[serde(default)]
    pub integral: bool,
}

impl NumericDomain {
    /// An integer-valued domain `[min, max]`.
    pub fn integral(min: i64, max: i64) -> Self {
        Self {
            min: min as f64,
            max: max as f64,
            integral: true,
        }
    }

    /// A real-valued domain `[min, max]`.
    pub fn real(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            integral: false,
        }
    }

    /// Whether `value` lies inside the domain. NaN never does.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Integer bounds of the domain, if it is finite and has at least one
    /// whole number within 64-bit range.
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        const LIMIT: f64 = 18_446_744_073_709_551_615.0;
        if !self.min.is_finite() || !self.max.is_finite() {
            return None;
        }
        let lo = self.min.ceil();
        let hi = self.max.floor();
        if lo > hi || lo < -LIMIT || hi > LIMIT {
            return None;
        }
        Some((lo as i128, hi as i128))
    }

    /// Whether every value of the domain is within the finite `f32` range.
    pub fn fits_f32(&self) -> bool {
        let limit = f32::MAX as f64;
        self.min >= -limit && self.max <= limit
    }

    fn validate(&self, column: &str) -> SchemaResult<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return InvalidDomainSnafu {
                column,
                details: "bounds must be finite",
            }
            .fail();
        }
        if self.min > self.max {
            return InvalidDomainSnafu {
                column,
                details: format!("min {} is greater than max {}", self.min, self.max),
            }
            .fail();
        }
        if self.integral {
            let representable = self
                .integer_bounds()
                .and_then(|(lo, hi)| PhysicalType::smallest_integer_for(lo, hi));
            if representable.is_none() {
                return InvalidDomainSnafu {
                    column,
                    details: "integral domain has no whole number in 64-bit range",
                }
                .fail();
            }
        }
        Ok(())
    }
}

impl fmt::Display for NumericDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.integral {
            write!(f, "[{}, {}] (integral)", self.min, self.max)
        } else {
            write!(f, "[{}, {}]", self.min, self.max)
        }
    }
}

/// What a column means, which decides how each pass treats it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticType {
    /// A numeric measurement with a declared legal domain.
    Continuous {
        /// Legal value range.
        domain: NumericDomain,
    },
    /// A 0/1 flag that belongs to exactly one indicator group.
    BinaryIndicator,
    /// A row identifier, passed through unchanged.
    Identifier,
    /// A prediction target (label), passed through unchanged.
    Target,
}

impl SemanticType {
    /// Identifier and target columns are never narrowed or folded.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, SemanticType::Identifier | SemanticType::Target)
    }

    fn accepts(&self, physical: PhysicalType) -> bool {
        match self {
            SemanticType::Continuous { .. } => physical.is_numeric(),
            SemanticType::BinaryIndicator => physical.is_numeric() || physical == PhysicalType::Bool,
            SemanticType::Identifier | SemanticType::Target => true,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Continuous { domain } => write!(f, "continuous {domain}"),
            SemanticType::BinaryIndicator => write!(f, "binary-indicator"),
            SemanticType::Identifier => write!(f, "identifier"),
            SemanticType::Target => write!(f, "target"),
        }
    }
}

/// Declaration of a single column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    /// Column name as it appears in the dataset.
    pub name: String,
    /// Declared semantic type.
    pub semantic: SemanticType,
    /// Optional storage type forced by the caller instead of the computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<PhysicalType>,
}

impl ColumnSpec {
    /// A continuous column.
    pub fn continuous(name: impl Into<String>, domain: NumericDomain) -> Self {
        Self::with_semantic(name, SemanticType::Continuous { domain })
    }

    /// A binary indicator column.
    pub fn indicator(name: impl Into<String>) -> Self {
        Self::with_semantic(name, SemanticType::BinaryIndicator)
    }

    /// A passthrough identifier column.
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::with_semantic(name, SemanticType::Identifier)
    }

    /// A passthrough target column.
    pub fn target(name: impl Into<String>) -> Self {
        Self::with_semantic(name, SemanticType::Target)
    }

    /// Pin the storage type instead of letting narrowing choose it.
    pub fn with_storage(mut self, storage: PhysicalType) -> Self {
        self.storage = Some(storage);
        self
    }

    fn with_semantic(name: impl Into<String>, semantic: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic,
            storage: None,
        }
    }
}

/// A named block of mutually exclusive indicator columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndicatorGroup {
    /// Group name; the folded code column is named `<name>_code`.
    pub name: String,
    /// Member columns, in code order (member `i` folds to code `i`).
    pub columns: Vec<String>,
}

impl IndicatorGroup {
    /// A group with explicit member names.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// A group whose members are `<prefix><n>` for each `n` in `range`,
    /// such as `Soil_Type1` to `Soil_Type40`.
    pub fn numbered(
        name: impl Into<String>,
        prefix: &str,
        range: std::ops::RangeInclusive<u32>,
    ) -> Self {
        Self::new(name, range.map(|n| format!("{prefix}{n}")))
    }

    /// Name of the folded code column that replaces the members.
    pub fn code_column(&self) -> String {
        format!("{}_code", self.name)
    }
}

/// Serialized form of a [`DatasetLayout`]; validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutDef {
    /// Column declarations in dataset order.
    pub columns: Vec<ColumnSpec>,
    /// Indicator groups.
    #[serde(default)]
    pub groups: Vec<IndicatorGroup>,
}

/// Validated column schema for one dataset version.
///
/// Construction checks the declarations as a whole: unique names, well-formed
/// domains, every indicator in exactly one group, no code column collisions.
/// The layout is immutable afterwards and can be reused across batches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "LayoutDef", into = "LayoutDef")]
pub struct DatasetLayout {
    columns: Vec<ColumnSpec>,
    groups: Vec<IndicatorGroup>,
    by_name: BTreeMap<String, usize>,
}

impl DatasetLayout {
    /// Build and validate a layout.
    pub fn new(columns: Vec<ColumnSpec>, groups: Vec<IndicatorGroup>) -> SchemaResult<Self> {
        let mut by_name = BTreeMap::new();
        for (i, col) in columns.iter().enumerate() {
            if by_name.insert(col.name.clone(), i).is_some() {
                return DuplicateColumnSnafu {
                    column: col.name.clone(),
                }
                .fail();
            }
            if let SemanticType::Continuous { domain } = &col.semantic {
                domain.validate(&col.name)?;
            }
            if col.semantic.is_passthrough() && col.storage.is_some() {
                return PinnedPassthroughSnafu {
                    column: col.name.clone(),
                }
                .fail();
            }
        }

        let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
        let mut group_names = HashSet::new();
        for group in &groups {
            if group.name.trim().is_empty() || group.columns.is_empty() {
                return EmptyGroupSnafu {
                    group: group.name.clone(),
                }
                .fail();
            }
            if !group_names.insert(group.name.as_str()) {
                return DuplicateGroupSnafu {
                    group: group.name.clone(),
                }
                .fail();
            }
            for member in &group.columns {
                let spec = by_name
                    .get(member)
                    .map(|&i| &columns[i])
                    .context(UnknownGroupMemberSnafu {
                        group: &group.name,
                        column: member,
                    })?;
                if spec.semantic != SemanticType::BinaryIndicator {
                    return NotAnIndicatorSnafu {
                        group: group.name.clone(),
                        column: member.clone(),
                    }
                    .fail();
                }
                if let Some(first) = owner.insert(member.as_str(), group.name.as_str()) {
                    return Err(SchemaError::MemberInMultipleGroups {
                        column: member.clone(),
                        first: first.to_string(),
                        second: group.name.clone(),
                    });
                }
            }
        }

        for col in &columns {
            if col.semantic == SemanticType::BinaryIndicator && !owner.contains_key(col.name.as_str())
            {
                return UngroupedIndicatorSnafu {
                    column: col.name.clone(),
                }
                .fail();
            }
        }

        let mut code_columns = HashSet::new();
        for group in &groups {
            let code = group.code_column();
            if by_name.contains_key(&code) || !code_columns.insert(code.clone()) {
                return CodeColumnCollisionSnafu {
                    group: group.name.clone(),
                    column: code,
                }
                .fail();
            }
        }

        Ok(Self {
            columns,
            groups,
            by_name,
        })
    }

    /// Column declarations in declaration order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Indicator groups in declaration order.
    pub fn groups(&self) -> &[IndicatorGroup] {
        &self.groups
    }

    /// Look up a column declaration by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    /// Continuous columns with their domains, in declaration order.
    pub fn continuous(&self) -> impl Iterator<Item = (&str, &NumericDomain)> {
        self.columns.iter().filter_map(|c| match &c.semantic {
            SemanticType::Continuous { domain } => Some((c.name.as_str(), domain)),
            _ => None,
        })
    }

    /// Target columns, in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.semantic == SemanticType::Target)
            .map(|c| c.name.as_str())
    }

    /// Check that `schema` has exactly the declared columns (in any order)
    /// with Arrow types that can carry their semantic types.
    pub fn validate_batch(&self, schema: &Schema) -> SchemaResult<()> {
        let mut seen = HashSet::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let name = field.name();
            if !seen.insert(name.as_str()) {
                return DuplicateColumnSnafu { column: name }.fail();
            }
            let spec = self
                .column(name)
                .context(UndeclaredColumnSnafu { column: name })?;
            let supported = PhysicalType::from_arrow(field.data_type())
                .is_some_and(|physical| spec.semantic.accepts(physical));
            if !supported {
                return UnsupportedTypeSnafu {
                    column: name,
                    data_type: field.data_type().to_string(),
                    semantic: spec.semantic.to_string(),
                }
                .fail();
            }
        }

        for col in &self.columns {
            if !seen.contains(col.name.as_str()) {
                return MissingColumnSnafu {
                    column: col.name.clone(),
                }
                .fail();
            }
        }
        Ok(())
    }
}

impl TryFrom<LayoutDef> for DatasetLayout {
    type Error = SchemaError;

    fn try_from(def: LayoutDef) -> SchemaResult<Self> {
        DatasetLayout::new(def.columns, def.groups)
    }
}

impl From<DatasetLayout> for LayoutDef {
    fn from(layout: DatasetLayout) -> Self {
        LayoutDef {
            columns: layout.columns,
            groups: layout.groups,
        }
    }
}
