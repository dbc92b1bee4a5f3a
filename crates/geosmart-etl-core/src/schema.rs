//! Column semantics and physical storage types.
//!
//! A [`DatasetLayout`] declares, once per dataset version, what every column
//! means (continuous measurement, binary indicator, identifier, target) and
//! which indicator columns form one-hot groups. It is validated on
//! construction and then checked against each incoming batch before any
//! transformation runs, so type problems surface as a single upfront
//! [`SchemaError`] instead of failures deep inside a pass.
pub mod error;
pub mod layout;
pub mod physical;

pub use error::SchemaError;
pub use layout::{ColumnSpec, DatasetLayout, IndicatorGroup, LayoutDef, NumericDomain, SemanticType};
pub use physical::PhysicalType;
