//! Core engine for the GeoSmart ETL pipeline.
//!
//! This crate turns a wide, sparse tabular dataset (terrain features with
//! large one-hot blocks, such as the forest cover-type dataset) into two
//! artifacts:
//!
//! - A memory-minimized columnar dataset: every column is downcast to the
//!   narrowest width its declared domain allows (`narrowing` module) and
//!   every one-hot indicator block is folded into a single code column
//!   (`folding` module), then written to Parquet with an embedded logical
//!   schema (`container` module).
//! - A bounded-size statistical profile (`profile` module) that downstream
//!   AI tooling reads instead of the raw rows (`insight` module).
//!
//! Column semantics are declared once in a validated [`schema::DatasetLayout`].
//! Storage and the AI completion client are capability traits
//! ([`storage::ObjectStore`], [`insight::InferenceClient`]) so the pipeline
//! (`pipeline` module) can run against in-memory fakes in tests.
#![deny(missing_docs)]
pub mod container;
pub mod folding;
pub mod forest;
pub mod insight;
pub mod narrowing;
pub mod parallel;
pub mod pipeline;
pub mod profile;
pub mod schema;
pub mod standardize;
pub mod storage;

pub use container::{ContainerError, ContainerSchema, SchemaMismatchError};
pub use folding::{FoldError, FoldManifest, FoldPolicy};
pub use narrowing::{NarrowingError, NarrowingOptions};
pub use pipeline::{DatasetVersion, EtlConfig, EtlPipeline, EtlReport, PipelineError};
pub use profile::{Profile, ProfileError};
pub use schema::{
    ColumnSpec, DatasetLayout, IndicatorGroup, NumericDomain, PhysicalType, SchemaError,
    SemanticType,
};
pub use storage::{LocalStore, MemoryStore, ObjectStore, StorageError};
