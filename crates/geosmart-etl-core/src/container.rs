//! Columnar container: Parquet bytes with an embedded logical schema.
//!
//! The writer stores the [`ContainerSchema`] (physical types, nullability and
//! the fold manifest) as JSON in the Parquet key/value metadata. The reader
//! refuses any file whose embedded schema, or whose own Arrow schema, differs
//! from what the caller expects. Both sides work on in-memory bytes; moving
//! the bytes is the storage layer's job.
pub mod error;
pub mod schema;

use std::sync::Arc;

use arrow::{array::RecordBatch, compute::concat_batches, datatypes::Schema};
use bytes::Bytes;
use log::debug;
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::{Compression, ZstdLevel},
    file::{metadata::KeyValue, properties::WriterProperties},
};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use error::{ContainerError, ContainerResult};
pub use schema::{
    CONTAINER_FORMAT_VERSION, ContainerField, ContainerSchema, SCHEMA_METADATA_KEY,
    SchemaMismatchError, ensure_exact_match,
};

use error::{ArrowSnafu, ParquetReadSnafu, ParquetWriteSnafu, SchemaJsonSnafu, SchemaMismatchSnafu};
use schema::{ArrowSchemaDisagreesSnafu, MissingEmbeddedSchemaSnafu};

/// Page compression codec.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContainerCompression {
    /// Zstandard, default level.
    #[default]
    Zstd,
    /// Snappy.
    Snappy,
    /// No compression.
    None,
}

impl ContainerCompression {
    fn to_parquet(self) -> Compression {
        match self {
            ContainerCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ContainerCompression::Snappy => Compression::SNAPPY,
            ContainerCompression::None => Compression::UNCOMPRESSED,
        }
    }
}

/// Writer settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerOptions {
    /// Page compression.
    pub compression: ContainerCompression,
    /// Largest row group, in rows.
    pub max_row_group_rows: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            compression: ContainerCompression::Zstd,
            max_row_group_rows: 65_536,
        }
    }
}

/// Encode `batch` as Parquet with `schema` embedded.
///
/// The batch must match `schema` exactly.
pub fn write_container(
    batch: &RecordBatch,
    schema: &ContainerSchema,
    options: &ContainerOptions,
) -> ContainerResult<Bytes> {
    let actual = ContainerSchema::for_batch(&batch.schema(), &schema.folds)?;
    ensure_exact_match(schema, &actual).context(SchemaMismatchSnafu)?;

    let json = serde_json::to_string(schema).context(SchemaJsonSnafu)?;
    let props = WriterProperties::builder()
        .set_compression(options.compression.to_parquet())
        .set_max_row_group_size(options.max_row_group_rows.max(1))
        .set_key_value_metadata(Some(vec![KeyValue::new(
            SCHEMA_METADATA_KEY.to_string(),
            json,
        )]))
        .build();

    let mut writer =
        ArrowWriter::try_new(Vec::new(), batch.schema(), Some(props)).context(ParquetWriteSnafu)?;
    writer.write(batch).context(ParquetWriteSnafu)?;
    let buf = writer.into_inner().context(ParquetWriteSnafu)?;
    debug!(
        "wrote container: {} rows, {} columns, {} bytes",
        batch.num_rows(),
        batch.num_columns(),
        buf.len()
    );
    Ok(Bytes::from(buf))
}

/// Read the embedded schema from the file footer without decoding any rows.
pub fn inspect_container(bytes: &Bytes) -> ContainerResult<ContainerSchema> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.clone()).context(ParquetReadSnafu)?;
    embedded_schema(&builder)
}

/// Decode a container, checking it against the expected schema first.
///
/// The returned batch carries exactly the physical types, nullability and
/// code columns that were written.
pub fn read_container(bytes: &Bytes, expected: &ContainerSchema) -> ContainerResult<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.clone()).context(ParquetReadSnafu)?;
    let embedded = embedded_schema(&builder)?;
    ensure_exact_match(expected, &embedded).context(SchemaMismatchSnafu)?;

    let stored = ContainerSchema::for_batch(builder.schema(), &embedded.folds)?;
    ensure_exact_match(&embedded, &stored)
        .map_err(|e| {
            ArrowSchemaDisagreesSnafu {
                details: e.to_string(),
            }
            .build()
        })
        .context(SchemaMismatchSnafu)?;

    let reader_schema = Arc::clone(builder.schema());
    let reader = builder.build().context(ParquetReadSnafu)?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(ArrowSnafu)?;
    let merged = concat_batches(&reader_schema, &batches).context(ArrowSnafu)?;

    // Drop the Parquet key/value metadata from the result schema.
    let clean = Arc::new(Schema::new(reader_schema.fields().clone()));
    RecordBatch::try_new(clean, merged.columns().to_vec()).context(ArrowSnafu)
}

fn embedded_schema(
    builder: &ParquetRecordBatchReaderBuilder<Bytes>,
) -> ContainerResult<ContainerSchema> {
    let json = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == SCHEMA_METADATA_KEY))
        .and_then(|kv| kv.value.as_deref())
        .context(MissingEmbeddedSchemaSnafu {
            key: SCHEMA_METADATA_KEY,
        })
        .context(SchemaMismatchSnafu)?;
    serde_json::from_str(json).context(SchemaJsonSnafu)
}
