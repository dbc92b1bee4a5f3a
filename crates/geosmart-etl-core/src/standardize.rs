//! Optional z-score scaling of continuous features.
//!
//! Scaling uses the profile's mean and population standard deviation, so it
//! never rescans the data. A zero deviation scales by one, leaving only the
//! centering. Scaled columns are `float32` and nullable-ness is preserved.
use std::{collections::HashSet, sync::Arc};

use arrow::{
    array::{Array, AsArray, Float32Array, RecordBatch},
    compute::cast,
    datatypes::{DataType, Field, Float64Type, Schema},
    error::ArrowError,
};
use snafu::prelude::*;

use crate::profile::Profile;

/// Errors from standardization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StandardizeError {
    /// A column to scale has no summary in the profile.
    #[snafu(display("Column {column} has no statistics in the profile"))]
    MissingStatistics {
        /// The column name.
        column: String,
    },

    /// A column to scale is absent from the batch.
    #[snafu(display("Column {column} is missing from the batch"))]
    MissingColumn {
        /// The column name.
        column: String,
    },

    /// Arrow failed to cast or assemble.
    #[snafu(display("Arrow error while standardizing {column}: {source}"))]
    Arrow {
        /// The column being processed.
        column: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Z-score every column in `columns`; other columns are kept as they are.
pub fn standardize(
    batch: &RecordBatch,
    profile: &Profile,
    columns: &[&str],
) -> Result<RecordBatch, StandardizeError> {
    let schema = batch.schema();
    for &column in columns {
        ensure!(
            schema.index_of(column).is_ok(),
            MissingColumnSnafu { column }
        );
    }
    let wanted: HashSet<&str> = columns.iter().copied().collect();

    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays = Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name().as_str();
        if !wanted.contains(name) {
            fields.push(field.as_ref().clone());
            arrays.push(Arc::clone(array));
            continue;
        }
        let summary = profile
            .column(name)
            .context(MissingStatisticsSnafu { column: name })?;
        let mean = summary.mean.unwrap_or(0.0);
        let scale = match summary.population_std_dev() {
            Some(s) if s > 0.0 => s,
            _ => 1.0,
        };

        let values = cast(array, &DataType::Float64).context(ArrowSnafu { column: name })?;
        let values = values.as_primitive::<Float64Type>();
        let scaled: Float32Array = values.unary(|v| ((v - mean) / scale) as f32);
        fields.push(Field::new(name, DataType::Float32, field.is_nullable()));
        arrays.push(Arc::new(scaled) as Arc<dyn Array>);
    }

    let out = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(out, arrays).context(ArrowSnafu { column: "<batch>" })
}
