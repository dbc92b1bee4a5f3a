//! Type narrowing: downcast every column to the narrowest lossless width.
//!
//! Integral continuous columns get the smallest integer type that holds their
//! *declared* domain, binary indicators become `int8`, and fractional columns
//! move to `float32` when the round trip stays within the configured relative
//! tolerance. Columns that cannot be narrowed without loss keep their width
//! and produce a warning rather than an error. Identifier and target columns
//! pass through untouched.
//!
//! Columns are independent, so the pass runs one rayon task per column and
//! reassembles the batch in the original column order.
pub mod error;
mod observe;

use std::{fmt, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, RecordBatch},
    compute::cast,
    datatypes::Schema,
};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use error::{NarrowingError, NarrowingResult};

use crate::schema::{ColumnSpec, DatasetLayout, NumericDomain, PhysicalType, SemanticType};
use error::{
    AssembleSnafu, CastSnafu, MissingColumnSnafu, NullValuesSnafu, RangeOverflowSnafu,
    SchemaSnafu, UnsupportedTypeSnafu,
};
use observe::{Observed, observe};

/// Tuning knobs for the narrowing pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarrowingOptions {
    /// Largest accepted relative error `|f32(v) - v| / max(1, |v|)` when
    /// moving a fractional column from `float64` to `float32`.
    pub float_tolerance: f64,
}

impl Default for NarrowingOptions {
    fn default() -> Self {
        Self {
            float_tolerance: 1e-6,
        }
    }
}

/// What the pass did to one column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NarrowingAction {
    /// Cast to a narrower (or pinned) type.
    Cast,
    /// Already at the chosen type.
    Unchanged,
    /// Could not be narrowed losslessly; kept at the source width.
    Retained,
    /// Identifier or target column, never touched.
    Passthrough,
}

/// Per-column record of a narrowing decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Column name.
    pub column: String,
    /// Type before narrowing.
    pub source: PhysicalType,
    /// Type after narrowing.
    pub target: PhysicalType,
    /// What happened.
    pub action: NarrowingAction,
}

/// Ordered narrowing decisions for a whole batch; used to widen back.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct NarrowingPlan(pub Vec<ColumnPlan>);

impl NarrowingPlan {
    /// Decisions in column order.
    pub fn columns(&self) -> &[ColumnPlan] {
        &self.0
    }

    /// Decision for one column.
    pub fn get(&self, column: &str) -> Option<&ColumnPlan> {
        self.0.iter().find(|p| p.column == column)
    }
}

impl fmt::Display for ColumnPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({:?})",
            self.column, self.source, self.target, self.action
        )
    }
}

/// Output of [`narrow`].
#[derive(Debug, Clone)]
pub struct NarrowedBatch {
    /// The narrowed dataset, same row order and column order as the input.
    pub batch: RecordBatch,
    /// What happened to each column.
    pub plan: NarrowingPlan,
    /// Columns that could not be narrowed losslessly.
    pub warnings: Vec<String>,
    /// Arrow memory held by the input columns.
    pub memory_bytes_before: usize,
    /// Arrow memory held by the narrowed columns.
    pub memory_bytes_after: usize,
}

struct NarrowedColumn {
    array: ArrayRef,
    plan: ColumnPlan,
    warning: Option<String>,
}

/// Narrow every column of `batch` according to `layout`.
///
/// The batch is first validated against the layout. Any null in a
/// non-passthrough column, any value outside its declared domain, and any
/// pinned type that cannot hold the domain are errors.
pub fn narrow(
    batch: &RecordBatch,
    layout: &DatasetLayout,
    options: &NarrowingOptions,
) -> NarrowingResult<NarrowedBatch> {
    let schema = batch.schema();
    layout.validate_batch(&schema).context(SchemaSnafu)?;

    let results: Vec<NarrowingResult<NarrowedColumn>> = (0..batch.num_columns())
        .into_par_iter()
        .map(|i| {
            let field = schema.field(i);
            let spec = layout.column(field.name()).context(MissingColumnSnafu {
                column: field.name(),
            })?;
            narrow_column(spec, batch.column(i), options)
        })
        .collect();
    let columns = results.into_iter().collect::<NarrowingResult<Vec<_>>>()?;

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    let mut plan = Vec::with_capacity(columns.len());
    let mut warnings = Vec::new();
    for (field, col) in schema.fields().iter().zip(columns) {
        fields.push(field.as_ref().clone().with_data_type(col.array.data_type().clone()));
        arrays.push(col.array);
        plan.push(col.plan);
        if let Some(w) = col.warning {
            warnings.push(w);
        }
    }

    let out_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    let narrowed = RecordBatch::try_new(out_schema, arrays).context(AssembleSnafu)?;
    let memory_bytes_before = batch_memory(batch);
    let memory_bytes_after = batch_memory(&narrowed);
    debug!(
        "narrowed {} column(s): {memory_bytes_before} -> {memory_bytes_after} bytes",
        plan.len()
    );

    Ok(NarrowedBatch {
        batch: narrowed,
        plan: NarrowingPlan(plan),
        warnings,
        memory_bytes_before,
        memory_bytes_after,
    })
}

/// Cast every planned column back to its source type.
///
/// Columns of `batch` that the plan does not mention are kept as they are.
/// Integer columns are recovered exactly; fractional columns stored as
/// `float32` are recovered within the narrowing tolerance.
pub fn widen(batch: &RecordBatch, plan: &NarrowingPlan) -> NarrowingResult<RecordBatch> {
    let schema = batch.schema();
    for p in plan.columns() {
        ensure!(
            schema.index_of(&p.column).is_ok(),
            MissingColumnSnafu {
                column: p.column.clone()
            }
        );
    }

    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays = Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let widened = match plan.get(field.name()) {
            Some(p) if p.source != p.target => verified_cast(field.name(), array, p.source)?,
            _ => Arc::clone(array),
        };
        fields.push(field.as_ref().clone().with_data_type(widened.data_type().clone()));
        arrays.push(widened);
    }
    let out_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(out_schema, arrays).context(AssembleSnafu)
}

fn narrow_column(
    spec: &ColumnSpec,
    array: &ArrayRef,
    options: &NarrowingOptions,
) -> NarrowingResult<NarrowedColumn> {
    let column = spec.name.as_str();
    let source = PhysicalType::from_arrow(array.data_type()).context(UnsupportedTypeSnafu {
        column,
        data_type: array.data_type().to_string(),
    })?;

    if spec.semantic.is_passthrough() {
        return Ok(NarrowedColumn {
            array: Arc::clone(array),
            plan: ColumnPlan {
                column: column.to_string(),
                source,
                target: source,
                action: NarrowingAction::Passthrough,
            },
            warning: None,
        });
    }

    ensure!(
        array.null_count() == 0,
        NullValuesSnafu {
            column,
            count: array.null_count()
        }
    );
    let observed = observe(array.as_ref(), options.float_tolerance).context(UnsupportedTypeSnafu {
        column,
        data_type: array.data_type().to_string(),
    })?;

    let (target, warning) = match &spec.semantic {
        SemanticType::BinaryIndicator => (indicator_target(spec, &observed)?, None),
        SemanticType::Continuous { domain } => {
            check_domain(column, domain, &observed)?;
            if domain.integral {
                (integral_target(spec, domain)?, None)
            } else {
                fractional_target(spec, domain, source, &observed)?
            }
        }
        SemanticType::Identifier | SemanticType::Target => (source, None),
    };

    let action = match (&warning, target == source) {
        (Some(_), _) => NarrowingAction::Retained,
        (None, true) => NarrowingAction::Unchanged,
        (None, false) => NarrowingAction::Cast,
    };
    let narrowed = if target == source {
        Arc::clone(array)
    } else {
        verified_cast(column, array, target)?
    };
    if let Some(w) = &warning {
        warn!("{w}");
    }

    Ok(NarrowedColumn {
        array: narrowed,
        plan: ColumnPlan {
            column: column.to_string(),
            source,
            target,
            action,
        },
        warning,
    })
}

fn indicator_target(spec: &ColumnSpec, observed: &Observed) -> NarrowingResult<PhysicalType> {
    let column = spec.name.as_str();
    let binary = observed.all_integral()
        && observed
            .bounds()
            .is_none_or(|(lo, hi)| lo >= 0.0 && hi <= 1.0);
    ensure!(
        binary && !observed.has_nan(),
        RangeOverflowSnafu {
            column,
            detail: "binary indicator holds a value other than 0 or 1",
        }
    );
    let target = spec.storage.unwrap_or(PhysicalType::Int8);
    ensure!(
        target.is_numeric() || target == PhysicalType::Bool,
        RangeOverflowSnafu {
            column,
            detail: format!("pinned type {target} cannot hold 0/1 flags"),
        }
    );
    Ok(target)
}

fn check_domain(column: &str, domain: &NumericDomain, observed: &Observed) -> NarrowingResult<()> {
    ensure!(
        !observed.has_nan(),
        RangeOverflowSnafu {
            column,
            detail: "NaN is outside every declared domain",
        }
    );
    if let Some((lo, hi)) = observed.bounds() {
        ensure!(
            domain.contains(lo) && domain.contains(hi),
            RangeOverflowSnafu {
                column,
                detail: format!("observed range [{lo}, {hi}] exceeds declared domain {domain}"),
            }
        );
    }
    if domain.integral {
        ensure!(
            observed.all_integral(),
            RangeOverflowSnafu {
                column,
                detail: "integral domain holds a fractional value",
            }
        );
    }
    Ok(())
}

fn integral_target(spec: &ColumnSpec, domain: &NumericDomain) -> NarrowingResult<PhysicalType> {
    let column = spec.name.as_str();
    if let Some(pinned) = spec.storage {
        ensure!(
            pinned.covers_domain(domain),
            RangeOverflowSnafu {
                column,
                detail: format!("pinned type {pinned} cannot hold declared domain {domain}"),
            }
        );
        return Ok(pinned);
    }
    domain
        .integer_bounds()
        .and_then(|(lo, hi)| PhysicalType::smallest_integer_for(lo, hi))
        .context(RangeOverflowSnafu {
            column,
            detail: format!("no integer type holds declared domain {domain}"),
        })
}

fn fractional_target(
    spec: &ColumnSpec,
    domain: &NumericDomain,
    source: PhysicalType,
    observed: &Observed,
) -> NarrowingResult<(PhysicalType, Option<String>)> {
    let column = spec.name.as_str();
    let f32_ok = domain.fits_f32() && observed.fits_f32();

    if let Some(pinned) = spec.storage {
        ensure!(
            pinned.covers_domain(domain),
            RangeOverflowSnafu {
                column,
                detail: format!("pinned type {pinned} cannot hold declared domain {domain}"),
            }
        );
        ensure!(
            pinned != PhysicalType::Float32 || source == PhysicalType::Float32 || f32_ok,
            RangeOverflowSnafu {
                column,
                detail: "values lose more precision than the float tolerance allows in float32",
            }
        );
        return Ok((pinned, None));
    }

    if source == PhysicalType::Float32 || f32_ok {
        return Ok((PhysicalType::Float32, None));
    }
    let warning = format!(
        "column {column} kept as {source}: float32 would exceed the precision tolerance"
    );
    Ok((source, Some(warning)))
}

fn verified_cast(column: &str, array: &ArrayRef, target: PhysicalType) -> NarrowingResult<ArrayRef> {
    let out = cast(array, &target.to_arrow()).context(CastSnafu { column })?;
    ensure!(
        out.null_count() == array.null_count(),
        RangeOverflowSnafu {
            column,
            detail: format!("cast to {target} produced out-of-range values"),
        }
    );
    Ok(out)
}

/// Total Arrow memory held by a batch's columns.
pub fn batch_memory(batch: &RecordBatch) -> usize {
    batch
        .columns()
        .iter()
        .map(|c| c.get_array_memory_size())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndicatorGroup;
    use arrow::{
        array::{AsArray, Float64Array, Int64Array},
        datatypes::{DataType, Field, Float32Type, UInt8Type, UInt16Type},
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn layout() -> DatasetLayout {
        DatasetLayout::new(
            vec![
                ColumnSpec::identifier("Id"),
                ColumnSpec::continuous("Elevation", NumericDomain::integral(0, 4000)),
                ColumnSpec::continuous("Ratio", NumericDomain::real(-10.0, 10.0)),
                ColumnSpec::indicator("flag_a"),
                ColumnSpec::indicator("flag_b"),
                ColumnSpec::target("Cover_Type"),
            ],
            vec![IndicatorGroup::new("flag", ["flag_a", "flag_b"])],
        )
        .expect("valid layout")
    }

    fn batch(elevation: Vec<i64>, ratio: Vec<f64>) -> RecordBatch {
        let n = elevation.len() as i64;
        let flags_a: Vec<i64> = (0..n).map(|i| i % 2).collect();
        let flags_b: Vec<i64> = (0..n).map(|i| 1 - i % 2).collect();
        let schema = Arc::new(Schema::new(vec![
            Field::new("Id", DataType::Int64, false),
            Field::new("Elevation", DataType::Int64, false),
            Field::new("Ratio", DataType::Float64, false),
            Field::new("flag_a", DataType::Int64, false),
            Field::new("flag_b", DataType::Int64, false),
            Field::new("Cover_Type", DataType::Int64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from((0..n).collect::<Vec<_>>())),
                Arc::new(Int64Array::from(elevation)),
                Arc::new(Float64Array::from(ratio)),
                Arc::new(Int64Array::from(flags_a)),
                Arc::new(Int64Array::from(flags_b)),
                Arc::new(Int64Array::from(vec![3; n as usize])),
            ],
        )
        .expect("valid batch")
    }

    #[test]
    fn width_follows_declared_domain_not_observed_values() -> TestResult {
        let rows = 2_000;
        let elevation: Vec<i64> = (0..rows).map(|i| (i * 7) % 300).collect();
        let ratio: Vec<f64> = (0..rows).map(|i| (i % 80) as f64 * 0.25 - 10.0).collect();
        let out = narrow(
            &batch(elevation.clone(), ratio),
            &layout(),
            &NarrowingOptions::default(),
        )?;
        let schema = out.batch.schema();
        assert_eq!(schema.field_with_name("Elevation")?.data_type(), &DataType::UInt16);
        assert_eq!(schema.field_with_name("Ratio")?.data_type(), &DataType::Float32);
        assert_eq!(schema.field_with_name("flag_a")?.data_type(), &DataType::Int8);
        assert_eq!(schema.field_with_name("Id")?.data_type(), &DataType::Int64);
        assert_eq!(schema.field_with_name("Cover_Type")?.data_type(), &DataType::Int64);
        assert_eq!(
            out.plan.get("Id").map(|p| p.action),
            Some(NarrowingAction::Passthrough)
        );
        assert!(out.memory_bytes_after < out.memory_bytes_before);

        let narrowed = out.batch.column_by_name("Elevation").expect("column");
        let expected: Vec<u16> = elevation.iter().map(|&v| v as u16).collect();
        assert_eq!(narrowed.as_primitive::<UInt16Type>().values().to_vec(), expected);
        Ok(())
    }

    #[test]
    fn full_byte_domain_is_stored_as_uint8() -> TestResult {
        let layout = DatasetLayout::new(
            vec![ColumnSpec::continuous("Hillshade_9am", NumericDomain::integral(0, 255))],
            vec![],
        )?;
        let schema = Arc::new(Schema::new(vec![Field::new(
            "Hillshade_9am",
            DataType::Int64,
            false,
        )]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![0, 128, 255]))])?;

        let out = narrow(&batch, &layout, &NarrowingOptions::default())?;
        let plan = out.plan.get("Hillshade_9am").expect("planned");
        assert_eq!(plan.target, PhysicalType::UInt8);
        assert_eq!(plan.action, NarrowingAction::Cast);
        let values = out.batch.column(0).as_primitive::<UInt8Type>();
        assert_eq!(values.values().to_vec(), vec![0, 128, 255]);
        Ok(())
    }

    #[test]
    fn value_outside_domain_is_range_overflow() {
        let err = narrow(
            &batch(vec![10, 4001], vec![0.0, 0.0]),
            &layout(),
            &NarrowingOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, NarrowingError::RangeOverflow { column, .. } if column == "Elevation"));
    }

    #[test]
    fn pinned_width_too_narrow_for_domain_is_rejected() {
        let layout = DatasetLayout::new(
            vec![
                ColumnSpec::continuous("Elevation", NumericDomain::integral(0, 4000))
                    .with_storage(PhysicalType::UInt8),
            ],
            vec![],
        )
        .expect("valid layout");
        let schema = Arc::new(Schema::new(vec![Field::new(
            "Elevation",
            DataType::Int64,
            false,
        )]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![12, 40]))])
            .expect("valid batch");

        let err = narrow(&batch, &layout, &NarrowingOptions::default()).unwrap_err();
        assert!(matches!(err, NarrowingError::RangeOverflow { column, .. } if column == "Elevation"));
    }

    #[test]
    fn null_in_continuous_column_is_rejected() {
        let layout = DatasetLayout::new(
            vec![ColumnSpec::continuous("Slope", NumericDomain::integral(0, 90))],
            vec![],
        )
        .expect("valid layout");
        let schema = Arc::new(Schema::new(vec![Field::new("Slope", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![Some(3), None, Some(4)]))],
        )
        .expect("valid batch");

        let err = narrow(&batch, &layout, &NarrowingOptions::default()).unwrap_err();
        assert!(matches!(err, NarrowingError::NullValues { count: 1, .. }));
    }

    #[test]
    fn precision_loss_retains_float64_with_warning() -> TestResult {
        let options = NarrowingOptions {
            float_tolerance: 1e-12,
        };
        let out = narrow(
            &batch(vec![1, 2], vec![1.000_000_000_1, 2.5]),
            &layout(),
            &options,
        )?;
        let ratio = out.plan.get("Ratio").expect("planned");
        assert_eq!(ratio.action, NarrowingAction::Retained);
        assert_eq!(ratio.target, PhysicalType::Float64);
        assert_eq!(out.warnings.len(), 1);
        Ok(())
    }

    #[test]
    fn indicator_with_value_two_is_rejected() {
        let mut b = batch(vec![1, 2], vec![0.0, 0.0]);
        let mut columns = b.columns().to_vec();
        columns[3] = Arc::new(Int64Array::from(vec![2, 0]));
        b = RecordBatch::try_new(b.schema(), columns).expect("valid batch");

        let err = narrow(&b, &layout(), &NarrowingOptions::default()).unwrap_err();
        assert!(matches!(err, NarrowingError::RangeOverflow { column, .. } if column == "flag_a"));
    }

    #[test]
    fn widen_recovers_integer_columns_exactly() -> TestResult {
        let original = batch(vec![0, 4000, 17], vec![0.25, -9.5, 3.0]);
        let out = narrow(&original, &layout(), &NarrowingOptions::default())?;
        let widened = widen(&out.batch, &out.plan)?;
        assert_eq!(widened.schema(), original.schema());
        assert_eq!(widened.column(1), original.column(1));
        assert_eq!(widened.column(3), original.column(3));

        let ratio = out.batch.column(2).as_primitive::<Float32Type>();
        assert_eq!(ratio.values().to_vec(), vec![0.25, -9.5, 3.0]);
        Ok(())
    }
}
