//! Single-pass value observation over a non-null numeric column.
use arrow::{
    array::{Array, AsArray},
    datatypes::{
        ArrowPrimitiveType, DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
        Int64Type, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
    },
};

/// Largest integer magnitude an `f32` represents exactly.
const F32_EXACT_INT: i128 = 1 << 24;

/// Value range and precision facts gathered from one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Observed {
    /// The column has no rows.
    Empty,
    /// Integer (or boolean) values.
    Integer { min: i128, max: i128 },
    /// Floating point values.
    Float(FloatStats),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FloatStats {
    pub min: f64,
    pub max: f64,
    pub has_nan: bool,
    pub all_integral: bool,
    /// Every value survives an `f32` round trip within the relative tolerance.
    pub f32_within_tolerance: bool,
}

impl Observed {
    /// Smallest and largest value as `f64`, if there are any comparable values.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Observed::Empty => None,
            Observed::Integer { min, max } => Some((*min as f64, *max as f64)),
            Observed::Float(stats) if stats.min <= stats.max => Some((stats.min, stats.max)),
            Observed::Float(_) => None,
        }
    }

    pub fn has_nan(&self) -> bool {
        matches!(self, Observed::Float(stats) if stats.has_nan)
    }

    pub fn all_integral(&self) -> bool {
        match self {
            Observed::Float(stats) => stats.all_integral && !stats.has_nan,
            _ => true,
        }
    }

    /// Whether casting the observed values to `f32` stays within tolerance.
    pub fn fits_f32(&self) -> bool {
        match self {
            Observed::Empty => true,
            Observed::Integer { min, max } => min.abs() <= F32_EXACT_INT && max.abs() <= F32_EXACT_INT,
            Observed::Float(stats) => stats.f32_within_tolerance,
        }
    }
}

/// Observe every value of `array`, which must not contain nulls.
///
/// Returns `None` for non-numeric arrays.
pub(crate) fn observe(array: &dyn Array, tolerance: f64) -> Option<Observed> {
    if array.is_empty() {
        return Some(Observed::Empty);
    }
    Some(match array.data_type() {
        DataType::Boolean => {
            let values = array.as_boolean();
            let ones = values.true_count();
            Observed::Integer {
                min: if ones == values.len() { 1 } else { 0 },
                max: if ones > 0 { 1 } else { 0 },
            }
        }
        DataType::Int8 => int_range::<Int8Type>(array),
        DataType::Int16 => int_range::<Int16Type>(array),
        DataType::Int32 => int_range::<Int32Type>(array),
        DataType::Int64 => int_range::<Int64Type>(array),
        DataType::UInt8 => int_range::<UInt8Type>(array),
        DataType::UInt16 => int_range::<UInt16Type>(array),
        DataType::UInt32 => int_range::<UInt32Type>(array),
        DataType::UInt64 => int_range::<UInt64Type>(array),
        DataType::Float32 => float_stats::<Float32Type>(array, tolerance),
        DataType::Float64 => float_stats::<Float64Type>(array, tolerance),
        _ => return None,
    })
}

fn int_range<T>(array: &dyn Array) -> Observed
where
    T: ArrowPrimitiveType,
    T::Native: Into<i128>,
{
    let mut values = array.as_primitive::<T>().values().iter().map(|&v| v.into());
    match values.next() {
        None => Observed::Empty,
        Some(first) => {
            let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
            Observed::Integer { min, max }
        }
    }
}

fn float_stats<T>(array: &dyn Array, tolerance: f64) -> Observed
where
    T: ArrowPrimitiveType,
    T::Native: Into<f64>,
{
    let source_is_f32 = matches!(array.data_type(), DataType::Float32);
    let mut stats = FloatStats {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        has_nan: false,
        all_integral: true,
        f32_within_tolerance: true,
    };
    for &raw in array.as_primitive::<T>().values().iter() {
        let v: f64 = raw.into();
        if v.is_nan() {
            stats.has_nan = true;
            continue;
        }
        stats.min = stats.min.min(v);
        stats.max = stats.max.max(v);
        if v.fract() != 0.0 || !v.is_finite() {
            stats.all_integral = false;
        }
        if !source_is_f32 && stats.f32_within_tolerance {
            let rounded = (v as f32) as f64;
            let budget = tolerance * v.abs().max(1.0);
            if !rounded.is_finite() || (rounded - v).abs() > budget {
                stats.f32_within_tolerance = false;
            }
        }
    }
    Observed::Float(stats)
}
