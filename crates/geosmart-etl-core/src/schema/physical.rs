//! Physical storage types supported by the pipeline and their Arrow mapping.
use std::fmt;

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

use crate::schema::NumericDomain;

/// Largest integer magnitude an `f32` represents exactly.
const F32_EXACT_INT: f64 = 16_777_216.0;
/// Largest integer magnitude an `f64` represents exactly.
const F64_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Physical column type, as stored in memory and in the columnar container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalType {
    /// Boolean value.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 encoded string.
    Utf8,
}

impl PhysicalType {
    /// Arrow data type used to hold values of this physical type.
    pub fn to_arrow(self) -> DataType {
        match self {
            PhysicalType::Bool => DataType::Boolean,
            PhysicalType::Int8 => DataType::Int8,
            PhysicalType::Int16 => DataType::Int16,
            PhysicalType::Int32 => DataType::Int32,
            PhysicalType::Int64 => DataType::Int64,
            PhysicalType::UInt8 => DataType::UInt8,
            PhysicalType::UInt16 => DataType::UInt16,
            PhysicalType::UInt32 => DataType::UInt32,
            PhysicalType::UInt64 => DataType::UInt64,
            PhysicalType::Float32 => DataType::Float32,
            PhysicalType::Float64 => DataType::Float64,
            PhysicalType::Utf8 => DataType::Utf8,
        }
    }

    /// Map an Arrow data type back to a physical type, if supported.
    pub fn from_arrow(data_type: &DataType) -> Option<Self> {
        Some(match data_type {
            DataType::Boolean => PhysicalType::Bool,
            DataType::Int8 => PhysicalType::Int8,
            DataType::Int16 => PhysicalType::Int16,
            DataType::Int32 => PhysicalType::Int32,
            DataType::Int64 => PhysicalType::Int64,
            DataType::UInt8 => PhysicalType::UInt8,
            DataType::UInt16 => PhysicalType::UInt16,
            DataType::UInt32 => PhysicalType::UInt32,
            DataType::UInt64 => PhysicalType::UInt64,
            DataType::Float32 => PhysicalType::Float32,
            DataType::Float64 => PhysicalType::Float64,
            DataType::Utf8 => PhysicalType::Utf8,
            _ => return None,
        })
    }

    /// Fixed storage width per value in bytes (`None` for variable-length types).
    pub fn byte_width(self) -> Option<usize> {
        match self {
            PhysicalType::Bool | PhysicalType::Int8 | PhysicalType::UInt8 => Some(1),
            PhysicalType::Int16 | PhysicalType::UInt16 => Some(2),
            PhysicalType::Int32 | PhysicalType::UInt32 | PhysicalType::Float32 => Some(4),
            PhysicalType::Int64 | PhysicalType::UInt64 | PhysicalType::Float64 => Some(8),
            PhysicalType::Utf8 => None,
        }
    }

    /// True for signed and unsigned integer types.
    pub fn is_integer(self) -> bool {
        self.integer_bounds().is_some()
    }

    /// True for `Float32` and `Float64`.
    pub fn is_float(self) -> bool {
        matches!(self, PhysicalType::Float32 | PhysicalType::Float64)
    }

    /// True for every type whose values can be read as numbers.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Inclusive value range of an integer type.
    pub fn integer_bounds(self) -> Option<(i128, i128)> {
        Some(match self {
            PhysicalType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            PhysicalType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            PhysicalType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            PhysicalType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            PhysicalType::UInt8 => (0, u8::MAX as i128),
            PhysicalType::UInt16 => (0, u16::MAX as i128),
            PhysicalType::UInt32 => (0, u32::MAX as i128),
            PhysicalType::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        })
    }

    /// Smallest integer type holding every value in `[min, max]`.
    ///
    /// Non-negative ranges prefer unsigned types, so `[0, 255]` maps to
    /// `UInt8` while `[-1, 100]` maps to `Int8`.
    pub fn smallest_integer_for(min: i128, max: i128) -> Option<Self> {
        let candidates: &[PhysicalType] = if min >= 0 {
            &[
                PhysicalType::UInt8,
                PhysicalType::UInt16,
                PhysicalType::UInt32,
                PhysicalType::UInt64,
            ]
        } else {
            &[
                PhysicalType::Int8,
                PhysicalType::Int16,
                PhysicalType::Int32,
                PhysicalType::Int64,
            ]
        };
        candidates.iter().copied().find(|t| {
            t.integer_bounds()
                .is_some_and(|(lo, hi)| lo <= min && max <= hi)
        })
    }

    /// Whether every legal value of `domain` is exactly representable.
    pub fn covers_domain(self, domain: &NumericDomain) -> bool {
        if domain.integral {
            let Some((lo, hi)) = domain.integer_bounds() else {
                return false;
            };
            match self {
                PhysicalType::Float32 => {
                    (lo as f64).abs() <= F32_EXACT_INT && (hi as f64).abs() <= F32_EXACT_INT
                }
                PhysicalType::Float64 => {
                    (lo as f64).abs() <= F64_EXACT_INT && (hi as f64).abs() <= F64_EXACT_INT
                }
                other => other
                    .integer_bounds()
                    .is_some_and(|(tlo, thi)| tlo <= lo && hi <= thi),
            }
        } else {
            match self {
                PhysicalType::Float32 => domain.fits_f32(),
                PhysicalType::Float64 => true,
                _ => false,
            }
        }
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhysicalType::Bool => "bool",
            PhysicalType::Int8 => "int8",
            PhysicalType::Int16 => "int16",
            PhysicalType::Int32 => "int32",
            PhysicalType::Int64 => "int64",
            PhysicalType::UInt8 => "uint8",
            PhysicalType::UInt16 => "uint16",
            PhysicalType::UInt32 => "uint32",
            PhysicalType::UInt64 => "uint64",
            PhysicalType::Float32 => "float32",
            PhysicalType::Float64 => "float64",
            PhysicalType::Utf8 => "utf8",
        };
        f.write_str(name)
    }
}
