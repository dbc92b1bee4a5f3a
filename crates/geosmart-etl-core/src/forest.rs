//! Forest cover-type dataset preset and mock data.
//!
//! The layout declares the ten terrain measurements with their legal
//! domains, the `Wilderness_Area1..4` and `Soil_Type1..40` one-hot blocks and
//! the `Cover_Type` label. Distances, angles and elevation are real-valued
//! and narrow to `float32`; the hillshade indexes are integral in `[0, 255]`.
//! The mock generator produces batches with the same shape as the raw CSV:
//! `float64` measurements, `int64` hillshades, flags and labels, exactly one
//! active member per group per row.
use std::{f64::consts::PI, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, RecordBatch},
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::schema::{
    ColumnSpec, DatasetLayout, IndicatorGroup, NumericDomain, error::SchemaResult,
};

/// Dataset row identifier column.
pub const ID_COLUMN: &str = "Id";
/// Label column.
pub const COVER_TYPE: &str = "Cover_Type";
/// Wilderness area group name and member prefix.
pub const WILDERNESS_AREA: &str = "Wilderness_Area";
/// Soil type group name and member prefix.
pub const SOIL_TYPE: &str = "Soil_Type";

/// Declared domain of one terrain column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerrainDomain {
    /// Real-valued measurement in `[min, max]`.
    Real(f64, f64),
    /// Integer index in `[min, max]`.
    Integral(i64, i64),
}

impl TerrainDomain {
    fn to_numeric(self) -> NumericDomain {
        match self {
            TerrainDomain::Real(min, max) => NumericDomain::real(min, max),
            TerrainDomain::Integral(min, max) => NumericDomain::integral(min, max),
        }
    }
}

/// Continuous terrain columns in CSV order with their declared domains.
pub const TERRAIN_COLUMNS: [(&str, TerrainDomain); 10] = [
    ("Elevation", TerrainDomain::Real(0.0, 9000.0)),
    ("Aspect", TerrainDomain::Real(0.0, 360.0)),
    ("Slope", TerrainDomain::Real(0.0, 90.0)),
    ("Horizontal_Distance_To_Hydrology", TerrainDomain::Real(0.0, 10_000.0)),
    ("Vertical_Distance_To_Hydrology", TerrainDomain::Real(-1000.0, 1000.0)),
    ("Horizontal_Distance_To_Roadways", TerrainDomain::Real(0.0, 20_000.0)),
    ("Hillshade_9am", TerrainDomain::Integral(0, 255)),
    ("Hillshade_Noon", TerrainDomain::Integral(0, 255)),
    ("Hillshade_3pm", TerrainDomain::Integral(0, 255)),
    ("Horizontal_Distance_To_Fire_Points", TerrainDomain::Real(0.0, 20_000.0)),
];

const WILDERNESS_MEMBERS: u32 = 4;
const SOIL_MEMBERS: u32 = 40;

/// Indicator groups of the forest dataset.
pub fn forest_cover_groups() -> Vec<IndicatorGroup> {
    vec![
        IndicatorGroup::numbered(WILDERNESS_AREA, WILDERNESS_AREA, 1..=WILDERNESS_MEMBERS),
        IndicatorGroup::numbered(SOIL_TYPE, SOIL_TYPE, 1..=SOIL_MEMBERS),
    ]
}

/// Column layout of the forest cover-type dataset, optionally with a leading
/// `Id` column.
pub fn forest_cover_layout(include_id: bool) -> SchemaResult<DatasetLayout> {
    let groups = forest_cover_groups();
    let mut columns = Vec::with_capacity(56);
    if include_id {
        columns.push(ColumnSpec::identifier(ID_COLUMN));
    }
    columns.extend(
        TERRAIN_COLUMNS
            .iter()
            .map(|&(name, domain)| ColumnSpec::continuous(name, domain.to_numeric())),
    );
    columns.extend(
        groups
            .iter()
            .flat_map(|g| g.columns.iter().map(ColumnSpec::indicator)),
    );
    columns.push(ColumnSpec::target(COVER_TYPE));
    DatasetLayout::new(columns, groups)
}

/// Generate a mock raw forest batch of `rows` rows.
///
/// Elevation is normal around 2500 m (sd 100) and row 0 is forced to 3500 m
/// as an outlier; other measurements are uniform over typical ranges.
/// Measurements are drawn at single precision, so narrowing them is exact.
/// A fixed `seed` makes the batch reproducible.
pub fn mock_forest_batch(rows: usize, seed: Option<u64>) -> Result<RecordBatch, ArrowError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let mut elevation: Vec<f64> = (0..rows)
        .map(|_| {
            let v = (2500.0 + 100.0 * standard_normal(&mut rng)).clamp(0.0, 9000.0);
            v as f32 as f64
        })
        .collect();
    if let Some(first) = elevation.first_mut() {
        *first = 3500.0;
    }

    let mut real = |lo: f32, hi: f32| -> ArrayRef {
        let values: Vec<f64> = (0..rows).map(|_| rng.random_range(lo..hi) as f64).collect();
        Arc::new(Float64Array::from(values))
    };
    let aspect = real(0.0, 360.0);
    let slope = real(0.0, 45.0);
    let hydro_h = real(0.0, 500.0);
    let hydro_v = real(-50.0, 200.0);
    let roads = real(0.0, 5000.0);
    let fire = real(0.0, 5000.0);

    let mut int = |lo: i64, hi: i64| -> Vec<i64> {
        (0..rows).map(|_| rng.random_range(lo..=hi)).collect()
    };
    let hillshade = |values: Vec<i64>| -> ArrayRef { Arc::new(Int64Array::from(values)) };
    let shade_9am = hillshade(int(0, 254));
    let shade_noon = hillshade(int(0, 254));
    let shade_3pm = hillshade(int(0, 254));
    let wilderness = int(0, WILDERNESS_MEMBERS as i64 - 1);
    let soil = int(0, SOIL_MEMBERS as i64 - 1);
    let cover = int(1, 7);

    let terrain: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from(elevation)),
        aspect,
        slope,
        hydro_h,
        hydro_v,
        roads,
        shade_9am,
        shade_noon,
        shade_3pm,
        fire,
    ];

    let mut fields = Vec::with_capacity(55);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(55);
    for ((name, _), values) in TERRAIN_COLUMNS.iter().zip(terrain) {
        fields.push(Field::new(*name, values.data_type().clone(), false));
        columns.push(values);
    }
    for (prefix, members, active) in [
        (WILDERNESS_AREA, WILDERNESS_MEMBERS, &wilderness),
        (SOIL_TYPE, SOIL_MEMBERS, &soil),
    ] {
        for m in 0..members as i64 {
            fields.push(Field::new(format!("{prefix}{}", m + 1), DataType::Int64, false));
            let flags: Vec<i64> = active.iter().map(|&a| (a == m) as i64).collect();
            columns.push(Arc::new(Int64Array::from(flags)));
        }
    }
    fields.push(Field::new(COVER_TYPE, DataType::Int64, false));
    columns.push(Arc::new(Int64Array::from(cover)));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

/// Box-Muller transform.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::{Float64Type, Int64Type};

    #[test]
    fn layout_declares_every_forest_column() -> Result<(), Box<dyn std::error::Error>> {
        let layout = forest_cover_layout(true)?;
        assert_eq!(layout.columns().len(), 1 + 10 + 4 + 40 + 1);
        assert_eq!(layout.groups()[1].code_column(), "Soil_Type_code");
        assert_eq!(layout.columns()[0].name, ID_COLUMN);
        assert_eq!(forest_cover_layout(false)?.columns().len(), 55);
        Ok(())
    }

    #[test]
    fn mock_batch_matches_layout_and_is_one_hot() -> Result<(), Box<dyn std::error::Error>> {
        let batch = mock_forest_batch(500, Some(7))?;
        forest_cover_layout(false)?.validate_batch(&batch.schema())?;

        let elevation = batch.column(0).as_primitive::<Float64Type>();
        assert_eq!(elevation.value(0), 3500.0);
        assert!(elevation.values().iter().all(|&v| v == v as f32 as f64));
        assert_eq!(batch.schema().field_with_name("Hillshade_Noon")?.data_type(), &DataType::Int64);
        assert_eq!(batch.schema().field_with_name("Aspect")?.data_type(), &DataType::Float64);

        let soil_start = batch.schema().index_of("Soil_Type1")?;
        for row in 0..batch.num_rows() {
            let active: i64 = (soil_start..soil_start + 40)
                .map(|c| batch.column(c).as_primitive::<Int64Type>().value(row))
                .sum();
            assert_eq!(active, 1);
        }
        Ok(())
    }

    #[test]
    fn seeded_mock_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(mock_forest_batch(50, Some(42))?, mock_forest_batch(50, Some(42))?);
        Ok(())
    }
}
