//! Summary extraction: a bounded-size statistical profile of a dataset.
//!
//! The profile holds, for a narrowed and folded batch:
//!
//! - per continuous column: count, min, max, mean, sample standard deviation
//!   (Welford accumulation) and a capped distinct count;
//! - per folded group: how many rows carry each code, plus the sentinel count;
//! - per target column: label frequencies for a capped set of labels.
//!
//! Its size depends on the number of columns, group members and caps, never
//! on the row count. [`summarize_parallel`] splits rows into fixed partitions
//! and merges them in order, so repeated runs give the same profile.
pub mod error;

mod accumulator;
mod digest;

use std::{collections::BTreeMap, ops::Range};

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch},
    compute::cast,
    datatypes::{DataType, Float64Type, Int32Type, Int64Type},
};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use accumulator::Cardinality;
pub use digest::{ColumnDigest, MemberShare, ProfileDigest};
pub use error::{ProfileError, ProfileResult};

use crate::{
    folding::{FoldManifest, FoldedGroup},
    parallel::{map_partitions, partition_ranges},
    schema::{DatasetLayout, PhysicalType},
};
use accumulator::{CodeCounter, DistinctCounter, LabelCounter, Moments};
use error::{
    ArrowSnafu, DeserializeSnafu, InvalidCodeSnafu, MissingColumnSnafu, ProfileTooLargeSnafu,
    SerializeSnafu, UnsupportedLabelTypeSnafu,
};

/// Caps and budgets for profile extraction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileOptions {
    /// Distinct values tracked exactly per continuous column.
    pub cardinality_cap: usize,
    /// Distinct labels tracked per target column.
    pub label_cap: usize,
    /// Members per group kept in the digest.
    pub top_k: usize,
    /// Largest accepted rendered profile, in bytes.
    pub max_bytes: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            cardinality_cap: 1024,
            label_cap: 64,
            top_k: 5,
            max_bytes: 64 * 1024,
        }
    }
}

/// Statistics of one continuous column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContinuousSummary {
    /// Column name.
    pub column: String,
    /// Non-null, non-NaN values seen.
    pub count: u64,
    /// Smallest value.
    pub min: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Sample standard deviation (`n - 1` denominator).
    pub std_dev: Option<f64>,
    /// Distinct values, exact up to the cap.
    pub cardinality: Cardinality,
}

impl ContinuousSummary {
    /// Population standard deviation (`n` denominator), as used for scaling.
    pub fn population_std_dev(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => self
                .std_dev
                .map(|s| s * ((n - 1) as f64 / n as f64).sqrt()),
        }
    }
}

/// Row count for one code of a folded group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeFrequency {
    /// Code value.
    pub code: i64,
    /// Member the code stands for.
    pub member: String,
    /// Rows carrying the code.
    pub count: u64,
}

/// Code distribution of one folded group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupDistribution {
    /// Group name.
    pub group: String,
    /// Code column name.
    pub code_column: String,
    /// One entry per member, in code order.
    pub frequencies: Vec<CodeFrequency>,
    /// Rows with the sentinel (or a null) code.
    pub sentinel: u64,
}

/// Label frequencies of one target column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelDistribution {
    /// Target column name.
    pub column: String,
    /// Rows per label, for the smallest `label_cap` labels.
    pub counts: BTreeMap<i64, u64>,
    /// Rows whose label did not fit under the cap.
    pub other: u64,
    /// Rows with a null label.
    pub missing: u64,
}

/// Bounded-size statistical summary of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    /// Rows in the dataset.
    pub row_count: u64,
    /// Continuous columns in layout order.
    pub continuous: Vec<ContinuousSummary>,
    /// Folded groups in manifest order.
    pub groups: Vec<GroupDistribution>,
    /// Target columns in layout order.
    pub targets: Vec<LabelDistribution>,
}

impl Profile {
    /// Look up the summary of a continuous column.
    pub fn column(&self, name: &str) -> Option<&ContinuousSummary> {
        self.continuous.iter().find(|c| c.column == name)
    }

    /// Pretty, deterministic JSON rendering.
    pub fn to_json_bytes(&self) -> ProfileResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).context(SerializeSnafu)
    }

    /// Parse a profile rendered with [`Profile::to_json_bytes`].
    pub fn from_json_bytes(bytes: &[u8]) -> ProfileResult<Self> {
        serde_json::from_slice(bytes).context(DeserializeSnafu)
    }

    /// Render the profile and check it against a byte budget.
    ///
    /// Returns the rendered bytes on success.
    pub fn ensure_within(&self, max_bytes: usize) -> ProfileResult<Vec<u8>> {
        let bytes = self.to_json_bytes()?;
        ensure!(
            bytes.len() <= max_bytes,
            ProfileTooLargeSnafu {
                size: bytes.len(),
                limit: max_bytes,
            }
        );
        Ok(bytes)
    }

    /// Compact AI-facing digest keeping the `top_k` members of each group.
    pub fn digest(&self, top_k: usize) -> ProfileDigest {
        ProfileDigest::from_profile(self, top_k)
    }
}

/// Columns to scan, cast once to the accumulator input types.
struct ScanPlan<'a> {
    continuous: Vec<(String, ArrayRef)>,
    groups: Vec<(&'a FoldedGroup, ArrayRef)>,
    targets: Vec<(String, ArrayRef)>,
}

/// Accumulator state for one row partition.
struct Partial {
    rows: u64,
    moments: Vec<Moments>,
    distinct: Vec<DistinctCounter>,
    codes: Vec<CodeCounter>,
    labels: Vec<LabelCounter>,
}

impl Partial {
    fn new(plan: &ScanPlan<'_>, options: &ProfileOptions) -> Self {
        Self {
            rows: 0,
            moments: vec![Moments::default(); plan.continuous.len()],
            distinct: vec![DistinctCounter::new(options.cardinality_cap); plan.continuous.len()],
            codes: plan
                .groups
                .iter()
                .map(|(g, _)| CodeCounter::new(g.members.len()))
                .collect(),
            labels: vec![LabelCounter::new(options.label_cap); plan.targets.len()],
        }
    }

    fn merge(mut self, other: &Partial) -> Self {
        self.rows += other.rows;
        for (a, b) in self.moments.iter_mut().zip(&other.moments) {
            a.merge(b);
        }
        for (a, b) in self.distinct.iter_mut().zip(&other.distinct) {
            a.merge(b);
        }
        for (a, b) in self.codes.iter_mut().zip(&other.codes) {
            a.merge(b);
        }
        for (a, b) in self.labels.iter_mut().zip(&other.labels) {
            a.merge(b);
        }
        self
    }
}

/// Summarize `batch` in a single sequential pass.
pub fn summarize(
    batch: &RecordBatch,
    layout: &DatasetLayout,
    manifest: &FoldManifest,
    options: &ProfileOptions,
) -> ProfileResult<Profile> {
    let plan = scan_plan(batch, layout, manifest)?;
    let partial = scan(&plan, options, 0..batch.num_rows())?;
    Ok(finish(&plan, partial))
}

/// Summarize `batch` over fixed row partitions in parallel.
///
/// Counts, extremes and frequencies equal the sequential result exactly;
/// means and standard deviations agree within floating-point rounding.
pub fn summarize_parallel(
    batch: &RecordBatch,
    layout: &DatasetLayout,
    manifest: &FoldManifest,
    options: &ProfileOptions,
    partition_rows: usize,
) -> ProfileResult<Profile> {
    let plan = scan_plan(batch, layout, manifest)?;
    let ranges = partition_ranges(batch.num_rows(), partition_rows);
    let partials = map_partitions(&ranges, |range| scan(&plan, options, range))?;
    let merged = partials
        .iter()
        .fold(Partial::new(&plan, options), |acc, p| acc.merge(p));
    Ok(finish(&plan, merged))
}

fn scan_plan<'a>(
    batch: &RecordBatch,
    layout: &DatasetLayout,
    manifest: &'a FoldManifest,
) -> ProfileResult<ScanPlan<'a>> {
    let mut continuous = Vec::new();
    for (name, _) in layout.continuous() {
        let values = cast(column(batch, name)?, &DataType::Float64).context(ArrowSnafu { column: name })?;
        continuous.push((name.to_string(), values));
    }

    let mut groups = Vec::with_capacity(manifest.groups.len());
    for group in &manifest.groups {
        let codes = cast(column(batch, &group.code_column)?, &DataType::Int32)
            .context(ArrowSnafu {
                column: &group.code_column,
            })?;
        groups.push((group, codes));
    }

    let mut targets = Vec::new();
    for name in layout.targets() {
        let raw = column(batch, name)?;
        ensure!(
            PhysicalType::from_arrow(raw.data_type()).is_some_and(|t| t.is_integer()),
            UnsupportedLabelTypeSnafu {
                column: name,
                data_type: raw.data_type().to_string(),
            }
        );
        let labels = cast(raw, &DataType::Int64).context(ArrowSnafu { column: name })?;
        targets.push((name.to_string(), labels));
    }

    Ok(ScanPlan {
        continuous,
        groups,
        targets,
    })
}

fn column<'b>(batch: &'b RecordBatch, name: &str) -> ProfileResult<&'b ArrayRef> {
    batch
        .column_by_name(name)
        .context(MissingColumnSnafu { column: name })
}

fn scan(plan: &ScanPlan<'_>, options: &ProfileOptions, range: Range<usize>) -> ProfileResult<Partial> {
    let mut partial = Partial::new(plan, options);
    partial.rows = range.len() as u64;

    for (i, (_, values)) in plan.continuous.iter().enumerate() {
        let values = values.as_primitive::<Float64Type>();
        let (moments, distinct) = (&mut partial.moments[i], &mut partial.distinct[i]);
        for row in range.clone() {
            if values.is_valid(row) {
                let v = values.value(row);
                if !v.is_nan() {
                    moments.push(v);
                    distinct.push(v);
                }
            }
        }
    }

    for (i, (group, codes)) in plan.groups.iter().enumerate() {
        let codes = codes.as_primitive::<Int32Type>();
        let counter = &mut partial.codes[i];
        for row in range.clone() {
            if codes.is_null(row) {
                counter.sentinel += 1;
                continue;
            }
            let code = codes.value(row) as i64;
            if code == group.sentinel {
                counter.sentinel += 1;
                continue;
            }
            let slot = usize::try_from(code)
                .ok()
                .and_then(|c| counter.counts.get_mut(c))
                .context(InvalidCodeSnafu {
                    group: &group.name,
                    row,
                    code,
                })?;
            *slot += 1;
        }
    }

    for (i, (_, labels)) in plan.targets.iter().enumerate() {
        let labels = labels.as_primitive::<Int64Type>();
        let counter = &mut partial.labels[i];
        for row in range.clone() {
            if labels.is_valid(row) {
                counter.push(labels.value(row));
            } else {
                counter.missing += 1;
            }
        }
    }

    Ok(partial)
}

fn finish(plan: &ScanPlan<'_>, partial: Partial) -> Profile {
    let continuous = plan
        .continuous
        .iter()
        .zip(partial.moments.iter().zip(&partial.distinct))
        .map(|((name, _), (m, d))| {
            let seen = m.count > 0;
            ContinuousSummary {
                column: name.clone(),
                count: m.count,
                min: seen.then_some(m.min),
                max: seen.then_some(m.max),
                mean: seen.then_some(m.mean),
                std_dev: m.sample_std_dev(),
                cardinality: d.cardinality(),
            }
        })
        .collect();

    let groups = plan
        .groups
        .iter()
        .zip(partial.codes)
        .map(|((group, _), counter)| GroupDistribution {
            group: group.name.clone(),
            code_column: group.code_column.clone(),
            frequencies: group
                .members
                .iter()
                .zip(counter.counts)
                .enumerate()
                .map(|(code, (member, count))| CodeFrequency {
                    code: code as i64,
                    member: member.name.clone(),
                    count,
                })
                .collect(),
            sentinel: counter.sentinel,
        })
        .collect();

    let targets = plan
        .targets
        .iter()
        .zip(partial.labels)
        .map(|((name, _), counter)| LabelDistribution {
            column: name.clone(),
            counts: counter.counts,
            other: counter.other,
            missing: counter.missing,
        })
        .collect();

    Profile {
        row_count: partial.rows,
        continuous,
        groups,
        targets,
    }
}
