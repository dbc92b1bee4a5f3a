//! Categorical folding: collapse one-hot indicator groups into code columns.
//!
//! A group of `m` mutually exclusive 0/1 columns becomes a single integer
//! column holding the index of the active member. The fold is lossless for
//! every row with exactly one active member, and [`decode`] restores the
//! original columns, positions and types from the [`FoldManifest`].
//!
//! Rows that break the one-active-member rule fail the fold under
//! [`FoldPolicy::Strict`] and are coded as [`SENTINEL_CODE`] (and counted)
//! under [`FoldPolicy::Lenient`].
pub mod error;
pub mod manifest;

use std::{collections::HashSet, ops::Range, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, AsArray, Int8Array, Int32Array, RecordBatch},
    compute::cast,
    datatypes::{DataType, Field, Int8Type, Int32Type, Schema},
};
use log::warn;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use error::{FoldError, FoldResult};
pub use manifest::{
    FoldDiagnostics, FoldManifest, FoldedGroup, FoldedMember, GroupDiagnostics, SENTINEL_CODE,
};

use crate::{
    parallel::{map_partitions, partition_ranges},
    schema::{IndicatorGroup, PhysicalType},
};
use error::{
    ArrowSnafu, CorruptManifestSnafu, InvalidCodeSnafu, InvariantViolationSnafu,
    MissingColumnSnafu, RangeOverflowSnafu, UnsupportedMemberSnafu,
};

/// How rows without exactly one active member are handled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FoldPolicy {
    /// Fail the fold on the first violating row.
    #[default]
    Strict,
    /// Write the sentinel code and count the violation.
    Lenient,
}

/// Options for [`encode`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FoldOptions {
    /// Violation policy.
    pub policy: FoldPolicy,
    /// Rows per parallel partition.
    pub partition_rows: usize,
}

impl Default for FoldOptions {
    fn default() -> Self {
        Self {
            policy: FoldPolicy::Strict,
            partition_rows: 65_536,
        }
    }
}

/// Output of [`encode`].
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    /// Folded batch: non-member columns in their original order, then one
    /// code column per group.
    pub batch: RecordBatch,
    /// How to undo the fold.
    pub manifest: FoldManifest,
    /// Violation counters.
    pub diagnostics: FoldDiagnostics,
}

struct PartitionCodes {
    codes: Vec<i32>,
    violations: u64,
    first_violation_row: Option<u64>,
}

/// Fold every group of `groups` in `batch`.
pub fn encode(
    batch: &RecordBatch,
    groups: &[IndicatorGroup],
    options: &FoldOptions,
) -> FoldResult<FoldOutcome> {
    let schema = batch.schema();
    let ranges = partition_ranges(batch.num_rows(), options.partition_rows);

    let mut member_positions = HashSet::new();
    let mut folded_groups = Vec::with_capacity(groups.len());
    let mut code_arrays = Vec::with_capacity(groups.len());
    let mut diagnostics = FoldDiagnostics::default();

    for group in groups {
        let mut members = Vec::with_capacity(group.columns.len());
        let mut flags = Vec::with_capacity(group.columns.len());
        for name in &group.columns {
            let position = schema.index_of(name).ok().context(MissingColumnSnafu {
                group: &group.name,
                column: name,
            })?;
            let field = schema.field(position);
            let physical_type = PhysicalType::from_arrow(field.data_type())
                .filter(|t| t.is_integer() || *t == PhysicalType::Bool)
                .context(UnsupportedMemberSnafu {
                    group: &group.name,
                    column: name,
                    data_type: field.data_type().to_string(),
                })?;
            ensure!(
                member_positions.insert(position),
                CorruptManifestSnafu {
                    detail: format!("column {name} is a member of more than one group"),
                }
            );
            flags.push(member_flags(&group.name, name, batch.column(position))?);
            members.push(FoldedMember {
                name: name.clone(),
                position,
                physical_type,
                nullable: field.is_nullable(),
            });
        }

        let partitions = map_partitions(&ranges, |range| {
            fold_rows(&group.name, &flags, range, options.policy)
        })?;

        let mut codes = Vec::with_capacity(batch.num_rows());
        let mut stats = GroupDiagnostics {
            rows: batch.num_rows() as u64,
            ..GroupDiagnostics::default()
        };
        for part in partitions {
            codes.extend_from_slice(&part.codes);
            stats.violations += part.violations;
            if stats.first_violation_row.is_none() {
                stats.first_violation_row = part.first_violation_row;
            }
        }
        if stats.violations > 0 {
            warn!(
                "group {}: {} row(s) without exactly one active member coded as {SENTINEL_CODE}",
                group.name, stats.violations
            );
        }

        let code_type = code_type_for(members.len());
        let codes: ArrayRef = Arc::new(Int32Array::from(codes));
        code_arrays.push(cast(&codes, &code_type.to_arrow()).context(ArrowSnafu)?);
        diagnostics.groups.insert(group.name.clone(), stats);
        folded_groups.push(FoldedGroup {
            name: group.name.clone(),
            code_column: group.code_column(),
            code_type,
            sentinel: SENTINEL_CODE,
            members,
        });
    }

    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    for (i, field) in schema.fields().iter().enumerate() {
        if !member_positions.contains(&i) {
            fields.push(field.as_ref().clone());
            arrays.push(Arc::clone(batch.column(i)));
        }
    }
    for (group, codes) in folded_groups.iter().zip(code_arrays) {
        fields.push(Field::new(&group.code_column, group.code_type.to_arrow(), false));
        arrays.push(codes);
    }

    let out_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    let folded = RecordBatch::try_new(out_schema, arrays).context(ArrowSnafu)?;
    Ok(FoldOutcome {
        batch: folded,
        manifest: FoldManifest {
            groups: folded_groups,
        },
        diagnostics,
    })
}

/// Undo every fold in `manifest`, restoring member columns at their original
/// positions with their original types.
///
/// Sentinel codes decode to rows with no active member.
pub fn decode(batch: &RecordBatch, manifest: &FoldManifest) -> FoldResult<RecordBatch> {
    if manifest.is_empty() {
        return Ok(batch.clone());
    }
    let schema = batch.schema();
    let width = manifest
        .unfolded_width(batch.num_columns())
        .context(CorruptManifestSnafu {
            detail: "more groups than columns in the batch",
        })?;
    let mut slots: Vec<Option<(Field, ArrayRef)>> = vec![None; width];

    let mut code_columns = HashSet::new();
    for group in &manifest.groups {
        let index = schema
            .index_of(&group.code_column)
            .ok()
            .context(MissingColumnSnafu {
                group: &group.name,
                column: &group.code_column,
            })?;
        code_columns.insert(index);
        let codes = cast(batch.column(index), &DataType::Int32).context(ArrowSnafu)?;
        for (member, array) in group.members.iter().zip(unfold_codes(group, &codes)?) {
            let restored = cast(&array, &member.physical_type.to_arrow()).context(ArrowSnafu)?;
            let slot = slots.get_mut(member.position).context(CorruptManifestSnafu {
                detail: format!("member {} position {} out of range", member.name, member.position),
            })?;
            ensure!(
                slot.is_none(),
                CorruptManifestSnafu {
                    detail: format!("two members claim position {}", member.position),
                }
            );
            let field = Field::new(&member.name, member.physical_type.to_arrow(), member.nullable);
            *slot = Some((field, restored));
        }
    }

    let mut rest = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .enumerate()
        .filter(|(i, _)| !code_columns.contains(i))
        .map(|(_, (field, array))| (field.as_ref().clone(), Arc::clone(array)));
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        *slot = rest.next();
    }
    ensure!(
        rest.next().is_none(),
        CorruptManifestSnafu {
            detail: "batch has more columns than the manifest accounts for",
        }
    );

    let mut fields = Vec::with_capacity(width);
    let mut arrays = Vec::with_capacity(width);
    for (position, slot) in slots.into_iter().enumerate() {
        let (field, array) = slot.context(CorruptManifestSnafu {
            detail: format!("no column for position {position}"),
        })?;
        fields.push(field);
        arrays.push(array);
    }
    let out_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(out_schema, arrays).context(ArrowSnafu)
}

/// Code column type for a group with `members` members (sentinel included).
pub fn code_type_for(members: usize) -> PhysicalType {
    if members <= i8::MAX as usize {
        PhysicalType::Int8
    } else if members <= i16::MAX as usize {
        PhysicalType::Int16
    } else {
        PhysicalType::Int32
    }
}

fn member_flags(group: &str, column: &str, array: &ArrayRef) -> FoldResult<Int8Array> {
    ensure!(
        array.null_count() == 0,
        RangeOverflowSnafu {
            group,
            column,
            detail: format!("contains {} null value(s)", array.null_count()),
        }
    );
    let flags = cast(array, &DataType::Int8).context(ArrowSnafu)?;
    let flags = flags.as_primitive::<Int8Type>();
    let bad = flags.null_count() > 0 || flags.values().iter().any(|&v| v != 0 && v != 1);
    ensure!(
        !bad,
        RangeOverflowSnafu {
            group,
            column,
            detail: "holds a value other than 0 or 1",
        }
    );
    Ok(flags.clone())
}

fn fold_rows(
    group: &str,
    flags: &[Int8Array],
    range: Range<usize>,
    policy: FoldPolicy,
) -> FoldResult<PartitionCodes> {
    let mut out = PartitionCodes {
        codes: Vec::with_capacity(range.len()),
        violations: 0,
        first_violation_row: None,
    };
    for row in range {
        let mut active = 0usize;
        let mut code = SENTINEL_CODE as i32;
        for (i, member) in flags.iter().enumerate() {
            if member.value(row) == 1 {
                active += 1;
                code = i as i32;
            }
        }
        if active != 1 {
            ensure!(
                policy == FoldPolicy::Lenient,
                InvariantViolationSnafu { group, row, active }
            );
            out.violations += 1;
            out.first_violation_row.get_or_insert(row as u64);
            code = SENTINEL_CODE as i32;
        }
        out.codes.push(code);
    }
    Ok(out)
}

fn unfold_codes(group: &FoldedGroup, codes: &ArrayRef) -> FoldResult<Vec<ArrayRef>> {
    let codes = codes.as_primitive::<Int32Type>();
    let members = group.members.len();
    let mut columns = vec![vec![0i8; codes.len()]; members];
    for (row, code) in codes.iter().enumerate() {
        let code = code.context(InvalidCodeSnafu {
            group: &group.name,
            row,
            detail: "null code",
        })? as i64;
        if code == group.sentinel {
            continue;
        }
        let index = usize::try_from(code)
            .ok()
            .filter(|&i| i < members)
            .context(InvalidCodeSnafu {
                group: &group.name,
                row,
                detail: format!("code {code} maps to no member of {members}"),
            })?;
        columns[index][row] = 1;
    }
    Ok(columns
        .into_iter()
        .map(|values| Arc::new(Int8Array::from(values)) as ArrayRef)
        .collect())
}
