//! Record of which indicator groups were folded, and how to undo it.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::PhysicalType;

/// Code written for rows whose group has no single active member under the
/// lenient policy.
pub const SENTINEL_CODE: i64 = -1;

/// One original member column of a folded group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoldedMember {
    /// Original column name.
    pub name: String,
    /// Zero-based position of the column in the unfolded batch.
    pub position: usize,
    /// Original physical type, restored on decode.
    pub physical_type: PhysicalType,
    /// Original nullability flag.
    pub nullable: bool,
}

/// One folded indicator group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoldedGroup {
    /// Group name.
    pub name: String,
    /// Name of the code column replacing the members.
    pub code_column: String,
    /// Integer type of the code column.
    pub code_type: PhysicalType,
    /// Code meaning "no single active member".
    pub sentinel: i64,
    /// Members in code order: member `i` is code `i`.
    pub members: Vec<FoldedMember>,
}

impl FoldedGroup {
    /// Member name for a code, if the code maps to one.
    pub fn member_for_code(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.members.get(i))
            .map(|m| m.name.as_str())
    }
}

/// Every fold applied to a batch, in group order.
///
/// The manifest travels inside the container schema so a reader can unfold
/// the stored dataset without access to the original layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoldManifest {
    /// Folded groups in the order their code columns were appended.
    pub groups: Vec<FoldedGroup>,
}

impl FoldManifest {
    /// True when nothing was folded.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&FoldedGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Number of columns in the unfolded batch, given the folded column count.
    pub(crate) fn unfolded_width(&self, folded_width: usize) -> Option<usize> {
        let members: usize = self.groups.iter().map(|g| g.members.len()).sum();
        folded_width
            .checked_sub(self.groups.len())
            .map(|rest| rest + members)
    }
}

/// Row counts and violations for one group.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupDiagnostics {
    /// Rows folded.
    pub rows: u64,
    /// Rows without exactly one active member (lenient policy only).
    pub violations: u64,
    /// First violating row, if any.
    pub first_violation_row: Option<u64>,
}

/// Violation counters per group, produced by every encode call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoldDiagnostics {
    /// Diagnostics keyed by group name.
    pub groups: BTreeMap<String, GroupDiagnostics>,
}

impl FoldDiagnostics {
    /// Violations summed over every group.
    pub fn total_violations(&self) -> u64 {
        self.groups.values().map(|g| g.violations).sum()
    }
}
