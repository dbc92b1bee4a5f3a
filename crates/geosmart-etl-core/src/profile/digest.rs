//! Compact, AI-facing view of a [`Profile`].
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::{Profile, error::SerializeSnafu, ProfileResult};

/// Headline statistics of one continuous column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDigest {
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Sample standard deviation.
    pub std: Option<f64>,
    /// Smallest value.
    pub min: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
}

/// Share of rows taken by one group member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberShare {
    /// Member column name.
    pub member: String,
    /// Fraction of rows, in `[0, 1]`.
    pub share: f64,
}

/// The profile reduced to what a prompt needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileDigest {
    /// Rows in the dataset.
    pub dataset_rows: u64,
    /// Per continuous column headline statistics.
    pub columns: BTreeMap<String, ColumnDigest>,
    /// Most frequent members per group, largest share first.
    pub top_members: BTreeMap<String, Vec<MemberShare>>,
    /// Normalized label frequencies per target column.
    pub label_balance: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ProfileDigest {
    /// Build a digest keeping the `top_k` most frequent members of each group.
    ///
    /// Ties are broken by code, so the digest is deterministic.
    pub fn from_profile(profile: &Profile, top_k: usize) -> Self {
        let rows = profile.row_count.max(1) as f64;

        let columns = profile
            .continuous
            .iter()
            .map(|c| {
                let digest = ColumnDigest {
                    mean: c.mean,
                    std: c.std_dev,
                    min: c.min,
                    max: c.max,
                };
                (c.column.clone(), digest)
            })
            .collect();

        let top_members = profile
            .groups
            .iter()
            .map(|g| {
                let mut ranked: Vec<_> = g.frequencies.iter().filter(|f| f.count > 0).collect();
                ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.code.cmp(&b.code)));
                let shares = ranked
                    .into_iter()
                    .take(top_k)
                    .map(|f| MemberShare {
                        member: f.member.clone(),
                        share: f.count as f64 / rows,
                    })
                    .collect();
                (g.group.clone(), shares)
            })
            .collect();

        let label_balance = profile
            .targets
            .iter()
            .map(|t| {
                let mut balance: BTreeMap<String, f64> = t
                    .counts
                    .iter()
                    .map(|(label, count)| (label.to_string(), *count as f64 / rows))
                    .collect();
                if t.other > 0 {
                    balance.insert("other".to_string(), t.other as f64 / rows);
                }
                (t.column.clone(), balance)
            })
            .collect();

        Self {
            dataset_rows: profile.row_count,
            columns,
            top_members,
            label_balance,
        }
    }

    /// Compact JSON rendering.
    pub fn to_json(&self) -> ProfileResult<String> {
        serde_json::to_string(self).context(SerializeSnafu)
    }
}
