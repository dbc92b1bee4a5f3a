//! Pipeline configuration.
//!
//! Everything the pipeline needs is carried by an explicit [`EtlConfig`]
//! value; nothing is read from the environment. Configurations load from
//! JSON, where every field except `layout` has a default.
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    container::ContainerOptions,
    folding::{FoldOptions, FoldPolicy},
    forest::forest_cover_layout,
    insight::PromptOptions,
    narrowing::NarrowingOptions,
    profile::ProfileOptions,
    schema::DatasetLayout,
};

use super::error::{ConfigSnafu, PipelineResult, SchemaSnafu};

fn default_float_tolerance() -> f64 {
    NarrowingOptions::default().float_tolerance
}

fn default_partition_rows() -> usize {
    65_536
}

fn default_key_prefix() -> String {
    "datasets".to_string()
}

fn default_max_prompt_bytes() -> usize {
    16 * 1024
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EtlConfig {
    /// Column declarations and indicator groups.
    pub layout: DatasetLayout,
    /// Handling of rows without exactly one active member.
    #[serde(default)]
    pub fold_policy: FoldPolicy,
    /// Relative error accepted when moving fractional columns to `float32`.
    #[serde(default = "default_float_tolerance")]
    pub float_tolerance: f64,
    /// Rows per parallel partition.
    #[serde(default = "default_partition_rows")]
    pub partition_rows: usize,
    /// Profile caps and size budget.
    #[serde(default)]
    pub profile: ProfileOptions,
    /// Container writer settings.
    #[serde(default)]
    pub container: ContainerOptions,
    /// Store z-scored continuous columns instead of narrowed raw values.
    #[serde(default)]
    pub standardize: bool,
    /// Key prefix under which versions are stored.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Largest prompt sent to the inference client, in bytes.
    #[serde(default = "default_max_prompt_bytes")]
    pub max_prompt_bytes: usize,
}

impl EtlConfig {
    /// Default settings for `layout`.
    pub fn new(layout: DatasetLayout) -> Self {
        Self {
            layout,
            fold_policy: FoldPolicy::default(),
            float_tolerance: default_float_tolerance(),
            partition_rows: default_partition_rows(),
            profile: ProfileOptions::default(),
            container: ContainerOptions::default(),
            standardize: false,
            key_prefix: default_key_prefix(),
            max_prompt_bytes: default_max_prompt_bytes(),
        }
    }

    /// Preset for the forest cover-type dataset.
    pub fn forest_cover(include_id: bool) -> PipelineResult<Self> {
        let layout = forest_cover_layout(include_id).context(SchemaSnafu)?;
        Ok(Self::new(layout))
    }

    /// Parse a JSON configuration; the layout is validated while parsing.
    pub fn from_json(text: &str) -> PipelineResult<Self> {
        serde_json::from_str(text).context(ConfigSnafu)
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> PipelineResult<String> {
        serde_json::to_string_pretty(self).context(ConfigSnafu)
    }

    pub(crate) fn narrowing_options(&self) -> NarrowingOptions {
        NarrowingOptions {
            float_tolerance: self.float_tolerance,
        }
    }

    pub(crate) fn fold_options(&self) -> FoldOptions {
        FoldOptions {
            policy: self.fold_policy,
            partition_rows: self.partition_rows,
        }
    }

    pub(crate) fn prompt_options(&self) -> PromptOptions {
        PromptOptions {
            max_bytes: self.max_prompt_bytes,
            top_k: self.profile.top_k,
        }
    }
}
