//! Processing report returned by [`super::EtlPipeline::process`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    container::ContainerSchema, folding::FoldDiagnostics, narrowing::NarrowingPlan,
};

use super::DatasetVersion;

/// Timing entry for one pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineStep {
    /// Step name (stable identifier).
    pub name: String,
    /// Elapsed wall time in milliseconds.
    pub elapsed_ms: u128,
    /// Key/value annotations captured during the step.
    pub fields: Vec<(String, String)>,
}

/// Summary of one processed dataset version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EtlReport {
    /// Version that was written.
    pub version: DatasetVersion,
    /// Rows in the dataset.
    pub rows: usize,
    /// Key of the columnar artifact.
    pub artifact_key: String,
    /// Key of the profile document.
    pub profile_key: String,
    /// Encoded artifact size.
    pub artifact_bytes: usize,
    /// Rendered profile size.
    pub profile_bytes: usize,
    /// In-memory size of the raw batch.
    pub memory_bytes_before: usize,
    /// In-memory size of the narrowed and folded batch.
    pub memory_bytes_after: usize,
    /// Per-column narrowing decisions.
    pub plan: NarrowingPlan,
    /// Columns kept at their source width.
    pub warnings: Vec<String>,
    /// Fold violation counters.
    pub diagnostics: FoldDiagnostics,
    /// Schema embedded in the artifact.
    pub container_schema: ContainerSchema,
    /// Per-step timing breakdown.
    pub steps: Vec<PipelineStep>,
    /// Total elapsed wall time in milliseconds.
    pub total_ms: u128,
}

impl EtlReport {
    /// Memory saved by narrowing and folding, as a fraction of the raw size.
    pub fn memory_reduction(&self) -> f64 {
        if self.memory_bytes_before == 0 {
            return 0.0;
        }
        1.0 - self.memory_bytes_after as f64 / self.memory_bytes_before as f64
    }

    /// Timing entry for `name`.
    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Collects step timings while the pipeline runs.
#[derive(Debug)]
pub(crate) struct StepTimer {
    start: Instant,
    steps: Vec<PipelineStep>,
}

impl StepTimer {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            steps: Vec::new(),
        }
    }

    pub(crate) fn push_step<I>(&mut self, name: &str, elapsed: Duration, fields: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.steps.push(PipelineStep {
            name: name.to_string(),
            elapsed_ms: elapsed.as_millis(),
            fields: fields.into_iter().collect(),
        });
    }

    /// Run `f` and record it as step `name`.
    pub(crate) fn time<T, E>(
        &mut self,
        name: &str,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let started = Instant::now();
        let out = f()?;
        self.push_step(name, started.elapsed(), []);
        Ok(out)
    }

    /// Steps so far and total elapsed milliseconds.
    pub(crate) fn finish(self) -> (Vec<PipelineStep>, u128) {
        (self.steps, self.start.elapsed().as_millis())
    }
}
