//! End-to-end ETL orchestration.
//!
//! [`EtlPipeline::process`] runs every transformation in memory first
//! (narrow, fold, summarize, optionally standardize, encode, render and
//! budget-check the profile) and only then writes to the store: the artifact
//! first, the profile second. A version counts as committed once its profile
//! exists, so a failed run never leaves a profile pointing at a missing or
//! partial artifact. Committed versions are never rewritten.
//!
//! Persisted layout:
//!
//! ```text
//! <prefix>/<version>/dataset.parquet
//! <prefix>/<version>/profile.json
//! ```
pub mod config;
pub mod error;
pub mod report;

use std::{fmt, time::Instant};

use arrow::array::RecordBatch;
use bytes::Bytes;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    container::{ContainerResult, ContainerSchema, inspect_container, read_container, write_container},
    folding::{FoldOutcome, decode, encode},
    insight::{Insight, InferenceClient, ask},
    narrowing::{NarrowedBatch, batch_memory, narrow},
    profile::{Profile, summarize_parallel},
    standardize::standardize,
    storage::{ObjectStore, StorageError, validate_key},
};

pub use config::EtlConfig;
pub use error::{PipelineError, PipelineResult};
pub use report::{EtlReport, PipelineStep};

use error::{
    AlreadyCommittedSnafu, ContainerSnafu, FoldSnafu, InsightSnafu, InvalidVersionSnafu,
    NarrowingSnafu, ProfileSnafu, StandardizeSnafu, StorageSnafu, UncommittedSnafu,
};
use report::StepTimer;

const ARTIFACT_FILE: &str = "dataset.parquet";
const PROFILE_FILE: &str = "profile.json";

/// Identifier of one stored dataset version, usable as a key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetVersion(String);

impl DatasetVersion {
    /// Validate a version: 1 to 128 characters from `[A-Za-z0-9._-]`, not
    /// `.` or `..`.
    pub fn new(version: impl Into<String>) -> PipelineResult<Self> {
        let version = version.into();
        let reason = if version.is_empty() {
            Some("version is empty")
        } else if version.len() > 128 {
            Some("version is longer than 128 characters")
        } else if version == "." || version == ".." {
            Some("version cannot be a relative path segment")
        } else if !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            Some("only ASCII letters, digits, '.', '_' and '-' are allowed")
        } else {
            None
        };
        match reason {
            Some(reason) => InvalidVersionSnafu { version, reason }.fail(),
            None => Ok(Self(version)),
        }
    }

    /// The version string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the columnar artifact under `prefix`.
    pub fn artifact_key(&self, prefix: &str) -> String {
        self.key(prefix, ARTIFACT_FILE)
    }

    /// Key of the profile document under `prefix`.
    pub fn profile_key(&self, prefix: &str) -> String {
        self.key(prefix, PROFILE_FILE)
    }

    fn key(&self, prefix: &str, file: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}/{file}", self.0)
        } else {
            format!("{prefix}/{}/{file}", self.0)
        }
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DatasetVersion {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DatasetVersion> for String {
    fn from(value: DatasetVersion) -> Self {
        value.0
    }
}

/// Everything [`EtlPipeline::transform`] produces, before anything is stored.
#[derive(Debug, Clone)]
pub struct Transformed {
    /// Narrowing output, including the plan and memory sizes.
    pub narrowed: NarrowedBatch,
    /// Folded batch, manifest and violation counters.
    pub folded: FoldOutcome,
    /// Profile of the folded dataset.
    pub profile: Profile,
    /// Rendered profile, within the configured budget.
    pub profile_json: Bytes,
    /// Schema embedded in the artifact.
    pub container_schema: ContainerSchema,
    /// Encoded columnar artifact.
    pub artifact: Bytes,
}

/// Configured ETL pipeline over an object store.
#[derive(Debug)]
pub struct EtlPipeline<S> {
    config: EtlConfig,
    store: S,
}

impl<S: ObjectStore> EtlPipeline<S> {
    /// Create a pipeline; the layout inside `config` is already validated.
    pub fn new(config: EtlConfig, store: S) -> Self {
        Self { config, store }
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run every transformation on `batch` without touching the store.
    pub fn transform(&self, batch: &RecordBatch) -> PipelineResult<Transformed> {
        self.transform_timed(batch, &mut StepTimer::new())
    }

    fn transform_timed(
        &self,
        batch: &RecordBatch,
        timer: &mut StepTimer,
    ) -> PipelineResult<Transformed> {
        let layout = &self.config.layout;

        let narrowed = timer
            .time("narrow", || {
                narrow(batch, layout, &self.config.narrowing_options())
            })
            .context(NarrowingSnafu)?;
        info!(
            "narrowed {} columns: {} -> {} bytes",
            narrowed.plan.columns().len(),
            narrowed.memory_bytes_before,
            narrowed.memory_bytes_after
        );

        let folded = timer
            .time("fold", || {
                encode(&narrowed.batch, layout.groups(), &self.config.fold_options())
            })
            .context(FoldSnafu)?;
        let violations = folded.diagnostics.total_violations();
        if violations > 0 {
            warn!("{violations} rows written with the sentinel code");
        }
        info!(
            "folded {} groups into {} columns",
            folded.manifest.groups.len(),
            folded.batch.num_columns()
        );

        let profile = timer
            .time("profile", || {
                summarize_parallel(
                    &folded.batch,
                    layout,
                    &folded.manifest,
                    &self.config.profile,
                    self.config.partition_rows,
                )
            })
            .context(ProfileSnafu)?;

        let stored = if self.config.standardize {
            let columns: Vec<&str> = layout.continuous().map(|(name, _)| name).collect();
            timer
                .time("standardize", || standardize(&folded.batch, &profile, &columns))
                .context(StandardizeSnafu)?
        } else {
            folded.batch.clone()
        };

        let (container_schema, artifact) = timer
            .time("write_container", || -> ContainerResult<_> {
                let schema = ContainerSchema::for_batch(&stored.schema(), &folded.manifest)?;
                let bytes = write_container(&stored, &schema, &self.config.container)?;
                Ok((schema, bytes))
            })
            .context(ContainerSnafu)?;

        let profile_json = timer
            .time("render_profile", || {
                profile.ensure_within(self.config.profile.max_bytes)
            })
            .context(ProfileSnafu)?;
        info!(
            "artifact {} bytes, profile {} bytes",
            artifact.len(),
            profile_json.len()
        );

        Ok(Transformed {
            narrowed,
            folded,
            profile,
            profile_json: Bytes::from(profile_json),
            container_schema,
            artifact,
        })
    }

    /// Transform `batch` and store it as `version`.
    ///
    /// Nothing is written unless every transformation succeeds. A version
    /// that already has a profile is refused with `AlreadyCommitted`.
    pub async fn process(
        &self,
        version: &DatasetVersion,
        batch: &RecordBatch,
    ) -> PipelineResult<EtlReport> {
        let mut timer = StepTimer::new();
        let artifact_key = version.artifact_key(&self.config.key_prefix);
        let profile_key = version.profile_key(&self.config.key_prefix);
        validate_key(&artifact_key).context(StorageSnafu)?;
        validate_key(&profile_key).context(StorageSnafu)?;
        match self.committed_profile(version).await {
            Ok(_) => {
                return AlreadyCommittedSnafu {
                    version: version.as_str(),
                }
                .fail();
            }
            Err(PipelineError::Uncommitted { .. }) => {}
            Err(e) => return Err(e),
        }

        let transformed = self.transform_timed(batch, &mut timer)?;

        let started = Instant::now();
        self.store
            .put(&artifact_key, transformed.artifact.clone())
            .await
            .context(StorageSnafu)?;
        timer.push_step(
            "put_artifact",
            started.elapsed(),
            [("key".to_string(), artifact_key.clone())],
        );

        let started = Instant::now();
        self.store
            .put(&profile_key, transformed.profile_json.clone())
            .await
            .context(StorageSnafu)?;
        timer.push_step(
            "put_profile",
            started.elapsed(),
            [("key".to_string(), profile_key.clone())],
        );
        info!("committed dataset version {version}");

        let (steps, total_ms) = timer.finish();
        let Transformed {
            narrowed,
            folded,
            profile_json,
            container_schema,
            artifact,
            ..
        } = transformed;
        Ok(EtlReport {
            version: version.clone(),
            rows: batch.num_rows(),
            artifact_key,
            profile_key,
            artifact_bytes: artifact.len(),
            profile_bytes: profile_json.len(),
            memory_bytes_before: narrowed.memory_bytes_before,
            memory_bytes_after: batch_memory(&folded.batch),
            plan: narrowed.plan,
            warnings: narrowed.warnings,
            diagnostics: folded.diagnostics,
            container_schema,
            steps,
            total_ms,
        })
    }

    async fn committed_profile(&self, version: &DatasetVersion) -> PipelineResult<Bytes> {
        let key = version.profile_key(&self.config.key_prefix);
        match self.store.get(&key).await {
            Ok(bytes) => Ok(bytes),
            Err(e @ StorageError::NotFound { .. }) => Err(e).context(UncommittedSnafu {
                version: version.as_str(),
            }),
            Err(e) => Err(e).context(StorageSnafu),
        }
    }

    /// Load the stored profile of a committed version.
    pub async fn load_profile(&self, version: &DatasetVersion) -> PipelineResult<Profile> {
        let bytes = self.committed_profile(version).await?;
        Profile::from_json_bytes(&bytes).context(ProfileSnafu)
    }

    /// Load the stored artifact of a committed version.
    ///
    /// With `expected`, the embedded schema must match it exactly; without,
    /// the embedded schema is trusted.
    pub async fn load(
        &self,
        version: &DatasetVersion,
        expected: Option<&ContainerSchema>,
    ) -> PipelineResult<RecordBatch> {
        self.committed_profile(version).await?;
        let bytes = self
            .store
            .get(&version.artifact_key(&self.config.key_prefix))
            .await
            .context(StorageSnafu)?;
        let batch = match expected {
            Some(schema) => read_container(&bytes, schema),
            None => inspect_container(&bytes).and_then(|schema| read_container(&bytes, &schema)),
        }
        .context(ContainerSnafu)?;
        Ok(batch)
    }

    /// Load a committed version with its indicator groups expanded back to
    /// one-hot columns.
    pub async fn load_unfolded(&self, version: &DatasetVersion) -> PipelineResult<RecordBatch> {
        self.committed_profile(version).await?;
        let bytes = self
            .store
            .get(&version.artifact_key(&self.config.key_prefix))
            .await
            .context(StorageSnafu)?;
        let schema = inspect_container(&bytes).context(ContainerSnafu)?;
        let batch = read_container(&bytes, &schema).context(ContainerSnafu)?;
        decode(&batch, &schema.folds).context(FoldSnafu)
    }

    /// Answer a question about a committed version from its profile alone.
    pub async fn ask<C>(
        &self,
        version: &DatasetVersion,
        question: &str,
        client: &C,
    ) -> PipelineResult<Insight>
    where
        C: InferenceClient + ?Sized,
    {
        let profile = self.load_profile(version).await?;
        ask(client, &profile, question, &self.config.prompt_options())
            .await
            .context(InsightSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{forest::mock_forest_batch, storage::MemoryStore};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn versions_are_single_key_segments() -> TestResult {
        let v = DatasetVersion::new("2026-10-14.v1")?;
        assert_eq!(v.artifact_key("datasets"), "datasets/2026-10-14.v1/dataset.parquet");
        assert_eq!(v.profile_key("/datasets/"), "datasets/2026-10-14.v1/profile.json");
        assert_eq!(v.profile_key(""), "2026-10-14.v1/profile.json");

        for bad in ["", ".", "..", "a/b", "v 1", "v1\\x"] {
            assert!(
                matches!(DatasetVersion::new(bad), Err(PipelineError::InvalidVersion { .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(serde_json::from_str::<DatasetVersion>("\"../x\"").is_err());
        Ok(())
    }

    #[test]
    fn transform_does_not_touch_the_store() -> TestResult {
        let pipeline = EtlPipeline::new(EtlConfig::forest_cover(false)?, MemoryStore::new());
        let out = pipeline.transform(&mock_forest_batch(64, Some(1))?)?;
        assert_eq!(out.folded.batch.num_columns(), 10 + 2 + 1);
        assert_eq!(out.profile.row_count, 64);
        assert!(pipeline.store().keys().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn uncommitted_version_is_reported() -> TestResult {
        let pipeline = EtlPipeline::new(EtlConfig::forest_cover(false)?, MemoryStore::new());
        let v = DatasetVersion::new("missing")?;
        assert!(matches!(
            pipeline.load(&v, None).await,
            Err(PipelineError::Uncommitted { .. })
        ));
        assert!(matches!(
            pipeline.load_profile(&v).await,
            Err(PipelineError::Uncommitted { .. })
        ));
        Ok(())
    }
}
