use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use arrow::array::{AsArray, RecordBatch};
use arrow::datatypes::{DataType, Int64Type};
use async_trait::async_trait;
use bytes::Bytes;
use geosmart_etl_core::{
    DatasetVersion, EtlConfig, EtlPipeline, FoldPolicy, LocalStore, MemoryStore, ObjectStore,
    PipelineError, StorageError,
    container::{ContainerSchema, SchemaMismatchError},
    forest::mock_forest_batch,
    insight::{BoxError, InferenceClient},
    narrowing::NarrowingAction,
    storage::StorageResult,
    ContainerError,
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn pipeline<S: ObjectStore>(store: S) -> Result<EtlPipeline<S>, PipelineError> {
    Ok(EtlPipeline::new(EtlConfig::forest_cover(false)?, store))
}

/// Zero every soil flag of `row`, leaving it with no active member.
fn without_soil(batch: &RecordBatch, row: usize) -> Result<RecordBatch, Box<dyn std::error::Error>> {
    let schema = batch.schema();
    let mut columns = batch.columns().to_vec();
    for (i, field) in schema.fields().iter().enumerate() {
        if field.name().starts_with("Soil_Type") {
            let mut values: Vec<i64> = columns[i].as_primitive::<Int64Type>().values().to_vec();
            values[row] = 0;
            columns[i] = Arc::new(arrow::array::Int64Array::from(values));
        }
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

#[tokio::test]
async fn process_then_load_returns_the_stored_batch() -> TestResult {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store))?;
    let raw = mock_forest_batch(1_000, Some(11))?;
    let version = DatasetVersion::new("v1")?;

    let report = pipeline.process(&version, &raw).await?;
    assert_eq!(report.rows, 1_000);
    assert_eq!(
        store.keys(),
        vec!["datasets/v1/dataset.parquet", "datasets/v1/profile.json"]
    );
    assert!(report.memory_bytes_after * 4 < report.memory_bytes_before);
    assert_eq!(report.diagnostics.total_violations(), 0);
    let steps: Vec<_> = report.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        steps,
        [
            "narrow",
            "fold",
            "profile",
            "write_container",
            "render_profile",
            "put_artifact",
            "put_profile"
        ]
    );

    let elevation = report.plan.get("Elevation").ok_or("no plan for Elevation")?;
    assert_eq!(elevation.action, NarrowingAction::Cast);

    let loaded = pipeline.load(&version, Some(&report.container_schema)).await?;
    assert_eq!(loaded.num_rows(), 1_000);
    assert_eq!(loaded.num_columns(), 13);
    let soil = loaded.column(loaded.schema().index_of("Soil_Type_code")?);
    assert_eq!(soil.data_type(), &DataType::Int8);
    assert_eq!(soil.null_count(), 0);

    let profile = pipeline.load_profile(&version).await?;
    assert_eq!(profile.row_count, 1_000);
    let summary = profile.column("Elevation").ok_or("no Elevation summary")?;
    assert_eq!(summary.max, Some(3500.0));
    Ok(())
}

#[tokio::test]
async fn load_unfolded_restores_one_hot_columns() -> TestResult {
    let pipeline = pipeline(MemoryStore::new())?;
    let raw = mock_forest_batch(300, Some(5))?;
    let version = DatasetVersion::new("v1")?;
    pipeline.process(&version, &raw).await?;

    let narrowed = pipeline.transform(&raw)?.narrowed.batch;
    let unfolded = pipeline.load_unfolded(&version).await?;
    assert_eq!(unfolded.num_columns(), narrowed.num_columns());
    for (i, field) in narrowed.schema().fields().iter().enumerate() {
        assert_eq!(unfolded.schema().field(i).name(), field.name());
        assert_eq!(unfolded.column(i).as_ref(), narrowed.column(i).as_ref(), "{}", field.name());
    }
    Ok(())
}

#[tokio::test]
async fn local_store_round_trip() -> TestResult {
    let tmp = TempDir::new()?;
    let pipeline = pipeline(LocalStore::new(tmp.path()))?;
    let raw = mock_forest_batch(200, Some(3))?;
    let version = DatasetVersion::new("2026-10-14")?;

    let report = pipeline.process(&version, &raw).await?;
    assert!(tmp.path().join("datasets/2026-10-14/dataset.parquet").exists());
    assert!(tmp.path().join("datasets/2026-10-14/profile.json").exists());

    let loaded = pipeline.load(&version, None).await?;
    assert_eq!(
        ContainerSchema::for_batch(&loaded.schema(), &report.container_schema.folds)?,
        report.container_schema
    );
    Ok(())
}

#[tokio::test]
async fn load_with_different_expected_schema_is_rejected() -> TestResult {
    let pipeline = pipeline(MemoryStore::new())?;
    let version = DatasetVersion::new("v1")?;
    let report = pipeline
        .process(&version, &mock_forest_batch(50, Some(2))?)
        .await?;

    let mut expected = report.container_schema.clone();
    expected.columns[0].nullable = !expected.columns[0].nullable;
    let err = pipeline.load(&version, Some(&expected)).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Container {
            source: ContainerError::SchemaMismatch {
                source: SchemaMismatchError::NullabilityMismatch { .. }
            }
        }
    ));
    Ok(())
}

#[tokio::test]
async fn strict_violation_writes_nothing_and_lenient_counts_it() -> TestResult {
    let raw = without_soil(&mock_forest_batch(100, Some(9))?, 42)?;
    let version = DatasetVersion::new("v1")?;

    let strict = pipeline(MemoryStore::new())?;
    let err = strict.process(&version, &raw).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Fold {
            source: geosmart_etl_core::FoldError::InvariantViolation { row: 42, active: 0, .. }
        }
    ));
    assert!(strict.store().keys().is_empty());

    let mut config = EtlConfig::forest_cover(false)?;
    config.fold_policy = FoldPolicy::Lenient;
    let lenient = EtlPipeline::new(config, MemoryStore::new());
    let report = lenient.process(&version, &raw).await?;
    let soil = &report.diagnostics.groups["Soil_Type"];
    assert_eq!(soil.violations, 1);
    assert_eq!(soil.first_violation_row, Some(42));

    let profile = lenient.load_profile(&version).await?;
    let group = profile
        .groups
        .iter()
        .find(|g| g.group == "Soil_Type")
        .ok_or("no Soil_Type distribution")?;
    assert_eq!(group.sentinel, 1);
    Ok(())
}

/// Store that, while armed, fails every `put` whose key ends with `fail_suffix`.
struct FlakyStore {
    inner: MemoryStore,
    fail_suffix: &'static str,
    armed: AtomicBool,
    puts: AtomicUsize,
}

impl FlakyStore {
    fn failing(fail_suffix: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_suffix,
            armed: AtomicBool::new(true),
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.armed.load(Ordering::SeqCst) && key.ends_with(self.fail_suffix) {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }
}

#[tokio::test]
async fn failed_artifact_put_leaves_store_empty() -> TestResult {
    let pipeline = pipeline(FlakyStore::failing("dataset.parquet"))?;
    let version = DatasetVersion::new("v1")?;
    let err = pipeline
        .process(&version, &mock_forest_batch(20, Some(1))?)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Storage { .. }));
    assert_eq!(pipeline.store().puts.load(Ordering::SeqCst), 1);
    assert!(pipeline.store().inner.keys().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_profile_put_leaves_version_uncommitted() -> TestResult {
    let pipeline = pipeline(FlakyStore::failing("profile.json"))?;
    let version = DatasetVersion::new("v1")?;
    assert!(pipeline
        .process(&version, &mock_forest_batch(20, Some(1))?)
        .await
        .is_err());

    assert_eq!(pipeline.store().inner.keys(), vec!["datasets/v1/dataset.parquet"]);
    assert!(matches!(
        pipeline.load(&version, None).await,
        Err(PipelineError::Uncommitted { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn committed_version_is_never_rewritten() -> TestResult {
    let pipeline = pipeline(FlakyStore::failing("profile.json"))?;
    pipeline.store().armed.store(false, Ordering::SeqCst);
    let version = DatasetVersion::new("v1")?;
    pipeline
        .process(&version, &mock_forest_batch(1_000, Some(12))?)
        .await?;
    assert_eq!(pipeline.store().puts.load(Ordering::SeqCst), 2);

    pipeline.store().armed.store(true, Ordering::SeqCst);
    let err = pipeline
        .process(&version, &mock_forest_batch(50, Some(13))?)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyCommitted { .. }));
    assert_eq!(pipeline.store().puts.load(Ordering::SeqCst), 2);

    let loaded = pipeline.load(&version, None).await?;
    let profile = pipeline.load_profile(&version).await?;
    assert_eq!(loaded.num_rows(), 1_000);
    assert_eq!(profile.row_count, 1_000);
    Ok(())
}

#[tokio::test]
async fn retry_after_failed_profile_put_commits_the_new_data() -> TestResult {
    let pipeline = pipeline(FlakyStore::failing("profile.json"))?;
    let version = DatasetVersion::new("v1")?;
    assert!(pipeline
        .process(&version, &mock_forest_batch(1_000, Some(14))?)
        .await
        .is_err());

    pipeline.store().armed.store(false, Ordering::SeqCst);
    pipeline
        .process(&version, &mock_forest_batch(50, Some(15))?)
        .await?;
    assert_eq!(pipeline.load(&version, None).await?.num_rows(), 50);
    assert_eq!(pipeline.load_profile(&version).await?.row_count, 50);
    Ok(())
}

#[tokio::test]
async fn stored_profile_reloads_identically() -> TestResult {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&store))?;
    let raw = mock_forest_batch(2_000, Some(16))?;
    let version = DatasetVersion::new("v1")?;
    let report = pipeline.process(&version, &raw).await?;

    let computed = pipeline.transform(&raw)?.profile;
    let reloaded = pipeline.load_profile(&version).await?;
    assert_eq!(reloaded, computed);

    let stored = store.get(&report.profile_key).await?;
    assert_eq!(reloaded.to_json_bytes()?, stored.to_vec());
    Ok(())
}

#[tokio::test]
async fn profile_over_budget_is_rejected_before_any_write() -> TestResult {
    let mut config = EtlConfig::forest_cover(false)?;
    config.profile.max_bytes = 256;
    let pipeline = EtlPipeline::new(config, MemoryStore::new());
    let err = pipeline
        .process(&DatasetVersion::new("v1")?, &mock_forest_batch(20, Some(1))?)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Profile {
            source: geosmart_etl_core::ProfileError::ProfileTooLarge { limit: 256, .. }
        }
    ));
    assert!(pipeline.store().keys().is_empty());
    Ok(())
}

#[tokio::test]
async fn standardized_artifact_stores_float32_z_scores() -> TestResult {
    let mut config = EtlConfig::forest_cover(false)?;
    config.standardize = true;
    let pipeline = EtlPipeline::new(config, MemoryStore::new());
    let version = DatasetVersion::new("scaled")?;
    pipeline
        .process(&version, &mock_forest_batch(500, Some(4))?)
        .await?;

    let loaded = pipeline.load(&version, None).await?;
    let elevation = loaded.column(loaded.schema().index_of("Elevation")?);
    assert_eq!(elevation.data_type(), &DataType::Float32);
    let values = elevation.as_primitive::<arrow::datatypes::Float32Type>();
    let mean: f64 = values.values().iter().map(|&v| v as f64).sum::<f64>() / 500.0;
    assert!(mean.abs() < 1e-3, "mean of z-scores was {mean}");
    Ok(())
}

struct EchoClient;

#[async_trait]
impl InferenceClient for EchoClient {
    async fn infer(&self, prompt: &str) -> Result<String, BoxError> {
        Ok(format!("{} bytes received", prompt.len()))
    }
}

#[tokio::test]
async fn ask_answers_from_the_stored_profile() -> TestResult {
    let pipeline = pipeline(MemoryStore::new())?;
    let version = DatasetVersion::new("v1")?;
    pipeline
        .process(&version, &mock_forest_batch(100, Some(8))?)
        .await?;

    let insight = pipeline
        .ask(&version, "What is the elevation range?", &EchoClient)
        .await?;
    assert_eq!(insight.answer, format!("{} bytes received", insight.prompt_bytes));
    assert!(insight.prompt_bytes <= pipeline.config().max_prompt_bytes);
    Ok(())
}
