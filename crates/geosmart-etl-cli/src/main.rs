//! CLI tool for the GeoSmart ETL pipeline.

mod error;

use std::{
    fs::File,
    io::Seek,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{array::RecordBatch, compute::concat_batches};
use arrow_csv::{ReaderBuilder, WriterBuilder, reader::Format};
use clap::{Parser, Subcommand};
use geosmart_etl_core::{
    DatasetVersion, EtlConfig, EtlPipeline, FoldPolicy, LocalStore, ObjectStore,
    container::inspect_container,
    forest::{ID_COLUMN, mock_forest_batch},
    insight::{PromptOptions, build_prompt},
};
use log::info;
use snafu::ResultExt;

use crate::error::{
    CliResult, ContainerSnafu, CsvSnafu, EncodeCsvSnafu, JsonSnafu, MockSnafu, PipelineSnafu,
    PromptSnafu, ReadConfigSnafu, ReadInputSnafu, StorageSnafu, WriteOutputSnafu,
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Narrow, fold and profile a CSV dataset, then store it as a version
    Process {
        /// CSV file with a header row
        #[arg(long)]
        input: PathBuf,

        /// Store root directory
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        version: String,

        /// JSON pipeline config (default: forest cover-type preset)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the sentinel code for rows violating one-hot instead of failing
        #[arg(long, default_value_t = false)]
        lenient: bool,

        /// Store z-scored continuous columns
        #[arg(long, default_value_t = false)]
        standardize: bool,

        /// Print the full report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the stored profile of a version
    Profile {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        version: String,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the compact digest keeping this many members per group
        #[arg(long)]
        digest: Option<usize>,
    },

    /// Print the schema embedded in a stored artifact
    Inspect {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        version: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the prompt that would be sent to the AI model
    Prompt {
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        version: String,

        #[arg(long)]
        question: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a mock forest cover-type CSV
    Mock {
        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value_t = 1000)]
        rows: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "geosmart-etl", about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn load_config(path: Option<&Path>, include_id: bool) -> CliResult<EtlConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).context(ReadConfigSnafu {
                path: path.display().to_string(),
            })?;
            EtlConfig::from_json(&text).context(PipelineSnafu)
        }
        None => EtlConfig::forest_cover(include_id).context(PipelineSnafu),
    }
}

fn read_csv(path: &Path) -> CliResult<RecordBatch> {
    let display = path.display().to_string();
    let mut file = File::open(path).context(ReadInputSnafu { path: &display })?;

    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(&mut file, None)
        .context(CsvSnafu { path: &display })?;
    file.rewind().context(ReadInputSnafu { path: &display })?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(format)
        .build(file)
        .context(CsvSnafu { path: &display })?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(CsvSnafu { path: &display })?;
    concat_batches(&schema, &batches).context(CsvSnafu { path: &display })
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value).context(JsonSnafu)?);
    Ok(())
}

struct ProcessArgs {
    input: PathBuf,
    store: PathBuf,
    version: String,
    config: Option<PathBuf>,
    lenient: bool,
    standardize: bool,
    json: bool,
}

async fn cmd_process(args: ProcessArgs) -> CliResult<()> {
    let batch = read_csv(&args.input)?;
    let include_id = batch.schema().index_of(ID_COLUMN).is_ok();

    let mut config = load_config(args.config.as_deref(), include_id)?;
    if args.lenient {
        config.fold_policy = FoldPolicy::Lenient;
    }
    if args.standardize {
        config.standardize = true;
    }

    let version = DatasetVersion::new(args.version).context(PipelineSnafu)?;
    info!("processing {} rows from {}", batch.num_rows(), args.input.display());
    let pipeline = EtlPipeline::new(config, LocalStore::new(&args.store));
    let report = pipeline
        .process(&version, &batch)
        .await
        .context(PipelineSnafu)?;

    if args.json {
        return print_json(&report);
    }
    println!("Stored version {} ({} rows)", report.version, report.rows);
    println!("  artifact: {} ({} bytes)", report.artifact_key, report.artifact_bytes);
    println!("  profile:  {} ({} bytes)", report.profile_key, report.profile_bytes);
    println!(
        "  memory:   {} -> {} bytes ({:.1}% smaller)",
        report.memory_bytes_before,
        report.memory_bytes_after,
        report.memory_reduction() * 100.0
    );
    for warning in &report.warnings {
        println!("  warning:  {warning}");
    }
    let violations = report.diagnostics.total_violations();
    if violations > 0 {
        println!("  one-hot violations: {violations}");
    }
    Ok(())
}

async fn cmd_profile(
    store: &Path,
    version: String,
    config: Option<&Path>,
    digest: Option<usize>,
) -> CliResult<()> {
    let version = DatasetVersion::new(version).context(PipelineSnafu)?;
    let pipeline = EtlPipeline::new(load_config(config, false)?, LocalStore::new(store));
    let profile = pipeline
        .load_profile(&version)
        .await
        .context(PipelineSnafu)?;
    match digest {
        Some(top_k) => print_json(&profile.digest(top_k)),
        None => print_json(&profile),
    }
}

async fn cmd_inspect(store: &Path, version: String, config: Option<&Path>) -> CliResult<()> {
    let version = DatasetVersion::new(version).context(PipelineSnafu)?;
    let config = load_config(config, false)?;
    let store = LocalStore::new(store);
    let bytes = store
        .get(&version.artifact_key(&config.key_prefix))
        .await
        .context(StorageSnafu {
            version: version.as_str(),
        })?;
    let schema = inspect_container(&bytes).context(ContainerSnafu {
        version: version.as_str(),
    })?;
    print_json(&schema)
}

async fn cmd_prompt(
    store: &Path,
    version: String,
    question: &str,
    config: Option<&Path>,
) -> CliResult<()> {
    let version = DatasetVersion::new(version).context(PipelineSnafu)?;
    let config = load_config(config, false)?;
    let options = PromptOptions {
        max_bytes: config.max_prompt_bytes,
        top_k: config.profile.top_k,
    };
    let pipeline = EtlPipeline::new(config, LocalStore::new(store));
    let profile = pipeline
        .load_profile(&version)
        .await
        .context(PipelineSnafu)?;
    let prompt = build_prompt(&profile, question, &options).context(PromptSnafu)?;
    println!("{prompt}");
    Ok(())
}

fn cmd_mock(output: &Path, rows: usize, seed: Option<u64>) -> CliResult<()> {
    let display = output.display().to_string();
    let batch = mock_forest_batch(rows, seed).context(MockSnafu)?;
    let file = File::create(output).context(WriteOutputSnafu { path: &display })?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer
        .write(&batch)
        .context(EncodeCsvSnafu { path: &display })?;
    println!("Wrote {rows} mock rows to {display}");
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Process {
            input,
            store,
            version,
            config,
            lenient,
            standardize,
            json,
        } => {
            cmd_process(ProcessArgs {
                input,
                store,
                version,
                config,
                lenient,
                standardize,
                json,
            })
            .await
        }

        Command::Profile {
            store,
            version,
            config,
            digest,
        } => cmd_profile(&store, version, config.as_deref(), digest).await,

        Command::Inspect {
            store,
            version,
            config,
        } => cmd_inspect(&store, version, config.as_deref()).await,

        Command::Prompt {
            store,
            version,
            question,
            config,
        } => cmd_prompt(&store, version, &question, config.as_deref()).await,

        Command::Mock { output, rows, seed } => cmd_mock(&output, rows, seed),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
