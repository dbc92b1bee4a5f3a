use arrow::error::ArrowError;
use geosmart_etl_core::{ContainerError, PipelineError, StorageError, insight::InsightError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Input file not found or not readable: {path}"))]
    ReadInput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse CSV {path}: {source}"))]
    Csv { path: String, source: ArrowError },

    #[snafu(display("Failed to write {path}"))]
    WriteOutput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to encode CSV {path}: {source}"))]
    EncodeCsv { path: String, source: ArrowError },

    #[snafu(display("Config file not found or not readable: {path}"))]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to generate mock data: {source}"))]
    Mock { source: ArrowError },

    #[snafu(display("{source}"))]
    Pipeline {
        #[snafu(source(from(PipelineError, Box::new)))]
        source: Box<PipelineError>,
    },

    #[snafu(display(
        "No dataset artifact for version {version}. \
         Run `geosmart-etl process` first."
    ))]
    Storage {
        version: String,
        #[snafu(source(from(StorageError, Box::new)))]
        source: Box<StorageError>,
    },

    #[snafu(display("Artifact for version {version} is not a valid container: {source}"))]
    Container {
        version: String,
        #[snafu(source(from(ContainerError, Box::new)))]
        source: Box<ContainerError>,
    },

    #[snafu(display("Failed to build prompt: {source}"))]
    Prompt {
        #[snafu(source(from(InsightError, Box::new)))]
        source: Box<InsightError>,
    },

    #[snafu(display("Failed to render JSON: {source}"))]
    Json { source: serde_json::Error },
}
