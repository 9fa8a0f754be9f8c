pub mod benchmark;
pub mod cli;
pub mod client;
pub mod config;
pub mod metrics;
pub mod record;
pub mod report;
pub mod table;

pub use benchmark::{BenchmarkError, BenchmarkOptions, BenchmarkRunner, ModelCheck};
pub use cli::Cli;
pub use client::{ClientConfig, ClientError, GenerateRequest, GenerateResponse, OllamaClient};
pub use config::Config;
pub use record::ResponseRecord;
pub use report::{BenchmarkReport, ReportBuilder};
pub use table::{CSV_HEADER, ResultTable};
