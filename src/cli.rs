use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::benchmark::{BenchmarkOptions, ModelCheck};

#[derive(Parser, Debug)]
#[command(name = "ollama-bench")]
#[command(author, version, about = "Evaluate the performance of Ollama servers", long_about = None)]
pub struct Cli {
    /// Ollama server HTTP address
    #[arg(long)]
    pub server: String,

    /// Path to config YAML file
    #[arg(long, default_value = "benchmark.yml")]
    pub config: PathBuf,

    /// Path to output CSV file
    #[arg(long, default_value = "results.csv")]
    pub output: PathBuf,

    /// Number of times to repeat the benchmark
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub num: u32,

    /// Skip unloading all running models on the server
    #[arg(long)]
    pub skip_unloading: bool,

    /// How to check that configured models exist on the server
    #[arg(long, value_enum, default_value_t = ModelCheck::Tags)]
    pub model_check: ModelCheck,

    /// Per-request timeout in seconds (no timeout when unset)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Per-module log level override, e.g. "hyper=info" (repeatable)
    #[arg(long = "log-filter")]
    pub log_filter: Vec<String>,

    /// Write logs to this file (rotated at 10MB) instead of stderr
    #[arg(long)]
    pub trace_log: Option<PathBuf>,

    /// Suppress the startup banner and the final summary
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub fn benchmark_options(&self) -> BenchmarkOptions {
        BenchmarkOptions {
            server: self.server.clone(),
            config: self.config.clone(),
            output: self.output.clone(),
            repeat: self.num,
            skip_unloading: self.skip_unloading,
            model_check: self.model_check,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}
