use clap::ValueEnum;
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::client::{ClientConfig, ClientError, OllamaClient};
use crate::config::{Config, ConfigError};
use crate::metrics::{Metrics, RequestStatus};
use crate::table::ResultTable;

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot communicate with Ollama server: {0}")]
    Connectivity(#[source] ClientError),

    #[error("Did not find model {0} on Ollama server")]
    ModelNotAvailable(String),

    #[error("Error occurred while sending prompt request to Ollama server: {0}")]
    Request(#[source] ClientError),

    #[error("Cannot parse response from Ollama server: {0}")]
    Parse(#[source] ClientError),

    #[error("Cannot write results to {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl BenchmarkError {
    /// Short error category used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            BenchmarkError::Config(_) => "config",
            BenchmarkError::Connectivity(_) => "connectivity",
            BenchmarkError::ModelNotAvailable(_) => "model_not_available",
            BenchmarkError::Request(_) => "request",
            BenchmarkError::Parse(_) => "parse",
            BenchmarkError::Output { .. } => "output",
        }
    }

    fn from_generate(e: ClientError) -> Self {
        if e.is_parse() {
            BenchmarkError::Parse(e)
        } else {
            BenchmarkError::Request(e)
        }
    }
}

/// How configured models are checked for existence before the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ModelCheck {
    /// Membership in the /api/tags model list
    #[default]
    Tags,
    /// One /api/show lookup per model
    Show,
}

/// Run parameters that do not come from the YAML config.
#[derive(Debug, Clone)]
pub struct BenchmarkOptions {
    pub server: String,
    pub config: PathBuf,
    pub output: PathBuf,
    pub repeat: u32,
    pub skip_unloading: bool,
    pub model_check: ModelCheck,
    pub timeout: Option<Duration>,
}

/// Every (repeat, model, prompt) combination: repeat index outermost, then
/// models and prompts in config order.
pub fn combinations<'a>(
    repeat: u32,
    models: &'a [String],
    prompts: &'a [String],
) -> impl Iterator<Item = (u32, &'a str, &'a str)> + 'a {
    (0..repeat).flat_map(move |n| {
        models.iter().flat_map(move |model| {
            prompts
                .iter()
                .map(move |prompt| (n, model.as_str(), prompt.as_str()))
        })
    })
}

/// Output of a completed run.
#[derive(Debug, Clone)]
pub struct BenchmarkResults {
    pub server_version: String,
    pub table: ResultTable,
}

/// Drives the benchmark matrix against one Ollama server, one request at a time.
///
/// # Examples
///
/// ```no_run
/// use ollama_bench::benchmark::{BenchmarkOptions, BenchmarkRunner, ModelCheck};
///
/// # async fn example() -> Result<(), ollama_bench::BenchmarkError> {
/// let options = BenchmarkOptions {
///     server: "http://localhost:11434".to_string(),
///     config: "benchmark.yml".into(),
///     output: "results.csv".into(),
///     repeat: 3,
///     skip_unloading: false,
///     model_check: ModelCheck::Tags,
///     timeout: None,
/// };
/// let runner = BenchmarkRunner::new(options)?;
/// let results = runner.run().await?;
/// println!("{} rows", results.table.len());
/// # Ok(())
/// # }
/// ```
pub struct BenchmarkRunner {
    client: OllamaClient,
    config: Config,
    options: BenchmarkOptions,
}

impl BenchmarkRunner {
    /// Loads and validates the config file and creates the HTTP client.
    ///
    /// No request is made to the server here, so an invalid config fails
    /// before any network activity.
    pub fn new(options: BenchmarkOptions) -> Result<Self, BenchmarkError> {
        let config = Config::load(&options.config)?;
        debug!(
            "Loaded {} models and {} prompts from {}",
            config.models.len(),
            config.prompts.len(),
            options.config.display()
        );
        Self::with_config(config, options)
    }

    pub fn with_config(config: Config, options: BenchmarkOptions) -> Result<Self, BenchmarkError> {
        config.validate()?;

        let client = OllamaClient::new(ClientConfig {
            base_url: options.server.clone(),
            timeout: options.timeout,
        })
        .map_err(BenchmarkError::Connectivity)?;

        Ok(Self {
            client,
            config,
            options,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the whole benchmark and writes the results file.
    ///
    /// Any failure aborts the run; the results file is only written once
    /// every combination has produced a record.
    pub async fn run(&self) -> Result<BenchmarkResults, BenchmarkError> {
        let results = self.collect().await?;

        results
            .table
            .save(&self.options.output)
            .map_err(|source| BenchmarkError::Output {
                path: self.options.output.clone(),
                source,
            })?;
        info!(
            "Wrote {} results to {}",
            results.table.len(),
            self.options.output.display()
        );

        Ok(results)
    }

    /// Validates the server state and issues every generate request.
    pub async fn collect(&self) -> Result<BenchmarkResults, BenchmarkError> {
        let version = self
            .client
            .get_version()
            .await
            .map_err(BenchmarkError::Connectivity)?;
        info!("Ollama server version: {}", version);

        self.check_models().await?;

        if self.options.skip_unloading {
            debug!("Skipping unloading of running models");
        } else {
            let unloaded = self
                .client
                .unload_models()
                .await
                .map_err(BenchmarkError::Connectivity)?;
            Metrics::record_models_unloaded(unloaded.len());
        }

        let total = self.config.combinations(self.options.repeat);
        let mut results = ResultTable::with_capacity(total);

        info!("Starting benchmark");
        for (n, model, prompt) in
            combinations(self.options.repeat, &self.config.models, &self.config.prompts)
        {
            Metrics::record_request_sent();

            let record = match self.client.generate(model, prompt).await {
                Ok(record) => record,
                Err(e) => {
                    Metrics::record_request_complete(RequestStatus::Failed);
                    return Err(BenchmarkError::from_generate(e));
                }
            };

            Metrics::record_request_complete(RequestStatus::Success);
            Metrics::record_tokens(record.prompt_eval_count, record.eval_count);

            debug!(
                "Run {}: Received response from {} in {}s ({} tokens/s)",
                n + 1,
                record.model,
                record.total_duration,
                record.eval_rate
            );
            log::trace!("{}", record);

            results.push(record);
        }

        info!("Benchmark finished: {} of {} requests", results.len(), total);
        Ok(BenchmarkResults {
            server_version: version,
            table: results,
        })
    }

    async fn check_models(&self) -> Result<(), BenchmarkError> {
        match self.options.model_check {
            ModelCheck::Tags => {
                let local_models = self
                    .client
                    .get_models()
                    .await
                    .map_err(BenchmarkError::Connectivity)?;
                debug!("Models available on Ollama server: {:?}", local_models);

                if let Some(missing) = self
                    .config
                    .models
                    .iter()
                    .find(|model| !local_models.contains(model))
                {
                    return Err(BenchmarkError::ModelNotAvailable(missing.clone()));
                }
            }
            ModelCheck::Show => {
                for model in &self.config.models {
                    let exists = self
                        .client
                        .show_model(model)
                        .await
                        .map_err(BenchmarkError::Connectivity)?;
                    if !exists {
                        return Err(BenchmarkError::ModelNotAvailable(model.clone()));
                    }
                }
            }
        }

        info!("All configured models available on Ollama server");
        Ok(())
    }
}
