use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::metrics::CounterSnapshot;
use crate::table::ResultTable;

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    // Metadata
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub version: String,

    pub server: String,
    pub server_version: Option<String>,
    pub output: Option<PathBuf>,

    pub summary: Summary,
    pub models: Vec<ModelSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub models_unloaded: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

/// Means over every run of one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub runs: usize,
    pub mean_total_duration: f64,
    pub mean_load_duration: f64,
    pub mean_eval_rate: f64,
    pub mean_prompt_eval_rate: f64,
}

pub struct ReportBuilder {
    start_time: SystemTime,
    counters: CounterSnapshot,
    server: String,
    server_version: Option<String>,
    output: Option<PathBuf>,
}

impl ReportBuilder {
    /// Starts timing and remembers the current counter values as the baseline.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            start_time: SystemTime::now(),
            counters: CounterSnapshot::now(),
            server: server.into(),
            server_version: None,
            output: None,
        }
    }

    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = Some(version.into());
        self
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }

    /// Counter growth since the builder was created.
    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot::now().since(&self.counters)
    }

    /// Builds the report. `models` fixes the order of the per-model summaries.
    pub fn build(&self, table: &ResultTable, models: &[String]) -> Result<BenchmarkReport> {
        let duration = SystemTime::now().duration_since(self.start_time)?;
        let counters = self.counters();

        let summary = Summary {
            total_requests: counters.requests_sent,
            successful_requests: counters.requests_success,
            models_unloaded: counters.models_unloaded,
            total_input_tokens: counters.tokens_input,
            total_output_tokens: counters.tokens_output,
        };

        Ok(BenchmarkReport {
            timestamp: self.start_time.into(),
            duration,
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: self.server.clone(),
            server_version: self.server_version.clone(),
            output: self.output.clone(),
            summary,
            models: summarize_models(table, models),
        })
    }
}

/// Per-model means, in the given model order. Models without rows are skipped.
pub fn summarize_models(table: &ResultTable, models: &[String]) -> Vec<ModelSummary> {
    let mut summaries = Vec::with_capacity(models.len());

    for model in models {
        let rows: Vec<_> = table
            .records()
            .iter()
            .filter(|r| &r.model == model)
            .collect();
        if rows.is_empty() {
            continue;
        }

        let runs = rows.len();
        let mean = |f: fn(&crate::record::ResponseRecord) -> f64| -> f64 {
            rows.iter().map(|r| f(r)).sum::<f64>() / runs as f64
        };

        summaries.push(ModelSummary {
            model: model.clone(),
            runs,
            mean_total_duration: mean(|r| r.total_duration),
            mean_load_duration: mean(|r| r.load_duration),
            mean_eval_rate: mean(|r| r.eval_rate),
            mean_prompt_eval_rate: mean(|r| r.prompt_eval_rate),
        });
    }

    summaries
}

/// Print with timestamp prefix
macro_rules! output {
    () => {
        let now = chrono::Utc::now();
        println!("{}", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
    };
    ($($arg:tt)*) => {{
        let now = chrono::Utc::now();
        print!("{} ", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
        println!($($arg)*);
    }};
}

/// Request counts of a run that was aborted, for the failure log line.
pub fn abort_summary(counters: &CounterSnapshot) -> String {
    format!(
        "Requests before abort: Sent: {} Ok: {} Err: {}",
        counters.requests_sent, counters.requests_success, counters.requests_failed
    )
}

/// Summary lines of a completed run, without the timestamp prefix.
pub fn console_lines(report: &BenchmarkReport) -> Vec<String> {
    let mut lines = vec![
        "-----".to_string(),
        "Benchmark Complete".to_string(),
        format!(
            "Server: {} (version {})",
            report.server,
            report.server_version.as_deref().unwrap_or("unknown")
        ),
        format!(
            "Started: {}",
            report.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false)
        ),
        format!("Duration: {:.1}s", report.duration.as_secs_f64()),
        format!(
            "Requests: Sent: {} Ok: {}",
            report.summary.total_requests, report.summary.successful_requests
        ),
    ];
    if report.summary.models_unloaded > 0 {
        lines.push(format!("Models unloaded: {}", report.summary.models_unloaded));
    }
    lines.push(format!(
        "Tokens: Input: {} Output: {} Total: {}",
        report.summary.total_input_tokens,
        report.summary.total_output_tokens,
        report.summary.total_input_tokens + report.summary.total_output_tokens
    ));

    for model in &report.models {
        lines.push(format!(
            "Model {}: Runs: {} Total: {:.2}s Load: {:.2}s Eval: {:.2} tokens/s Prompt eval: {:.2} tokens/s",
            model.model,
            model.runs,
            model.mean_total_duration,
            model.mean_load_duration,
            model.mean_eval_rate,
            model.mean_prompt_eval_rate
        ));
    }

    if let Some(path) = &report.output {
        lines.push(format!("Results written to {}", path.display()));
    }
    lines
}

pub fn print_console_report(report: &BenchmarkReport) {
    println!();
    output!();
    for line in console_lines(report) {
        output!("{}", line);
    }
    println!();
}
