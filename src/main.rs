use anyhow::Result;
use log::{LevelFilter, Metadata, Record, debug, error, info};
use ollama_bench::report::{ReportBuilder, abort_summary, print_console_report};
use ollama_bench::{BenchmarkError, BenchmarkRunner, Cli};
use ringlog::{File, Output, Stderr};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

/// Maximum log file size before rotation (10MB)
const LOG_FILE_MAX_SIZE: u64 = 1024 * 1024 * 10;

/// Parse log filter strings like "hyper=info" into a map of module prefix to level filter
fn parse_log_filters(filters: &[String]) -> HashMap<String, LevelFilter> {
    let mut map = HashMap::new();
    for filter in filters {
        if let Some((module, level)) = filter.split_once('=') {
            let level_filter = match level.to_lowercase().as_str() {
                "error" => LevelFilter::Error,
                "warn" => LevelFilter::Warn,
                "info" => LevelFilter::Info,
                "debug" => LevelFilter::Debug,
                "trace" => LevelFilter::Trace,
                "off" => LevelFilter::Off,
                _ => continue,
            };
            map.insert(module.to_string(), level_filter);
        }
    }
    map
}

/// Check a record against the per-module filters. The longest matching prefix wins.
fn should_log(metadata: &Metadata, filters: &HashMap<String, LevelFilter>) -> bool {
    let target = metadata.target();

    filters
        .iter()
        .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, level_filter)| metadata.level() <= *level_filter)
        // No filter matched: the global level decides
        .unwrap_or(true)
}

/// Logger with per-module filtering that writes to a ringlog output
struct FilteredLogger {
    output: Mutex<Box<dyn Output>>,
    max_level: LevelFilter,
    filters: HashMap<String, LevelFilter>,
}

impl log::Log for FilteredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level && should_log(metadata, &self.filters)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            if let Ok(mut output) = self.output.lock() {
                let message = format!(
                    "{} {:<5} [{}] {}\n",
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false),
                    record.level(),
                    record.target(),
                    record.args()
                );
                let _ = output.write_all(message.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut output) = self.output.lock() {
            let _ = output.flush();
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli.log_level.to_level_filter();

    let output: Box<dyn Output> = if let Some(ref log_file) = cli.trace_log {
        // Log to file with rotation
        let backup_file = log_file.with_extension("old");
        Box::new(File::new(log_file.clone(), backup_file, LOG_FILE_MAX_SIZE)?)
    } else {
        Box::new(Stderr::new())
    };

    let logger = FilteredLogger {
        output: Mutex::new(output),
        max_level: log_level,
        filters: parse_log_filters(&cli.log_filter),
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(log_level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(&cli)?;

    if !cli.quiet {
        println!("Ollama Benchmark Tool");
        println!("   Server: {}", cli.server);
        println!("   Config: {}", cli.config.display());
        println!("   Output: {}", cli.output.display());
        println!("   Repeat: {}", cli.num);
        println!();
    }

    // Requests are issued strictly one at a time
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let report_builder = ReportBuilder::new(cli.server.clone()).with_output(cli.output.clone());
    let result = runtime.block_on(async { run_benchmark(&cli, &report_builder).await });

    if let Err(e) = result {
        let kind = e
            .downcast_ref::<BenchmarkError>()
            .map(|e| e.kind())
            .unwrap_or("internal");
        error!("Benchmark aborted: kind={} error={}", kind, e);
        info!("{}", abort_summary(&report_builder.counters()));
        log::logger().flush();
        std::process::exit(1);
    }

    log::logger().flush();
    Ok(())
}

async fn run_benchmark(cli: &Cli, report_builder: &ReportBuilder) -> Result<()> {
    debug!("Initializing benchmark runner");
    let runner = BenchmarkRunner::new(cli.benchmark_options())?;
    let results = runner.run().await?;
    info!("Benchmark completed successfully");

    if !cli.quiet {
        let mut report = report_builder.build(&results.table, &runner.config().models)?;
        report.server_version = Some(results.server_version);
        print_console_report(&report);
    }

    Ok(())
}
