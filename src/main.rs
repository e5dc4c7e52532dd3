use anyhow::{Context, Result, anyhow, bail};
use log::{LevelFilter, Metadata, Record, debug, info};
use migbench::cli::Command;
use migbench::error::BenchError;
use migbench::report::render_profiles;
use migbench::{Cli, Config};
use ringlog::{Drain, File, LogBuilder, MultiLogBuilder, Output, Stderr};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

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

/// Check if a log record should be filtered based on per-module filters
fn should_log(metadata: &Metadata, filters: &HashMap<String, LevelFilter>) -> bool {
    let target = metadata.target();

    // Longest matching prefix wins
    filters
        .iter()
        .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, level)| metadata.level() <= *level)
        .unwrap_or(true)
}

/// Custom logger with per-module filtering that wraps ringlog
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
        if self.enabled(record.metadata())
            && let Ok(mut output) = self.output.lock()
        {
            let message = format!("{} {}\n", record.level(), record.args());
            let _ = output.write_all(message.as_bytes());
        }
    }

    fn flush(&self) {
        if let Ok(mut output) = self.output.lock() {
            let _ = output.flush();
        }
    }
}

/// Flushes the ringlog buffer in the background and once more on exit.
struct LogFlusher {
    drain: Option<Arc<Mutex<Box<dyn Drain>>>>,
}

impl LogFlusher {
    fn spawn(drain: Box<dyn Drain>) -> Self {
        let drain = Arc::new(Mutex::new(drain));
        let background = Arc::clone(&drain);
        std::thread::spawn(move || {
            loop {
                if let Ok(mut drain) = background.lock() {
                    let _ = drain.flush();
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        });
        Self { drain: Some(drain) }
    }

    fn flush(&self) {
        if let Some(drain) = &self.drain
            && let Ok(mut drain) = drain.lock()
        {
            let _ = drain.flush();
        }
        log::logger().flush();
    }
}

fn init_logging(config: &Config) -> Result<LogFlusher> {
    let log_level = config.log.level.to_level_filter();

    // Configure output destination
    let output: Box<dyn Output> = if let Some(ref log_file) = config.output.trace_log {
        // Log to file with rotation
        let backup_file = log_file.with_extension("old");
        Box::new(File::new(log_file.clone(), backup_file, LOG_FILE_MAX_SIZE)?)
    } else {
        Box::new(Stderr::new())
    };

    let filters = parse_log_filters(&config.log.filter);

    if filters.is_empty() {
        // No filters - use ringlog directly
        let base_log = LogBuilder::new()
            .output(output)
            .build()
            .map_err(|e| anyhow!("failed to initialize logger: {}", e))?;

        let drain = MultiLogBuilder::new()
            .level_filter(log_level)
            .default(base_log)
            .build()
            .start();

        Ok(LogFlusher::spawn(drain))
    } else {
        let logger = FilteredLogger {
            output: Mutex::new(output),
            max_level: log_level,
            filters,
        };

        log::set_boxed_logger(Box::new(logger)).context("failed to set logger")?;
        log::set_max_level(log_level);

        Ok(LogFlusher { drain: None })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let config_path = cli.command.config().clone();
    let config = Config::load(&config_path)?;

    let logger = init_logging(&config)?;

    let result = match cli.command {
        Command::Profiles { .. } => {
            print!("{}", render_profiles(&config.models));
            Ok(())
        }
        Command::Check { .. } => runtime(&config)?.block_on(check(config)),
        Command::Bench { output, .. } => {
            if !config.output.quiet {
                print_banner(&config, &config_path);
            }
            runtime(&config)?.block_on(bench(config, output))
        }
    };

    logger.flush();
    result
}

fn runtime(config: &Config) -> Result<tokio::runtime::Runtime> {
    // Build custom tokio runtime with specified worker threads
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads)
        .enable_all()
        .build()?)
}

fn print_banner(config: &Config, path: &std::path::Path) {
    println!("MIG Inference Benchmark");
    println!("   Config: {}", path.display());
    println!("   Target: {} ({})", config.endpoint.base_url, config.endpoint.api);
    println!(
        "   Models: {}",
        config
            .models
            .iter()
            .map(|m| m.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "   Repetitions: {} Concurrency: {}",
        config.benchmark.repetitions, config.benchmark.concurrency
    );
    if let Some(deadline) = config.benchmark.deadline {
        println!("   Deadline: {}s", deadline);
    }
    println!();
}

fn start_admin(config: &Config) -> Result<()> {
    if let Some(ref admin_config) = config.admin
        && admin_config.enabled
    {
        let addr: std::net::SocketAddr = admin_config
            .listen
            .parse()
            .with_context(|| format!("invalid admin listen address: {}", admin_config.listen))?;

        tokio::spawn(async move {
            migbench::admin::start_server(addr).await;
        });
    }
    Ok(())
}

async fn bench(config: Config, output: Option<PathBuf>) -> Result<()> {
    start_admin(&config)?;

    info!("Starting benchmark run");
    let report = migbench::run_benchmark(&config).await?;

    if !config.output.quiet {
        println!();
        print!("{}", report.render_text());
        println!();
    }

    let format = config.output.format;
    let path = match output {
        Some(path) => report.save(&path, format)?,
        None => {
            let dir = &config.output.dir;
            std::fs::create_dir_all(dir).map_err(|e| BenchError::render(dir, e))?;
            report.save_in(dir, format)?
        }
    };

    debug!("Report format: {:?}", format);
    println!("Report written to {}", path.display());
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let results = migbench::check_models(&config).await?;

    let mut missing = 0;
    for result in &results {
        if result.available {
            println!("  ok       {:<10} {}", result.target.id, result.target.name);
        } else {
            missing += 1;
            println!(
                "  missing  {:<10} {}  (run: ollama pull {})",
                result.target.id, result.target.name, result.target.name
            );
        }
    }

    if missing > 0 {
        bail!("{} of {} models are not available", missing, results.len());
    }

    println!("All {} models available at {}", results.len(), config.endpoint.base_url);
    Ok(())
}
