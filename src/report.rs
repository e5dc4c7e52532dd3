use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::aggregate::{AggregateStat, rank};
use crate::benchmark::RunOutcome;
use crate::config::{Config, ModelConfig, OutputFormat};
use crate::error::BenchError;
use crate::sample::duration_ms;

/// Suffixes tried when a fresh artifact name is already taken.
const MAX_NAME_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub cpus: usize,
}

impl HostInfo {
    pub fn detect() -> Self {
        let hostname = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            hostname,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: num_cpus::get(),
        }
    }
}

impl std::fmt::Display for HostInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}/{}, {} cpus)",
            self.hostname, self.os, self.arch, self.cpus
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "duration_ms::serialize")]
    pub duration: Duration,
    pub version: String,
    pub host: HostInfo,

    // Run configuration
    pub endpoint: String,
    pub api: String,
    pub prompt: String,
    pub repetitions: usize,
    pub concurrency: usize,
    pub request_timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_seconds: Option<u64>,

    /// The deadline expired and some attempts were cancelled
    pub partial: bool,
    /// Rows are ordered by throughput instead of configuration order
    pub ranked: bool,
}

/// Result of one benchmark run, ready to render.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub stats: Vec<AggregateStat>,
    /// The comparison table as rendered by [`render_table`], present in every format
    pub table: String,
    /// Partition metadata of the configured models
    pub profiles: Vec<ModelConfig>,
}

pub struct ReportBuilder {
    endpoint: String,
    api: String,
    prompt: String,
    repetitions: usize,
    concurrency: usize,
    request_timeout: u64,
    deadline: Option<u64>,
    profiles: Vec<ModelConfig>,
    started_at: DateTime<Utc>,
    duration: Duration,
    partial: bool,
    host: Option<HostInfo>,
}

impl ReportBuilder {
    pub fn new(endpoint: impl Into<String>, config: &Config) -> Self {
        Self {
            endpoint: endpoint.into(),
            api: config.endpoint.api.to_string(),
            prompt: config.benchmark.prompt.clone(),
            repetitions: config.benchmark.repetitions,
            concurrency: config.benchmark.concurrency,
            request_timeout: config.benchmark.request_timeout,
            deadline: config.benchmark.deadline,
            profiles: config.models.clone(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            partial: false,
            host: None,
        }
    }

    pub fn with_outcome(mut self, outcome: &RunOutcome) -> Self {
        self.started_at = outcome.started_at;
        self.duration = outcome.elapsed;
        self.partial = outcome.partial;
        self
    }

    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.host = Some(host);
        self
    }

    pub fn build(self, stats: Vec<AggregateStat>, ranked: bool) -> Report {
        let stats = if ranked { rank(stats) } else { stats };
        let table = render_table(&stats);

        Report {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                started_at: self.started_at,
                duration: self.duration,
                version: env!("CARGO_PKG_VERSION").to_string(),
                host: self.host.unwrap_or_else(HostInfo::detect),
                endpoint: self.endpoint,
                api: self.api,
                prompt: self.prompt,
                repetitions: self.repetitions,
                concurrency: self.concurrency,
                request_timeout_seconds: self.request_timeout,
                deadline_seconds: self.deadline,
                partial: self.partial,
                ranked,
            },
            stats,
            table,
            profiles: self.profiles,
        }
    }
}

fn format_ms(value: Option<Duration>) -> String {
    match value {
        Some(d) => format!("{:.0}", d.as_secs_f64() * 1000.0),
        None => "n/a".to_string(),
    }
}

fn format_rate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "n/a".to_string(),
    }
}

fn format_failures(stat: &AggregateStat) -> String {
    stat.failures
        .iter()
        .map(|(kind, count)| format!("{}={}", kind, count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fixed-width comparison table, one row per model.
///
/// Undefined statistics print as `n/a` so a model without a single
/// successful sample never reads as 0 tokens/s.
pub fn render_table(stats: &[AggregateStat]) -> String {
    let width = stats
        .iter()
        .map(|s| s.model.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("Model".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>8}  {:>4}  {:>6}  {:>10}  {:>8}  {:>8}  {:>8}  {:>8}",
        "Model", "Attempts", "OK", "Failed", "Tokens/s", "Min ms", "p50 ms", "p90 ms", "Max ms",
    );
    let _ = writeln!(out, "{}", "-".repeat(width + 82));

    for stat in stats {
        let _ = writeln!(
            out,
            "{:<width$}  {:>8}  {:>4}  {:>6}  {:>10}  {:>8}  {:>8}  {:>8}  {:>8}",
            stat.model.as_str(),
            stat.attempts,
            stat.sample_count,
            stat.failure_count,
            format_rate(stat.mean_tokens_per_second),
            format_ms(stat.min_latency),
            format_ms(stat.median_latency),
            format_ms(stat.p90_latency),
            format_ms(stat.max_latency),
        );
    }

    let failed: Vec<&AggregateStat> = stats.iter().filter(|s| s.failure_count > 0).collect();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures:");
        for stat in failed {
            let _ = writeln!(out, "  {}: {}", stat.model, format_failures(stat));
        }
    }

    out
}

/// Partition catalog of the configured models.
pub fn render_profiles(profiles: &[ModelConfig]) -> String {
    let dash = |v: Option<&str>| v.unwrap_or("-").to_string();
    let rows: Vec<[String; 7]> = profiles
        .iter()
        .map(|p| {
            [
                p.id.clone(),
                p.model_name().to_string(),
                dash(p.mig_profile.as_deref()),
                dash(p.gpu_memory.as_deref()),
                p.pods_per_gpu
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                dash(p.namespace.as_deref()),
                dash(p.use_case.as_deref()),
            ]
        })
        .collect();

    let headers = ["Model", "Tag", "MIG profile", "Memory", "Pods/GPU", "Namespace", "Use case"];
    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let _ = writeln!(out, "{}", line(&headers.map(String::from)));
    for row in &rows {
        let _ = writeln!(out, "{}", line(row));
    }
    out
}

impl Report {
    /// Plain text report: run header followed by the table.
    pub fn render_text(&self) -> String {
        let m = &self.metadata;
        let mut out = String::new();

        let _ = writeln!(out, "Benchmark Report");
        let _ = writeln!(
            out,
            "Generated: {}",
            m.generated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
        let _ = writeln!(out, "Host: {}", m.host);
        let _ = writeln!(out, "Endpoint: {} ({})", m.endpoint, m.api);
        let _ = writeln!(
            out,
            "Repetitions: {} Concurrency: {} Duration: {:.1}s",
            m.repetitions,
            m.concurrency,
            m.duration.as_secs_f64()
        );
        if m.partial {
            let _ = writeln!(out, "PARTIAL: deadline expired before every sample finished");
        }
        let _ = writeln!(out);
        out.push_str(&self.table);
        out
    }

    /// Self-contained HTML document with the table and bar charts.
    pub fn render_html(&self) -> String {
        let m = &self.metadata;
        let mut out = String::new();

        out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        out.push_str("<title>Inference Benchmark Report</title>\n");
        out.push_str(STYLE);
        out.push_str("</head>\n<body>\n<h1>Inference Benchmark Report</h1>\n");

        out.push_str("<table class=\"meta\">\n");
        let generated = m.generated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        for (label, value) in [
            ("Generated", generated),
            ("Host", m.host.to_string()),
            ("Endpoint", format!("{} ({})", m.endpoint, m.api)),
            ("Repetitions", m.repetitions.to_string()),
            ("Concurrency", m.concurrency.to_string()),
            ("Duration", format!("{:.1}s", m.duration.as_secs_f64())),
            ("Version", m.version.clone()),
        ] {
            let _ = writeln!(
                out,
                "<tr><th>{}</th><td>{}</td></tr>",
                label,
                escape(&value)
            );
        }
        out.push_str("</table>\n");
        let _ = writeln!(out, "<p class=\"prompt\">Prompt: {}</p>", escape(&m.prompt));

        if m.partial {
            out.push_str(
                "<p class=\"partial\">Partial run: the deadline expired before every sample finished.</p>\n",
            );
        }

        out.push_str("<h2>Results</h2>\n<table class=\"results\">\n<tr>");
        for header in [
            "Model", "Attempts", "OK", "Failed", "Tokens/s", "Min ms", "p50 ms", "p90 ms",
            "Max ms", "Failures",
        ] {
            let _ = write!(out, "<th>{}</th>", header);
        }
        out.push_str("</tr>\n");

        for stat in &self.stats {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(stat.model.as_str()),
                stat.attempts,
                stat.sample_count,
                stat.failure_count,
                format_rate(stat.mean_tokens_per_second),
                format_ms(stat.min_latency),
                format_ms(stat.median_latency),
                format_ms(stat.p90_latency),
                format_ms(stat.max_latency),
                escape(&format_failures(stat)),
            );
        }
        out.push_str("</table>\n");

        out.push_str("<h2>Throughput (tokens/s)</h2>\n");
        out.push_str(&bar_chart(
            &self
                .stats
                .iter()
                .map(|s| (s.model.as_str(), s.mean_tokens_per_second))
                .collect::<Vec<_>>(),
            "#4c78a8",
        ));

        out.push_str("<h2>Median latency (ms)</h2>\n");
        out.push_str(&bar_chart(
            &self
                .stats
                .iter()
                .map(|s| {
                    (
                        s.model.as_str(),
                        s.median_latency.map(|d| d.as_secs_f64() * 1000.0),
                    )
                })
                .collect::<Vec<_>>(),
            "#f58518",
        ));

        if !self.profiles.is_empty() {
            out.push_str("<h2>Partitions</h2>\n<table class=\"results\">\n");
            out.push_str("<tr><th>Model</th><th>Tag</th><th>MIG profile</th><th>Memory</th><th>Pods/GPU</th><th>Namespace</th><th>Use case</th></tr>\n");
            for profile in &self.profiles {
                let _ = writeln!(
                    out,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&profile.id),
                    escape(profile.model_name()),
                    escape(profile.mig_profile.as_deref().unwrap_or("-")),
                    escape(profile.gpu_memory.as_deref().unwrap_or("-")),
                    profile
                        .pods_per_gpu
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    escape(profile.namespace.as_deref().unwrap_or("-")),
                    escape(profile.use_case.as_deref().unwrap_or("-")),
                );
            }
            out.push_str("</table>\n");
        }

        let previews: Vec<&AggregateStat> =
            self.stats.iter().filter(|s| s.preview.is_some()).collect();
        if !previews.is_empty() {
            out.push_str("<h2>Sample responses</h2>\n");
            for stat in previews {
                let _ = writeln!(
                    out,
                    "<h3>{}</h3>\n<pre>{}</pre>",
                    escape(stat.model.as_str()),
                    escape(stat.preview.as_deref().unwrap_or_default())
                );
            }
        }

        out.push_str("</body>\n</html>\n");
        out
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to<W: Write>(&self, mut writer: W, format: OutputFormat) -> io::Result<()> {
        match format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, self)?;
                writeln!(writer)?;
            }
            OutputFormat::Text => writer.write_all(self.render_text().as_bytes())?,
            OutputFormat::Html => writer.write_all(self.render_html().as_bytes())?,
        }
        writer.flush()
    }

    /// File name for this report, derived from its generation time.
    pub fn artifact_name(&self, format: OutputFormat) -> String {
        format!(
            "benchmark-{}.{}",
            self.metadata.generated_at.format("%Y%m%dT%H%M%SZ"),
            format.extension()
        )
    }

    /// Write the report to exactly `path`.
    ///
    /// The content is staged in a temporary file next to `path` and moved into
    /// place only once complete. An existing file at `path` is never replaced.
    pub fn save(&self, path: &Path, format: OutputFormat) -> Result<PathBuf, BenchError> {
        let dir = parent_dir(path);
        let staged = self.stage(dir, format)?;
        staged
            .persist_noclobber(path)
            .map_err(|e| BenchError::render(path, e.error))?;
        Ok(path.to_path_buf())
    }

    /// Write the report under a fresh name inside `dir`.
    ///
    /// A numeric suffix is appended when the timestamped name already exists,
    /// so earlier reports are never overwritten.
    pub fn save_in(&self, dir: &Path, format: OutputFormat) -> Result<PathBuf, BenchError> {
        let mut staged = self.stage(dir, format)?;
        let name = self.artifact_name(format);
        let stem = name.trim_end_matches(&format!(".{}", format.extension()));

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = if attempt == 0 {
                dir.join(&name)
            } else {
                dir.join(format!("{}-{}.{}", stem, attempt, format.extension()))
            };

            match staged.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => staged = e.file,
                Err(e) => return Err(BenchError::render(path, e.error)),
            }
        }

        Err(BenchError::render(
            dir.join(name),
            io::Error::new(ErrorKind::AlreadyExists, "no free report name"),
        ))
    }

    fn stage(&self, dir: &Path, format: OutputFormat) -> Result<NamedTempFile, BenchError> {
        let mut staged = NamedTempFile::new_in(dir).map_err(|e| BenchError::render(dir, e))?;
        self.write_to(BufWriter::new(staged.as_file_mut()), format)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| BenchError::render(staged.path(), e))?;
        Ok(staged)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const CHART_WIDTH: f64 = 640.0;
const LABEL_WIDTH: f64 = 140.0;
const ROW_HEIGHT: f64 = 28.0;

/// Horizontal bar chart as inline SVG. Missing values get a label, no bar.
fn bar_chart(rows: &[(&str, Option<f64>)], color: &str) -> String {
    let max = rows
        .iter()
        .filter_map(|(_, v)| *v)
        .fold(0.0_f64, f64::max);
    let bar_space = CHART_WIDTH - LABEL_WIDTH - 80.0;
    let height = ROW_HEIGHT * rows.len() as f64 + 8.0;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
        w = CHART_WIDTH,
        h = height
    );

    for (i, (label, value)) in rows.iter().enumerate() {
        let y = 4.0 + ROW_HEIGHT * i as f64;
        let text_y = y + ROW_HEIGHT / 2.0 + 4.0;
        let _ = writeln!(
            svg,
            "<text x=\"0\" y=\"{:.1}\" font-size=\"13\">{}</text>",
            text_y,
            escape(label)
        );

        match value {
            Some(v) => {
                let width = if max > 0.0 { v / max * bar_space } else { 0.0 };
                let _ = writeln!(
                    svg,
                    "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\"/>",
                    LABEL_WIDTH,
                    y + 4.0,
                    width,
                    ROW_HEIGHT - 8.0,
                    color
                );
                let _ = writeln!(
                    svg,
                    "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\">{:.1}</text>",
                    LABEL_WIDTH + width + 6.0,
                    text_y,
                    v
                );
            }
            None => {
                let _ = writeln!(
                    svg,
                    "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" fill=\"#888\">n/a</text>",
                    LABEL_WIDTH, text_y
                );
            }
        }
    }

    svg.push_str("</svg>\n");
    svg
}

const STYLE: &str = "<style>
body { font-family: sans-serif; margin: 2em; color: #222; }
table { border-collapse: collapse; margin-bottom: 1.5em; }
th, td { border: 1px solid #ccc; padding: 4px 10px; text-align: right; }
th:first-child, td:first-child, table.meta td { text-align: left; }
.partial { color: #b00; font-weight: bold; }
.prompt { font-style: italic; }
pre { background: #f5f5f5; padding: 0.5em; white-space: pre-wrap; }
</style>
";
