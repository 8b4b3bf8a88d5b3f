//! # CLI
//! `watch` and `list` subcommands: flag parsing, duration strings, event
//! rendering, and the event-consuming loop that runs until Ctrl+C.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::monitor::{ChangeEvent, Manager, TargetConfig};
use crate::store::{self, StoredTarget};

#[derive(Debug, Parser)]
#[command(
    name = "webwatch",
    version,
    about = "Monitor URLs for content changes",
    long_about = "Watch one or more URLs and report when their content changes.\n\
                  Example:\n  webwatch watch https://example.com --interval 5m"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Monitor URLs for changes
    Watch(WatchArgs),
    /// List stored watch targets
    List(ListArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// URLs to monitor
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Check interval (e.g. 30s, 5m, 1h)
    #[arg(short = 'i', long, default_value = "5m")]
    pub interval: String,

    /// Request timeout
    #[arg(short = 't', long, default_value = "30s")]
    pub timeout: String,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Custom HTTP header (key:value), repeatable
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Write events to a file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Group name for the URLs
    #[arg(short = 'g', long)]
    pub group: Option<String>,

    /// Number of retry attempts per check
    #[arg(short = 'r', long, default_value_t = 3)]
    pub retries: u32,

    /// Time between retries
    #[arg(short = 'R', long, default_value = "10s")]
    pub retry_interval: String,

    /// Normalize whitespace to ignore insignificant changes
    #[arg(short = 'n', long)]
    pub normalize: bool,

    /// Ignore timestamps when comparing content
    #[arg(short = 'T', long)]
    pub ignore_timestamps: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Filter by group name
    #[arg(short = 'g', long)]
    pub group: Option<String>,
}

/// Parse durations like `500ms`, `30s`, `5m`, `1h`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let unit_start = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("missing unit in duration '{s}' (try 30s, 5m, 1h)"))?;
    let (number, unit) = s.split_at(unit_start);
    let value: u64 = number
        .parse()
        .with_context(|| format!("invalid duration '{s}'"))?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        _ => bail!("unknown duration unit '{unit}' in '{s}'"),
    };
    if duration.is_zero() {
        bail!("duration must be greater than zero");
    }
    Ok(duration)
}

/// Parse `key:value` header flags; malformed entries are skipped with a
/// warning.
pub fn parse_headers(raw: &[String]) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for entry in raw {
        match entry.split_once(':') {
            Some((name, value)) => {
                headers.insert(name.trim().to_owned(), value.trim().to_owned());
            }
            None => eprintln!("Warning: invalid header format: {entry} (expected 'key:value')"),
        }
    }
    headers
}

/// Render one event as a text block or a JSON line.
pub fn render_event(event: &ChangeEvent, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string(event).context("encoding event")?;
            Ok(format!("{json}\n"))
        }
        OutputFormat::Text => {
            if let Some(error) = &event.error {
                return Ok(format!("[ERROR] {}: {}\n", event.url, error));
            }
            let mut out = format!(
                "[CHANGED] {} at {}\n",
                event.url,
                event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
            if let Some(details) = &event.details {
                out.push_str(&format!("  Details: {details}\n"));
            }
            if let Some(content_type) = &event.content_type {
                out.push_str(&format!("  Content-Type: {content_type}\n"));
            }
            if let Some(status) = event.status_code {
                out.push_str(&format!("  Status Code: {status}\n"));
            }
            Ok(out)
        }
    }
}

pub async fn run_watch(args: WatchArgs) -> Result<()> {
    let interval = parse_duration(&args.interval).context("invalid interval")?;
    let timeout = parse_duration(&args.timeout).context("invalid timeout")?;
    let retry_interval = parse_duration(&args.retry_interval).context("invalid retry interval")?;
    let headers = parse_headers(&args.headers);

    let manager = Manager::new();
    let mut registered = Vec::new();
    for url in &args.urls {
        let mut config = TargetConfig::new(url.clone());
        config.interval = interval;
        config.timeout = timeout;
        config.headers = headers.clone();
        config.retry_count = args.retries;
        config.retry_interval = retry_interval;
        config.normalize_whitespace = args.normalize;
        config.ignore_timestamps = args.ignore_timestamps;

        match manager.add_with_config(config) {
            Ok(_) => {
                println!("Monitoring {url} every {}", args.interval);
                registered.push(url.clone());
            }
            Err(e) => eprintln!("Error setting up monitor for {url}: {e}"),
        }
    }
    if registered.is_empty() {
        bail!("no monitors could be set up");
    }

    if let Some(group) = &args.group {
        match manager.create_group(group, "Created via CLI") {
            Ok(_) => {
                for url in &registered {
                    if let Err(e) = manager.add_to_group(url, group) {
                        eprintln!("Error adding {url} to group '{group}': {e}");
                    }
                }
                println!("Added URLs to group: {group}");
            }
            Err(e) => eprintln!("Error creating group '{group}': {e}"),
        }
    }

    let now = Utc::now();
    let entries = registered
        .iter()
        .map(|url| StoredTarget {
            url: url.clone(),
            interval: args.interval.clone(),
            group: args.group.clone().unwrap_or_default(),
            headers: headers.clone(),
            normalize_whitespace: args.normalize,
            ignore_timestamps: args.ignore_timestamps,
            created_at: now,
        })
        .collect();
    if let Err(e) = store::upsert_targets(&store::store_path(), entries).await {
        tracing::warn!("failed to save target store: {e:#}");
    }

    let mut events = manager
        .events()
        .context("event stream already taken from this manager")?;
    manager.start();
    println!("Monitoring started. Press Ctrl+C to stop.");

    let mut output = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("creating output file {}", path.display()))?;
            println!("Writing output to file: {}", path.display());
            Some(file)
        }
        None => None,
    };

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Some(event) => {
                    let line = render_event(&event, args.format)?;
                    write_line(&mut output, &line).await?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, stopping monitors");
                manager.stop();
                break;
            }
        }
    }
    Ok(())
}

async fn write_line(output: &mut Option<File>, line: &str) -> Result<()> {
    match output {
        Some(file) => {
            file.write_all(line.as_bytes())
                .await
                .context("writing event to output file")?;
            file.flush().await.context("flushing output file")?;
        }
        None => print!("{line}"),
    }
    Ok(())
}

pub async fn run_list(args: ListArgs) -> Result<()> {
    let path = store::store_path();
    let targets = store::load_targets(&path).await?;
    if targets.is_empty() {
        println!("No targets found. Use 'webwatch watch' to add targets.");
        return Ok(());
    }

    println!("Found {} watched URLs:\n", targets.len());
    for (url, target) in &targets {
        if let Some(group) = &args.group {
            if &target.group != group {
                continue;
            }
        }
        match args.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(target).context("encoding target")?);
            }
            OutputFormat::Text => {
                println!("URL: {url}");
                println!("  Interval: {}", target.interval);
                if !target.group.is_empty() {
                    println!("  Group: {}", target.group);
                }
                if !target.headers.is_empty() {
                    println!("  Headers: {:?}", target.headers);
                }
                if target.normalize_whitespace {
                    println!("  Normalize Whitespace: true");
                }
                if target.ignore_timestamps {
                    println!("  Ignore Timestamps: true");
                }
                println!(
                    "  Added: {}",
                    target.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
                println!();
            }
        }
    }

    if args.group.is_none() {
        let mut groups: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
        for target in targets.values() {
            if !target.group.is_empty() {
                *groups.entry(target.group.as_str()).or_default() += 1;
            }
        }
        if !groups.is_empty() {
            println!("Groups:");
            for (group, count) in groups {
                println!("  {group}: {count} URLs");
            }
        }
    }
    Ok(())
}
