//! # Target Store
//! On-disk registry of watch targets, so `webwatch list` can show what was
//! registered by earlier `webwatch watch` runs. TOML or JSON, selected by
//! file extension. The monitoring core never reads or writes this; only the
//! CLI does.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

const ENV_PATH: &str = "WEBWATCH_STORE_PATH";
const DEFAULT_PATH: &str = "config/targets.json";

/// One persisted watch target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTarget {
    pub url: String,
    /// Humanized duration, e.g. `"5m"`.
    pub interval: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub normalize_whitespace: bool,
    #[serde(default)]
    pub ignore_timestamps: bool,
    pub created_at: DateTime<Utc>,
}

/// url → target, ordered for stable file output.
pub type TargetMap = BTreeMap<String, StoredTarget>;

/// Store location: `$WEBWATCH_STORE_PATH` if set, else `config/targets.json`
/// relative to the working directory.
pub fn store_path() -> PathBuf {
    std::env::var(ENV_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_PATH))
}

/// Load the target map. A missing file is an empty map, not an error.
pub async fn load_targets(path: &Path) -> Result<TargetMap> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TargetMap::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("reading targets from {}", path.display()))
        }
    };
    parse_targets(&content, extension(path))
        .with_context(|| format!("parsing targets from {}", path.display()))
}

/// Write the target map, creating parent directories as needed.
pub async fn save_targets(path: &Path, targets: &TargetMap) -> Result<()> {
    let serialized = match extension(path).as_str() {
        "toml" => toml::to_string_pretty(targets).context("encoding targets as TOML")?,
        _ => serde_json::to_string_pretty(targets).context("encoding targets as JSON")?,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    fs::write(path, serialized)
        .await
        .with_context(|| format!("writing targets to {}", path.display()))
}

/// Merge new entries into the stored map and write it back.
pub async fn upsert_targets(path: &Path, entries: Vec<StoredTarget>) -> Result<()> {
    let mut targets = load_targets(path).await.unwrap_or_else(|e| {
        // A corrupted store shouldn't block new registrations.
        tracing::warn!("target store unreadable, starting fresh: {e:#}");
        TargetMap::new()
    });
    for entry in entries {
        targets.insert(entry.url.clone(), entry);
    }
    save_targets(path, &targets).await
}

fn parse_targets(content: &str, hint_ext: String) -> Result<TargetMap> {
    if hint_ext == "toml" {
        return toml::from_str(content).map_err(|e| anyhow!(e));
    }
    if let Ok(parsed) = serde_json::from_str(content) {
        return Ok(parsed);
    }
    // Fallback for stores written with a different extension.
    toml::from_str(content).map_err(|e| anyhow!(e))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}
