use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::media::kind::parse_extension_list;

pub const ENABLED_KEY: &str = "MEDIA_INDEX_ENABLED";
pub const ROOT_KEY: &str = "MEDIA_INDEX_ROOT";
pub const EXTENSIONS_KEY: &str = "MEDIA_INDEX_EXTENSIONS";
pub const WORKERS_KEY: &str = "MEDIA_INDEX_WORKERS";
pub const REHASH_KEY: &str = "MEDIA_INDEX_REHASH";
pub const FFPROBE_KEY: &str = "MEDIA_INDEX_FFPROBE";

const KEYS: &[&str] = &[
    ENABLED_KEY,
    ROOT_KEY,
    EXTENSIONS_KEY,
    WORKERS_KEY,
    REHASH_KEY,
    FFPROBE_KEY,
];

/// Everything a sweep needs to know about where and what to index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexerConfig {
    pub enabled: bool,
    pub root: String,
    /// Extra extensions on top of the built-in image/video set.
    pub extensions: Vec<String>,
    pub workers: usize,
    /// Recompute checksums on every sweep instead of trusting stored ones.
    pub rehash_always: bool,
    pub ffprobe: PathBuf,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: String::new(),
            extensions: Vec::new(),
            workers: default_workers(),
            rehash_always: false,
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl IndexerConfig {
    /// Defaults, then the env file (if it exists), then process environment.
    pub fn load(env_file: &Path) -> Result<Self> {
        let mut config = Self::default();

        if env_file.exists() {
            for (key, value) in load_from_env(env_file)? {
                config.apply(&key, &value)?;
            }
            info!("Loaded configuration from {:?}", env_file);
        }

        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                debug!("Configuration override from environment: {}", key);
                config.apply(key, &value)?;
            }
        }

        Ok(config)
    }

    /// Applies one `KEY=VALUE` setting. Unknown keys are ignored.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key.trim() {
            ENABLED_KEY => self.enabled = parse_bool(key, value)?,
            ROOT_KEY => self.root = value.to_string(),
            EXTENSIONS_KEY => self.extensions = parse_extension_list(value),
            WORKERS_KEY => {
                let workers: usize = value
                    .parse()
                    .with_context(|| format!("{} must be a positive integer, got '{}'", key, value))?;
                if workers == 0 {
                    return Err(anyhow!("{} must be at least 1", key));
                }
                self.workers = workers;
            }
            REHASH_KEY => self.rehash_always = parse_bool(key, value)?,
            FFPROBE_KEY => self.ffprobe = PathBuf::from(value),
            _ => {}
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean, got '{}'", key, value)),
    }
}

fn load_from_env(path: &Path) -> Result<Vec<(String, String)>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = BufReader::new(file);

    let mut pairs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            pairs.push((key.trim().to_string(), value.to_string()));
        }
    }

    Ok(pairs)
}

pub fn save_to_env(path: &Path, config: &IndexerConfig) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    writeln!(file, "{}={}", ENABLED_KEY, config.enabled)?;
    writeln!(file, "{}={}", ROOT_KEY, config.root)?;
    writeln!(file, "{}={}", EXTENSIONS_KEY, config.extensions.join(","))?;
    writeln!(file, "{}={}", WORKERS_KEY, config.workers)?;
    writeln!(file, "{}={}", REHASH_KEY, config.rehash_always)?;
    writeln!(file, "{}={}", FFPROBE_KEY, config.ffprobe.display())?;
    Ok(())
}
