//! Runtime configuration: JSON file plus environment overrides

use crate::scanner::ScanEngine;
use crate::subject::DEFAULT_MAX_FILE_SIZE;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_VT_BASE_URL: &str = "https://www.virustotal.com/api/v3";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HISTORY_DIR: &str = ".scanboard";

/// Which reputation provider backs the `virustotal` engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Heuristic simulation, no network
    #[default]
    Simulated,
    /// Live VirusTotal v3 API
    VirusTotal,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" | "mock" => Ok(ProviderKind::Simulated),
            "virustotal" | "vt" | "live" => Ok(ProviderKind::VirusTotal),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Simulated => f.write_str("simulated"),
            ProviderKind::VirusTotal => f.write_str("virustotal"),
        }
    }
}

/// scanboard configuration (every field has a default)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub max_file_size: u64,
    pub history_dir: PathBuf,
    pub default_engine: ScanEngine,
    /// Seed for the simulation random source; entropy when unset
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: None,
            base_url: DEFAULT_VT_BASE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
            default_engine: ScanEngine::default(),
            seed: None,
        }
    }
}

// API key is redacted; only its presence and length are shown.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| format!("<redacted len={}>", k.len())),
            )
            .field("base_url", &self.base_url)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_attempts", &self.max_attempts)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_file_size", &self.max_file_size)
            .field("history_dir", &self.history_dir)
            .field("default_engine", &self.default_engine)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Config {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("Cannot parse config '{}'", path.display()))?;
        Ok(config)
    }

    /// Save to JSON atomically (write to .tmp then rename)
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, data)?;

        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(path);
            if let Err(rename_err) = std::fs::rename(&tmp_path, path) {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(anyhow!(
                    "Rename failed: {} (original error: {})",
                    rename_err,
                    e
                ));
            }
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("SCANBOARD_PROVIDER") {
            self.provider = provider.parse().map_err(|e: String| anyhow!(e))?;
        }

        let key = lookup("SCANBOARD_VT_API_KEY").or_else(|| lookup("VT_API_KEY"));
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            log::info!("VirusTotal API key loaded from environment variable");
            self.api_key = Some(key.trim().to_string());
        }

        if let Some(url) = lookup("SCANBOARD_VT_BASE_URL").or_else(|| lookup("VT_BASE_URL")) {
            self.base_url = url;
        }

        if let Some(dir) = lookup("SCANBOARD_HISTORY_DIR") {
            self.history_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// API key, ignoring blank values
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
