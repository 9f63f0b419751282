//! Daemon configuration management.
//!
//! Configuration is stored as TOML. The path comes from the
//! `RESUMABLE_UPLOADD_CONFIG` environment variable, falling back to:
//! - Linux: `~/.config/resumable-uploadd/uploadd.toml`
//! - Windows: `%APPDATA%/resumable-uploadd/uploadd.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use resumable_server::{DEFAULT_MAX_REQUEST_BYTES, ServerConfig};
use resumable_transfer::{CompletionPolicy, Layout, ProbeMode, TransferOptions};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "RESUMABLE_UPLOADD_CONFIG";

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// HTTP port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path serving probes and chunk deliveries.
    #[serde(default = "default_route")]
    pub route: String,

    /// Root of the per-upload working areas.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Directory assembled files are published to.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Largest accepted request body, chunk payload included.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// `all_chunks` or `byte_sum`.
    #[serde(default)]
    pub completion: CompletionPolicy,

    /// `verified` or `presence`.
    #[serde(default)]
    pub probe: ProbeMode,

    /// Delete a working area once its file is assembled.
    #[serde(default = "default_true")]
    pub remove_chunks_on_completion: bool,

    /// Seconds between sweeps for abandoned uploads.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Age in seconds after which an untouched working area is removed
    /// (0 = never sweep).
    #[serde(default = "default_sweep_max_age")]
    pub sweep_max_age_secs: u64,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_route() -> String {
    "/upload".into()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp/resumable")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_max_request_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BYTES
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    15 * 60
}

fn default_sweep_max_age() -> u64 {
    24 * 60 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            route: default_route(),
            scratch_dir: default_scratch_dir(),
            upload_dir: default_upload_dir(),
            max_request_bytes: default_max_request_bytes(),
            completion: CompletionPolicy::default(),
            probe: ProbeMode::default(),
            remove_chunks_on_completion: default_true(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_max_age_secs: default_sweep_max_age(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.scratch_dir, &self.upload_dir)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            completion: self.completion,
            probe: self.probe,
            remove_chunks_on_completion: self.remove_chunks_on_completion,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            port: self.port,
            route: self.route.clone(),
            max_request_bytes: self.max_request_bytes,
        }
    }

    /// Sweep interval and maximum age, or `None` when sweeping is disabled.
    pub fn sweep_schedule(&self) -> Option<(Duration, Duration)> {
        if self.sweep_max_age_secs == 0 || self.sweep_interval_secs == 0 {
            return None;
        }
        Some((
            Duration::from_secs(self.sweep_interval_secs),
            Duration::from_secs(self.sweep_max_age_secs),
        ))
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("resumable-uploadd")
            .join("uploadd.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("resumable-uploadd")
            .join("uploadd.toml"))
    }
}
