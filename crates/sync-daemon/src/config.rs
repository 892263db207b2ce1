//! Settings loading: defaults, then an optional JSON settings file, then CLI
//! flags and environment variables.

use crate::client::DEFAULT_API_URL;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use todoist_sync_core::reconcile::ReconcileConfig;
use todoist_sync_core::template::NoteTemplate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Todoist API token not set (use --token or TODOIST_TOKEN)")]
    MissingToken,

    #[error("Sync interval must be at least 1 second")]
    InvalidInterval,

    #[error("Invalid project folder '{0}': must be a relative path inside the vault")]
    InvalidProjectFolder(String),
}

/// Persisted settings, using the same keys as the plugin's settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "TodoistToken")]
    pub token: String,
    #[serde(rename = "TodoistProjectFolder")]
    pub project_folder: String,
    /// Seconds between runs
    #[serde(rename = "TodoistSyncFrequency")]
    pub sync_frequency: u64,
    /// Device allowed to run syncs; empty means any device
    #[serde(rename = "PrimarySyncDevice")]
    pub primary_device: String,
    #[serde(rename = "NoteTemplate", skip_serializing_if = "Option::is_none")]
    pub note_template: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: String::new(),
            project_folder: "Projects".to_string(),
            sync_frequency: 60,
            primary_device: String::new(),
            note_template: None,
        }
    }
}

impl Settings {
    pub fn from_json(path: &Path, json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(path, &json)
    }

    /// Overlay flags that were given on the command line or through the environment.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(token) = &args.token {
            self.token = token.clone();
        }
        if let Some(folder) = &args.project_folder {
            self.project_folder = folder.clone();
        }
        if let Some(interval) = args.interval {
            self.sync_frequency = interval;
        }
        if let Some(device) = &args.primary_device {
            self.primary_device = device.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.sync_frequency < 1 {
            return Err(ConfigError::InvalidInterval);
        }
        let folder = self.project_folder.trim();
        if folder.starts_with('/')
            || folder.contains('\\')
            || folder.split('/').any(|segment| segment == ".." || segment == ".")
        {
            return Err(ConfigError::InvalidProjectFolder(self.project_folder.clone()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync_frequency)
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        let template = self
            .note_template
            .as_ref()
            .map(NoteTemplate::new)
            .unwrap_or_default();
        ReconcileConfig::new(self.project_folder.trim()).with_template(template)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "todoist-sync")]
#[command(about = "Mirror Todoist projects into vault notes")]
pub struct Args {
    /// Path to the vault directory (supports ~ for home directory)
    #[arg(short, long, env = "TODOIST_SYNC_VAULT")]
    pub vault: String,

    /// JSON settings file
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Todoist API token
    #[arg(long, env = "TODOIST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Vault folder mirroring the project hierarchy
    #[arg(long)]
    pub project_folder: Option<String>,

    /// Seconds between syncs
    #[arg(long)]
    pub interval: Option<u64>,

    /// Only this device runs syncs
    #[arg(long)]
    pub primary_device: Option<String>,

    /// Name of this device (defaults to the host name)
    #[arg(long)]
    pub device_name: Option<String>,

    /// Todoist REST API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Run a single sync and exit
    #[arg(long)]
    pub once: bool,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Fully resolved configuration for one daemon process.
#[derive(Debug, Clone)]
pub struct Config {
    pub vault_path: PathBuf,
    pub settings: Settings,
    pub device_name: String,
    pub api_url: String,
    pub once: bool,
}

impl Config {
    pub async fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut settings = match &args.settings {
            Some(path) => Settings::load(&expand_tilde(&path.to_string_lossy())).await?,
            None => Settings::default(),
        };
        settings.apply_args(args);
        settings.validate()?;

        let device_name = args.device_name.clone().unwrap_or_else(host_name);

        Ok(Self {
            vault_path: expand_tilde(&args.vault),
            settings,
            device_name,
            api_url: args.api_url.clone(),
            once: args.once,
        })
    }
}

/// Host name from the environment, empty if unknown.
fn host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default()
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}
