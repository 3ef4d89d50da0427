//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MENTIONS_CONFIG_PATH";
/// Environment variable selecting the storage backend.
const STORE_BACKEND_ENV: &str = "STORE_BACKEND";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Mention extraction and notification settings.
    pub mentions: MentionSettings,
    /// Paging of list endpoints.
    pub pagination: PaginationSettings,
    /// Autocomplete settings.
    pub search: SearchSettings,
    /// Link generation.
    pub links: LinkSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// `mentions` section.
pub struct MentionSettings {
    /// Characters kept on each side of a token when storing its context.
    pub context_radius: usize,
    /// Capacity of the channel between the resolver and the notifier.
    pub notification_buffer: usize,
}

impl Default for MentionSettings {
    fn default() -> Self {
        Self {
            context_radius: 50,
            notification_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// `pagination` section.
pub struct PaginationSettings {
    /// Page size used when the client does not ask for one.
    pub default_per_page: u32,
    /// Largest page size a client may ask for.
    pub max_per_page: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// `search` section.
pub struct SearchSettings {
    /// Results returned when the client does not pass a limit.
    pub default_limit: usize,
    /// Hard cap on autocomplete results.
    pub max_limit: usize,
    /// Look-back window of the popular list, in days.
    pub popular_window_days: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 20,
            popular_window_days: 30,
        }
    }
}

impl SearchSettings {
    /// Popular window as a duration.
    pub fn popular_window(&self) -> Duration {
        Duration::from_secs(self.popular_window_days * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// `links` section.
pub struct LinkSettings {
    /// Prefix prepended to every generated profile and content URL (e.g. `https://esports.gg`).
    pub base_url: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration file");
                    config.normalized()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Clamp values that would make the service misbehave.
    fn normalized(mut self) -> Self {
        self.pagination.max_per_page = self.pagination.max_per_page.max(1);
        self.pagination.default_per_page = self
            .pagination
            .default_per_page
            .clamp(1, self.pagination.max_per_page);
        self.search.max_limit = self.search.max_limit.max(1);
        self.search.default_limit = self.search.default_limit.clamp(1, self.search.max_limit);
        self.mentions.notification_buffer = self.mentions.notification_buffer.max(1);
        self.links.base_url = self.links.base_url.trim_end_matches('/').to_owned();
        self
    }
}

/// Storage backend selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Process-local tables.
    #[default]
    Memory,
    /// MongoDB via `MONGO_URI`.
    Mongo,
    /// CouchDB via `COUCH_BASE_URL`.
    Couch,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(BackendKind::Memory),
            "mongo" | "mongodb" => Ok(BackendKind::Mongo),
            "couch" | "couchdb" => Ok(BackendKind::Couch),
            other => Err(format!("unknown storage backend `{other}`")),
        }
    }
}

impl BackendKind {
    /// Read `STORE_BACKEND`, defaulting to the in-memory store.
    pub fn from_env() -> Self {
        match env::var(STORE_BACKEND_ENV) {
            Ok(raw) => raw.parse().unwrap_or_else(|err: String| {
                warn!(error = %err, "falling back to in-memory storage");
                BackendKind::Memory
            }),
            Err(_) => BackendKind::Memory,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
