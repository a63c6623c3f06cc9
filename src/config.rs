//! Application-level configuration loading, including the kiosk location registry.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};
use uuid::{Uuid, uuid};

use crate::state::session::{Location, SessionWindows};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RIP_KIOSK_CONFIG_PATH";
/// Environment variable carrying the elevated operator credential.
const OPERATOR_TOKEN_ENV: &str = "RIP_KIOSK_OPERATOR_TOKEN";

/// Stage windows used when a session-start request does not override them.
const DEFAULT_WINDOWS: SessionWindows = SessionWindows {
    countdown_seconds: 10,
    live_seconds: 60,
    reveal_seconds: 15,
};
/// How often the sweeper scans for due auto-transitions.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    locations: IndexMap<String, Location>,
    windows: SessionWindows,
    sweep_interval: Duration,
    operator_token: Option<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in pilot location when no config file is present.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        locations = config.locations.len(),
                        "loaded kiosk location registry from config"
                    );
                    config
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
        };

        config.operator_token = env::var(OPERATOR_TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty());
        if config.operator_token.is_none() {
            warn!("no operator token configured; manual overrides require session control tokens");
        }

        config
    }

    /// Look up a registered location by its URL slug.
    pub fn location_by_slug(&self, slug: &str) -> Option<&Location> {
        self.locations.get(slug)
    }

    /// Look up a registered location by its stable identifier.
    pub fn location_by_id(&self, id: Uuid) -> Option<&Location> {
        self.locations.values().find(|location| location.id == id)
    }

    /// Stage windows used when a start request does not override them.
    pub fn default_windows(&self) -> SessionWindows {
        self.windows
    }

    /// Interval between sweeper scans.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Elevated operator credential, if one was configured.
    pub fn operator_token(&self) -> Option<&str> {
        self.operator_token.as_deref()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            locations: default_locations(),
            windows: DEFAULT_WINDOWS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            operator_token: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    locations: Vec<RawLocation>,
    #[serde(default)]
    windows: Option<RawWindows>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default, rename = "sweep_interval_seconds")]
    sweep_interval: Option<Duration>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let locations = value
            .locations
            .into_iter()
            .map(|raw| (raw.slug.clone(), raw.into()))
            .collect::<IndexMap<String, Location>>();

        Self {
            locations: if locations.is_empty() {
                default_locations()
            } else {
                locations
            },
            windows: value.windows.map(Into::into).unwrap_or(DEFAULT_WINDOWS),
            sweep_interval: value.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL),
            operator_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of one kiosk location entry.
struct RawLocation {
    id: Uuid,
    name: String,
    slug: String,
}

impl From<RawLocation> for Location {
    fn from(value: RawLocation) -> Self {
        Self {
            id: value.id,
            name: value.name,
            slug: value.slug,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the default stage windows.
struct RawWindows {
    countdown_seconds: u64,
    live_seconds: u64,
    reveal_seconds: u64,
}

impl From<RawWindows> for SessionWindows {
    fn from(value: RawWindows) -> Self {
        Self {
            countdown_seconds: value.countdown_seconds,
            live_seconds: value.live_seconds,
            reveal_seconds: value.reveal_seconds,
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

/// Built-in single-kiosk registry shipped with the binary.
fn default_locations() -> IndexMap<String, Location> {
    let pilot = Location {
        id: uuid!("8f9f2f1e-1a68-4c7e-9a93-7b1f5d9a2c01"),
        name: "Pilot Booth".into(),
        slug: "pilot-booth".into(),
    };

    IndexMap::from([(pilot.slug.clone(), pilot)])
}
