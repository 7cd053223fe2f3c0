//! Application-level configuration loading, including the voter roster.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::user_directory::{StaticUserDirectory, User};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POLLMASTER_BACK_CONFIG_PATH";
/// Environment variable selecting the storage backend.
const STORAGE_BACKEND_ENV: &str = "POLLMASTER_BACK_STORAGE";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    roster: Vec<User>,
    storage: StorageBackend,
}

/// Which storage backend the server persists polls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Process-local store, lost on restart.
    #[default]
    Memory,
    /// MongoDB, supervised with automatic reconnection.
    #[cfg(feature = "mongo-store")]
    Mongo,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the baked-in roster.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        count = app_config.roster.len(),
                        backend = ?app_config.storage,
                        "loaded configuration"
                    );
                    app_config
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

    /// Build the user directory over the configured roster.
    pub fn user_directory(&self) -> StaticUserDirectory {
        StaticUserDirectory::new(self.roster.clone())
    }

    /// The storage backend selected for this run.
    pub fn storage_backend(&self) -> StorageBackend {
        self.storage
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            roster: default_roster(),
            storage: resolve_storage_backend(None),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    users: Vec<RawUser>,
    /// Optional backend name, `memory` or `mongo`. The environment variable
    /// wins over this value.
    #[serde(default)]
    storage: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let roster = value.users.into_iter().map(Into::into).collect::<Vec<_>>();
        Self {
            roster,
            storage: resolve_storage_backend(value.storage.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single account inside the configuration file.
struct RawUser {
    id: String,
    username: String,
    display_name: String,
}

impl From<RawUser> for User {
    fn from(value: RawUser) -> Self {
        Self {
            id: value.id,
            username: value.username,
            display_name: value.display_name,
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

/// Resolve the storage backend: the environment variable wins, then the
/// config file value, then the default.
fn resolve_storage_backend(configured: Option<&str>) -> StorageBackend {
    match env::var(STORAGE_BACKEND_ENV) {
        Ok(value) => parse_storage_backend(&value),
        Err(_) => configured.map_or_else(StorageBackend::default, parse_storage_backend),
    }
}

/// Map a backend name onto a [`StorageBackend`], defaulting to memory.
fn parse_storage_backend(value: &str) -> StorageBackend {
    if value.eq_ignore_ascii_case("memory") {
        return StorageBackend::Memory;
    }

    #[cfg(feature = "mongo-store")]
    if value.eq_ignore_ascii_case("mongo") {
        return StorageBackend::Mongo;
    }

    warn!(backend = %value, "unknown storage backend; using memory");
    StorageBackend::Memory
}

/// Built-in roster shipped with the binary.
fn default_roster() -> Vec<User> {
    [
        ("user1", "alpha", "Alpha Player"),
        ("user2", "bravo", "Bravo Player"),
        ("user3", "charlie", "Charlie Player"),
        ("user4", "delta", "Delta Player"),
        ("user5", "echo", "Echo Player"),
        ("user6", "foxtrot", "Foxtrot Player"),
        ("user7", "golf", "Golf Player"),
    ]
    .into_iter()
    .map(|(id, username, display_name)| User {
        id: id.to_owned(),
        username: username.to_owned(),
        display_name: display_name.to_owned(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!(parse_storage_backend("memory"), StorageBackend::Memory);
        assert_eq!(parse_storage_backend("MEMORY"), StorageBackend::Memory);
        #[cfg(feature = "mongo-store")]
        assert_eq!(parse_storage_backend("Mongo"), StorageBackend::Mongo);
    }

    #[test]
    fn unknown_backend_names_fall_back_to_memory() {
        assert_eq!(parse_storage_backend("couch"), StorageBackend::Memory);
    }

    #[test]
    fn config_file_selects_the_backend() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "users": [{"id": "u1", "username": "solo", "display_name": "Solo Player"}],
                "storage": "memory"
            }"#,
        )
        .unwrap();

        let config = AppConfig::from(raw);
        assert_eq!(config.storage_backend(), StorageBackend::Memory);
        assert_eq!(config.roster.len(), 1);
    }

    #[test]
    fn missing_storage_field_keeps_the_default() {
        let raw: RawConfig = serde_json::from_str(r#"{"users": []}"#).unwrap();
        assert_eq!(
            AppConfig::from(raw).storage_backend(),
            StorageBackend::default()
        );
    }
}
