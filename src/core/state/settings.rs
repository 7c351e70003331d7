use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::platform::curseforge::CURSEFORGE_API_BASE;
use crate::core::platform::modrinth::MODRINTH_API_BASE;
use crate::core::pool::{DEFAULT_MAX_WORKERS, MAX_WORKERS_CEILING};

pub const APP_DIR_NAME: &str = "Packsmith";
const SETTINGS_FILE: &str = "settings.json";
const LOGS_DIR: &str = "logs";

const ENV_MAX_CONCURRENCY: &str = "PACKSMITH_MAX_CONCURRENCY";
const ENV_CURSEFORGE_API_KEY: &str = "PACKSMITH_CURSEFORGE_API_KEY";

/// User-level settings, shared by every project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Ceiling on concurrent workers per batch.
    pub max_concurrency: usize,
    pub http_timeout_secs: u64,
    pub modrinth_api_base: String,
    pub curseforge_api_base: String,
    pub curseforge_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_WORKERS,
            http_timeout_secs: 60,
            modrinth_api_base: MODRINTH_API_BASE.to_string(),
            curseforge_api_base: CURSEFORGE_API_BASE.to_string(),
            curseforge_api_key: None,
        }
    }
}

impl Settings {
    /// Settings file, defaults, then environment overrides.
    pub fn load() -> Self {
        let mut settings = load_settings_from_disk(&settings_path()).unwrap_or_default();
        settings.apply_env(|key| std::env::var(key).ok());
        settings.max_concurrency = settings.max_concurrency.clamp(1, MAX_WORKERS_CEILING);
        settings
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.max_concurrency = n,
                Err(_) => warn!("Ignoring {}={:?}: not a number", ENV_MAX_CONCURRENCY, raw),
            }
        }
        if let Some(key) = lookup(ENV_CURSEFORGE_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.curseforge_api_key = Some(key);
        }
    }
}

fn load_settings_from_disk(path: &Path) -> Option<Settings> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("Corrupt settings at {:?}: {}", path, e);
            None
        }
    }
}

pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(SETTINGS_FILE)
}

/// Where logs and other per-user data live.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Daily log files live here.
pub fn logs_dir_in(data_dir: &Path) -> PathBuf {
    data_dir.join(LOGS_DIR)
}

pub fn default_logs_dir() -> PathBuf {
    logs_dir_in(&default_data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{ "max_concurrency": 4 }"#).unwrap();

        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.http_timeout_secs, 60);
        assert_eq!(settings.modrinth_api_base, MODRINTH_API_BASE);
        assert!(settings.curseforge_api_key.is_none());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut settings = Settings::default();

        settings.apply_env(|key| match key {
            ENV_MAX_CONCURRENCY => Some("12".into()),
            ENV_CURSEFORGE_API_KEY => Some("abc".into()),
            _ => None,
        });

        assert_eq!(settings.max_concurrency, 12);
        assert_eq!(settings.curseforge_api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn malformed_override_is_ignored() {
        let mut settings = Settings::default();

        settings.apply_env(|key| (key == ENV_MAX_CONCURRENCY).then(|| "lots".to_string()));

        assert_eq!(settings.max_concurrency, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(load_settings_from_disk(&path).is_none());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn problems_are_reported_through_tracing() {
        let captured = CapturedLog::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        tracing::subscriber::with_default(subscriber, || {
            load_settings_from_disk(&path);
            Settings::default()
                .apply_env(|key| (key == ENV_MAX_CONCURRENCY).then(|| "lots".to_string()));
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Corrupt settings"));
        assert!(output.contains(ENV_MAX_CONCURRENCY));
    }
}
