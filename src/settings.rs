use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SettingsError;
use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::CRATE_NAME;

const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_CHECK_INTERVAL: u64 = 300;

/// `[value, description]` pair for one `ssh -o` option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshOption(pub String, pub String);

impl SshOption {
    pub fn new(value: impl Into<String>, description: impl Into<String>) -> Self {
        Self(value.into(), description.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn description(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub default_username: String,
    pub ssh_options: BTreeMap<String, SshOption>,
    /// Epoch seconds of the last completed refresh.
    pub last_refresh: f64,
    /// Seconds between silent background refreshes.
    pub device_check_interval: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

pub fn default_ssh_options() -> BTreeMap<String, SshOption> {
    [
        ("ServerAliveInterval", "60", "Seconds between keepalive probes"),
        ("ServerAliveCountMax", "3", "Missed keepalives before disconnecting"),
        ("ConnectTimeout", "10", "Seconds to wait for the TCP connection"),
        ("StrictHostKeyChecking", "accept-new", "Host key acceptance policy"),
        ("Compression", "yes", "Compress the transport"),
        ("LogLevel", "ERROR", "ssh client log verbosity"),
    ]
    .into_iter()
    .map(|(name, value, description)| (name.to_string(), SshOption::new(value, description)))
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_username: whoami::username(),
            ssh_options: default_ssh_options(),
            last_refresh: 0.0,
            device_check_interval: DEFAULT_CHECK_INTERVAL,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Settings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// True once more than `device_check_interval` has passed since the last refresh.
    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        epoch_seconds(now) - self.last_refresh > self.device_check_interval as f64
    }

    pub fn mark_refreshed(&mut self, at: DateTime<Utc>) {
        self.last_refresh = epoch_seconds(at);
    }
}

pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// The settings file plus its in-memory copy.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    load_warning: Option<SettingsError>,
}

impl SettingsStore {
    /// `<config dir>/ssh_manager/config.json`
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(dir.join(CRATE_NAME).join(CONFIG_FILE))
    }

    /// Never fails: an absent or unreadable file yields defaults and a
    /// warning available through [`SettingsStore::load_warning`].
    pub async fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = PathBuf::from(path.as_ref());
        let (settings, load_warning) = match read(&path).await {
            Ok(settings) => {
                debug!(path = %path.display(), "loaded settings");
                (settings, None)
            }
            Err(e) => {
                warn!(error = %e, "using default settings");
                (Settings::default(), Some(e))
            }
        };

        Self {
            path,
            settings,
            load_warning,
        }
    }

    pub fn load_warning(&self) -> Option<&SettingsError> {
        self.load_warning.as_ref()
    }

    /// Pick up connection preferences edited on disk since startup. Refresh
    /// bookkeeping stays in memory.
    pub async fn reload_preferences(&mut self) {
        match read(&self.path).await {
            Ok(on_disk) => {
                self.settings.default_username = on_disk.default_username;
                self.settings.ssh_options = on_disk.ssh_options;
            }
            Err(e) => debug!(error = %e, "keeping in-memory preferences"),
        }
    }

    /// Atomically replace the file: write a sibling temp file, then rename.
    pub async fn save(&self) -> Result<(), SettingsError> {
        let data = self.serialize()?;
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, data).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Same as [`SettingsStore::save`] without a runtime, for exit paths.
    pub fn save_blocking(&self) -> Result<(), SettingsError> {
        let data = self.serialize()?;
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.tmp_path();
        std::fs::write(&tmp, data).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>, SettingsError> {
        serde_json::to_vec_pretty(&self.settings).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

async fn read(path: &Path) -> Result<Settings, SettingsError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Deref for SettingsStore {
    type Target = Settings;

    fn deref(&self) -> &Self::Target {
        &self.settings
    }
}

impl DerefMut for SettingsStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.device_check_interval, 300);
        assert_eq!(settings.last_refresh, 0.0);
        assert_eq!(settings.ssh_options.len(), 6);
        assert_eq!(settings.ssh_options["ConnectTimeout"].value(), "10");
    }

    #[test]
    fn test_default_path() {
        let path = SettingsStore::default_path().unwrap();
        assert!(path.ends_with("ssh_manager/config.json"));
    }

    #[test]
    fn test_file_schema() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(
            json["ssh_options"]["Compression"],
            serde_json::json!(["yes", "Compress the transport"])
        );
        assert!(json["last_refresh"].is_number());
        assert_eq!(json["device_check_interval"], 300);
    }

    #[test]
    fn test_older_files_without_probe_timeout_load() {
        let json = r#"{
            "default_username": "ops",
            "ssh_options": {"ConnectTimeout": ["5", "short"]},
            "last_refresh": 1700000000.5,
            "device_check_interval": 60
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.default_username, "ops");
        assert_eq!(settings.probe_timeout(), DEFAULT_PROBE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut store = SettingsStore::open(&path).await;
        store.default_username = "deploy".into();
        store.last_refresh = 1_700_000_123.25;
        store.device_check_interval = 42;
        store.probe_timeout_ms = 250;
        store
            .ssh_options
            .insert("ForwardAgent".into(), SshOption::new("no", "Agent forwarding"));
        store.save().await.unwrap();

        let reloaded = SettingsStore::open(&path).await;
        assert!(reloaded.load_warning().is_none());
        assert_eq!(*reloaded, *store);
        assert!(!dir.path().join("nested").join("config.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults_with_warning() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join(CONFIG_FILE)).await;
        assert!(matches!(store.load_warning(), Some(SettingsError::Io { .. })));
        assert_eq!(store.device_check_interval, DEFAULT_CHECK_INTERVAL);
    }

    #[tokio::test]
    async fn test_corrupt_file_uses_defaults_with_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::open(&path).await;
        assert!(matches!(store.load_warning(), Some(SettingsError::Parse { .. })));
        assert_eq!(store.ssh_options, default_ssh_options());
    }

    #[tokio::test]
    async fn test_reload_preferences_keeps_bookkeeping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut store = SettingsStore::open(&path).await;
        store.save().await.unwrap();

        let mut edited = Settings::default();
        edited.default_username = "edited".into();
        edited.ssh_options.clear();
        std::fs::write(&path, serde_json::to_vec(&edited).unwrap()).unwrap();

        store.last_refresh = 99.0;
        store.reload_preferences().await;
        assert_eq!(store.default_username, "edited");
        assert!(store.ssh_options.is_empty());
        assert_eq!(store.last_refresh, 99.0);
    }

    #[test]
    fn test_save_blocking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let store = SettingsStore {
            path: path.clone(),
            settings: Settings::default(),
            load_warning: None,
        };
        store.save_blocking().unwrap();

        let saved: Settings = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(saved, *store);
    }

    #[test]
    fn test_refresh_due() {
        let mut settings = Settings::default();
        let now = Utc::now();
        settings.mark_refreshed(now);
        assert!(!settings.refresh_due(now));
        assert!(settings.refresh_due(now + chrono::Duration::seconds(301)));
    }
}
