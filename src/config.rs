use std::{fmt, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "wakealarm";

/// silence/vibrate segments in milliseconds, repeated from the start
pub const DEFAULT_VIBRATION: [u64; 6] = [0, 1000, 500, 1000, 500, 1000];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub snooze_minutes: u32,
    pub auto_dismiss_secs: u32,
    /// how far ahead an alarm scheduled in the past is pushed
    pub past_grace_millis: u32,
    pub wake_lock_minutes: u32,
    /// set to false on hosts that deny exact wake-ups
    pub allow_exact: bool,
    /// keep a journal of scheduled alarms so they come back after a restart
    pub journal: bool,
    pub alert: AlertProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snooze_minutes: 5,
            auto_dismiss_secs: 30,
            past_grace_millis: 5000,
            wake_lock_minutes: 10,
            allow_exact: true,
            journal: true,
            alert: AlertProfile::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// if the file can't be read or isn't valid toml
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&config)?)
    }

    /// the config at [`Config::config_path`], or the defaults if there is none yet
    ///
    /// # Errors
    /// if there is a config file but it can't be loaded
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// # Errors
    /// if the config dir can't be created or the file can't be written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let config = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, config)?;
        Ok(())
    }

    fn project_dirs() -> Result<directories::ProjectDirs, ConfigError> {
        directories::ProjectDirs::from("", "", APP_NAME).ok_or(ConfigError::NoProjectDirs)
    }

    /// # Errors
    /// if there is no home directory
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// # Errors
    /// if there is no home directory
    pub fn journal_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.data_dir().join("alarms.toml"))
    }

    /// # Errors
    /// if there is no home directory
    pub fn sounds_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.data_dir().join("sounds"))
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    #[must_use]
    pub fn snooze_offset(&self) -> Duration {
        Duration::from_secs(u64::from(self.snooze_minutes) * 60)
    }

    #[must_use]
    pub fn auto_dismiss(&self) -> Duration {
        Duration::from_secs(u64::from(self.auto_dismiss_secs))
    }

    #[must_use]
    pub fn past_grace(&self) -> Duration {
        Duration::from_millis(u64::from(self.past_grace_millis))
    }

    #[must_use]
    pub fn wake_lock_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.wake_lock_minutes) * 60)
    }
}

/// how a firing alarm gets the user's attention
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertProfile {
    pub sound: Sound,
    /// 0 to 100
    pub volume: f32,
    pub vibration: Vec<u64>,
}

impl Default for AlertProfile {
    fn default() -> Self {
        Self {
            sound: Sound::default(),
            volume: 100.0,
            vibration: DEFAULT_VIBRATION.to_vec(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Sound {
    pub name: String,
    pub path: PathBuf,
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.name,
            self.path
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default()
        )
    }
}

impl Default for Sound {
    fn default() -> Self {
        Self::beep_beep()
    }
}

impl Sound {
    #[must_use]
    pub const fn new(name: String, path: PathBuf) -> Self {
        Self { name, path }
    }

    #[must_use]
    pub fn beep_beep() -> Self {
        Self {
            name: "beep beep".to_string(),
            path: Config::sounds_path()
                .unwrap_or_default()
                .join("beep_beep.mp3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_alarm_timings() {
        let config = Config::default();
        assert_eq!(config.snooze_offset(), Duration::from_secs(300));
        assert_eq!(config.auto_dismiss(), Duration::from_secs(30));
        assert_eq!(config.past_grace(), Duration::from_millis(5000));
        assert_eq!(config.wake_lock_timeout(), Duration::from_secs(600));
        assert_eq!(config.alert.vibration, vec![0, 1000, 500, 1000, 500, 1000]);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::new();
        config.snooze_minutes = 9;
        config.allow_exact = false;
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = toml::from_str("auto_dismiss_secs = 10\n").unwrap();
        assert_eq!(config.auto_dismiss_secs, 10);
        assert_eq!(config.snooze_minutes, 5);
        assert!(config.allow_exact);
    }

    #[test]
    fn load_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "snooze_minutes = \"soon\"").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
