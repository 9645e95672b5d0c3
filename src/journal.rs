use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    alarm::{AlarmId, ScheduledAlarm},
    error::JournalError,
    registry::Collection,
};

#[derive(Debug, Serialize, Deserialize, Default)]
struct JournalFile {
    #[serde(default)]
    alarms: Collection<AlarmId, ScheduledAlarm>,
}

/// durable copy of the registry, rewritten whole after every change
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// a journal that was never written reads as empty
    ///
    /// # Errors
    /// if the file exists but can't be read or parsed
    pub fn load(&self) -> Result<Vec<ScheduledAlarm>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let file: JournalFile = toml::from_str(&text)?;
        let mut alarms: Vec<ScheduledAlarm> = file.alarms.into();
        alarms.sort_by_key(|alarm| (alarm.fire_at, alarm.identity));
        debug!("loaded {} alarms from {}", alarms.len(), self.path.display());
        Ok(alarms)
    }

    /// # Errors
    /// if the file or its directory can't be written
    pub fn save(&self, alarms: Vec<ScheduledAlarm>) -> Result<(), JournalError> {
        let file = JournalFile {
            alarms: Collection::from(alarms),
        };
        let text = toml::to_string(&file)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // write then rename so a crash mid write leaves the old journal intact
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::CapabilityKind;

    #[test]
    fn missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("alarms.toml"));
        assert!(journal.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_keeps_payload() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("data").join("alarms.toml"));
        let alarms = vec![
            ScheduledAlarm {
                identity: 2,
                fire_at: 2_000,
                capability: CapabilityKind::InexactAllowWhileIdle,
                title: "stretch".into(),
                description: String::new(),
            },
            ScheduledAlarm {
                identity: 1,
                fire_at: 1_000,
                capability: CapabilityKind::Exact,
                title: "Task".into(),
                description: "call back".into(),
            },
        ];
        journal.save(alarms.clone()).unwrap();
        let loaded = journal.load().unwrap();
        assert_eq!(loaded, vec![alarms[1].clone(), alarms[0].clone()]);
    }

    #[test]
    fn empty_save_clears_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("alarms.toml"));
        journal
            .save(vec![ScheduledAlarm {
                identity: 5,
                fire_at: 1,
                capability: CapabilityKind::Exact,
                title: String::new(),
                description: String::new(),
            }])
            .unwrap();
        journal.save(Vec::new()).unwrap();
        assert!(journal.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_journal_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("alarms.toml"));
        std::fs::write(journal.path(), "[[alarms]]\nidentity = \"x\"").unwrap();
        assert!(matches!(journal.load(), Err(JournalError::Parse(_))));
    }
}
