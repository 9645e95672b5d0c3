use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::GetId;

/// names one alarm slot, stable across reschedules and snoozes
pub type AlarmId = u64;

/// shown when an alarm was scheduled without a title
pub const DEFAULT_TITLE: &str = "Task Reminder";

/// a request to (re)schedule an alarm
/// a new request for an identity that is already scheduled replaces the old one
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AlarmRequest {
    pub identity: AlarmId,
    /// milliseconds since the unix epoch
    pub fire_at: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl AlarmRequest {
    #[must_use]
    pub fn new(
        identity: AlarmId,
        fire_at: i64,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            fire_at,
            title: title.into(),
            description: description.into(),
        }
    }

    /// the request that brings a fired alarm back after `offset_millis`
    /// always measured from `now`, snoozing twice does not stack offsets
    #[must_use]
    pub fn snooze_of(payload: &FirePayload, now: i64, offset_millis: i64) -> Self {
        Self {
            identity: payload.identity,
            fire_at: now + offset_millis,
            title: payload.title.clone(),
            description: payload.description.clone(),
        }
    }
}

/// how the host was asked to deliver the wake-up
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// alarm-clock class wake-up, exempt from power saving deferral
    Exact,
    /// best effort, the host may defer it while idle
    InexactAllowWhileIdle,
}

impl CapabilityKind {
    #[must_use]
    pub const fn is_exact(self) -> bool {
        matches!(self, Self::Exact)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::InexactAllowWhileIdle => write!(f, "inexact-while-idle"),
        }
    }
}

/// registry entry for an armed alarm
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScheduledAlarm {
    pub identity: AlarmId,
    pub fire_at: i64,
    pub capability: CapabilityKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl GetId<AlarmId> for ScheduledAlarm {
    fn get_id(&self) -> &AlarmId {
        &self.identity
    }
}

impl ScheduledAlarm {
    #[must_use]
    pub fn payload(&self) -> FirePayload {
        FirePayload {
            identity: self.identity,
            fire_at: self.fire_at,
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }

    #[must_use]
    pub fn request(&self) -> AlarmRequest {
        AlarmRequest::new(
            self.identity,
            self.fire_at,
            self.title.clone(),
            self.description.clone(),
        )
    }
}

impl fmt::Display for ScheduledAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} at {} ({})",
            self.identity,
            display_title(&self.title),
            format_millis(self.fire_at),
            self.capability
        )
    }
}

/// what the host hands back when a wake-up fires
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FirePayload {
    pub identity: AlarmId,
    pub fire_at: i64,
    pub title: String,
    pub description: String,
}

impl FirePayload {
    #[must_use]
    pub fn display_title(&self) -> &str {
        display_title(&self.title)
    }
}

fn display_title(title: &str) -> &str {
    if title.is_empty() {
        DEFAULT_TITLE
    } else {
        title
    }
}

/// local time rendering of an epoch millisecond timestamp, used in logs and the cli
#[must_use]
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis).map_or_else(
        || format!("{millis}ms"),
        |time| time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// `secs` seconds after `now`, `None` if that leaves the epoch millisecond range
#[must_use]
pub fn seconds_after(now: i64, secs: i64) -> Option<i64> {
    secs.checked_mul(1000).and_then(|millis| now.checked_add(millis))
}
