use std::io;

use thiserror::Error;

use crate::alarm::AlarmId;

/// the host refused or failed to register a wake-up
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not arm alarm {identity}: {reason}")]
pub struct ArmFailure {
    pub identity: AlarmId,
    pub reason: String,
}

impl ArmFailure {
    #[must_use]
    pub fn new(identity: AlarmId, reason: impl Into<String>) -> Self {
        Self {
            identity,
            reason: reason.into(),
        }
    }
}

/// sound could not start, never fatal for a session
#[derive(Debug, Error)]
pub enum AlertOutputFailure {
    #[error("couldn't open audio output: {0}")]
    Device(String),
    #[error("audio thread went away")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error(transparent)]
    Arm(#[from] ArmFailure),
    /// the journal and the wire carry identities as toml integers, which stop at `i64::MAX`
    #[error("alarm identity {0} is larger than {max}", max = i64::MAX)]
    IdentityOutOfRange(AlarmId),
    /// a fire for an identity the registry no longer knows
    #[error("no alarm scheduled for {0}")]
    UnknownIdentity(AlarmId),
    /// a fire that a later reschedule already replaced
    #[error("stale fire for alarm {identity}: expected {expected}, fired {fired}")]
    StaleFire {
        identity: AlarmId,
        expected: i64,
        fired: i64,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't find a home directory for wakealarm")]
    NoProjectDirs,
    #[error("couldn't read or write config: {0}")]
    Io(#[from] io::Error),
    #[error("couldn't parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("couldn't access alarm journal: {0}")]
    Io(#[from] io::Error),
    #[error("couldn't parse alarm journal: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize alarm journal: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("connection closed")]
    Closed,
    #[error("message longer than {0} bytes")]
    TooLong(u64),
    #[error("bad message framing: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("couldn't parse message: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize message: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("daemon replied with an error: {0}")]
    Remote(String),
    #[error("unexpected reply from daemon")]
    UnexpectedReply,
}
