#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(
    clippy::use_self,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::missing_panics_doc
)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Alarm lifecycle scheduling: arm a wake-up for a future instant, ring when it fires,
//! then dismiss, snooze or time out.

pub mod alarm;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
/// platform seams and their in-process implementations
pub mod host;
pub mod journal;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod session;

pub use alarm::{AlarmId, AlarmRequest, CapabilityKind, FirePayload, ScheduledAlarm};
pub use error::{AlarmError, AlertOutputFailure, ArmFailure};
pub use scheduler::Scheduler;
pub use service::{AlarmService, Parts};
pub use session::{AlarmSession, SessionOutcome, SessionReport, SessionState};
