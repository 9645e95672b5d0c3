//! Seams to the platform: the timer facility that wakes us up, the alert output that makes
//! noise, the presentation layer that shows the alarm and the wake lock that keeps the
//! device up while a session starts.

use std::time::Duration;

use log::{debug, info};

use crate::{
    alarm::{AlarmId, FirePayload},
    config::AlertProfile,
    error::{AlertOutputFailure, ArmFailure},
};

pub mod rodio_alert;
pub mod thread_timer;

pub use rodio_alert::RodioAlert;
pub use thread_timer::ThreadTimer;

pub trait HostTimer: Send + Sync {
    /// whether this process may arm an exact wake-up at an arbitrary instant
    fn can_arm_exact(&self) -> bool;

    /// registers a wake-up that hands `payload` back when it fires
    ///
    /// # Errors
    /// if the host refuses or fails to register the wake-up
    fn arm(&self, payload: &FirePayload, exact: bool) -> Result<(), ArmFailure>;

    /// idempotent, disarming an identity that has nothing armed does nothing
    fn disarm(&self, identity: AlarmId);
}

pub trait AlertOutput: Send + Sync {
    /// starts looping sound and patterned vibration
    ///
    /// # Errors
    /// if sound or vibration could not start
    fn start_alert(&self, profile: &AlertProfile) -> Result<(), AlertOutputFailure>;

    fn stop_alert(&self);
}

pub trait Presenter: Send + Sync {
    /// shows the alarm over everything else, including the lock screen
    fn present(&self, payload: &FirePayload);

    fn withdraw(&self, identity: AlarmId);
}

pub trait WakeLock: Send + Sync {
    fn acquire(&self, timeout: Duration);

    fn release(&self);
}

/// alert output for hosts without audio, only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlert;

impl AlertOutput for SilentAlert {
    fn start_alert(&self, profile: &AlertProfile) -> Result<(), AlertOutputFailure> {
        info!("alert started silently (vibration {:?})", profile.vibration);
        Ok(())
    }

    fn stop_alert(&self) {
        info!("alert stopped");
    }
}

/// presents alarms in the log, dismiss and snooze arrive through the daemon
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(&self, payload: &FirePayload) {
        info!(
            "ALARM {}: {} {}",
            payload.identity,
            payload.display_title(),
            payload.description
        );
    }

    fn withdraw(&self, identity: AlarmId) {
        info!("alarm {identity} withdrawn");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self, timeout: Duration) {
        debug!("wake lock acquired for {timeout:?}");
    }

    fn release(&self) {
        debug!("wake lock released");
    }
}
