use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::{
    alarm::{format_millis, AlarmId, AlarmRequest, CapabilityKind, ScheduledAlarm},
    clock::Clock,
    error::AlarmError,
    host::HostTimer,
    journal::Journal,
    registry::Registry,
};

/// arms, re-arms and cancels host wake-ups, keeping the registry in step with the host
pub struct Scheduler {
    registry: Registry,
    host: Arc<dyn HostTimer>,
    clock: Arc<dyn Clock>,
    past_grace_millis: i64,
    journal: Option<Journal>,
    // serializes registry + host updates so two callers can't interleave them
    writer: Mutex<()>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("past_grace_millis", &self.past_grace_millis)
            .field("journal", &self.journal)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(host: Arc<dyn HostTimer>, clock: Arc<dyn Clock>, past_grace: Duration) -> Self {
        Self {
            registry: Registry::new(),
            host,
            clock,
            past_grace_millis: i64::try_from(past_grace.as_millis()).unwrap_or(i64::MAX),
            journal: None,
            writer: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// arms `request`, replacing whatever was armed for its identity
    ///
    /// A fire time that isn't in the future is pushed to now plus the grace period. When the
    /// host denies exact wake-ups the alarm is armed inexact instead of failing.
    ///
    /// # Errors
    /// [`AlarmError::Arm`] if the host couldn't arm the wake-up; nothing stays registered.
    /// [`AlarmError::IdentityOutOfRange`] for identities the journal can't store
    pub fn schedule(&self, request: AlarmRequest) -> Result<ScheduledAlarm, AlarmError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let armed = self.arm_request(request);
        self.persist();
        armed
    }

    /// registry and host half of [`Self::schedule`], the caller holds the writer lock and persists
    fn arm_request(&self, request: AlarmRequest) -> Result<ScheduledAlarm, AlarmError> {
        if i64::try_from(request.identity).is_err() {
            warn!("refusing alarm {}, identity out of range", request.identity);
            return Err(AlarmError::IdentityOutOfRange(request.identity));
        }
        let now = self.clock.now_millis();
        let mut fire_at = request.fire_at;
        if fire_at <= now {
            warn!(
                "alarm {} asked for {}, which is not in the future, moving it {}ms ahead",
                request.identity,
                format_millis(fire_at),
                self.past_grace_millis
            );
            fire_at = now.saturating_add(self.past_grace_millis);
        }

        let capability = if self.host.can_arm_exact() {
            CapabilityKind::Exact
        } else {
            warn!(
                "exact wake-ups denied, alarm {} may be deferred while idle",
                request.identity
            );
            CapabilityKind::InexactAllowWhileIdle
        };

        let alarm = ScheduledAlarm {
            identity: request.identity,
            fire_at,
            capability,
            title: request.title,
            description: request.description,
        };

        if let Some(previous) = self.registry.upsert(alarm.clone()) {
            debug!(
                "alarm {} was armed for {}, replacing it",
                previous.identity,
                format_millis(previous.fire_at)
            );
            self.host.disarm(previous.identity);
        }

        if let Err(failure) = self.host.arm(&alarm.payload(), capability.is_exact()) {
            error!("{failure}");
            self.registry.remove(alarm.identity);
            return Err(failure.into());
        }

        info!("scheduled {alarm}");
        Ok(alarm)
    }

    /// cancelling an identity that isn't scheduled succeeds and changes nothing
    pub fn cancel(&self, identity: AlarmId) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match self.registry.remove(identity) {
            Some(alarm) => {
                self.host.disarm(identity);
                info!("cancelled {alarm}");
                self.persist();
            }
            None => {
                // the host may still hold a registration this process never saw
                self.host.disarm(identity);
                debug!("cancel for unscheduled alarm {identity}");
            }
        }
    }

    /// drops the entry for a fire that is over, unless it was rescheduled meanwhile
    pub fn clear(&self, identity: AlarmId, fire_at: i64) -> bool {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let cleared = self.registry.remove_if_fire_at(identity, fire_at);
        if cleared {
            self.persist();
        } else {
            debug!("alarm {identity} was rescheduled, keeping its entry");
        }
        cleared
    }

    /// re-arms entries read back from the journal
    ///
    /// Returns the entries that armed, failures are logged and dropped. The journal is
    /// rewritten once, after every entry was tried.
    pub fn restore(&self, alarms: Vec<ScheduledAlarm>) -> Vec<ScheduledAlarm> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let restored = alarms
            .into_iter()
            .filter_map(|alarm| match self.arm_request(alarm.request()) {
                Ok(armed) => Some(armed),
                Err(e) => {
                    error!("couldn't restore alarm {}: {e}", alarm.identity);
                    None
                }
            })
            .collect();
        self.persist();
        restored
    }

    #[must_use]
    pub fn entry(&self, identity: AlarmId) -> Option<ScheduledAlarm> {
        self.registry.lookup(identity)
    }

    #[must_use]
    pub fn alarms(&self) -> Vec<ScheduledAlarm> {
        self.registry.snapshot()
    }

    fn persist(&self) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.save(self.registry.snapshot()) {
                error!("couldn't write {}: {e}", journal.path().display());
            }
        }
    }
}
