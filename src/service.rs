use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info, warn};

use crate::{
    alarm::{AlarmId, AlarmRequest, FirePayload, ScheduledAlarm},
    clock::Clock,
    config::Config,
    error::{AlarmError, JournalError},
    host::{AlertOutput, Presenter, WakeLock},
    journal::Journal,
    scheduler::Scheduler,
    session::{AlarmSession, SessionContext, SessionReport},
};

/// the collaborators a service is built from
pub struct Parts {
    pub scheduler: Arc<Scheduler>,
    pub alert: Arc<dyn AlertOutput>,
    pub presenter: Arc<dyn Presenter>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Parts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parts")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// ties the scheduler to firing sessions and exposes schedule/cancel to callers
///
/// Dropping the service cancels nothing, armed wake-ups are meant to outlive it.
pub struct AlarmService {
    scheduler: Arc<Scheduler>,
    sessions: Mutex<HashMap<AlarmId, Arc<AlarmSession>>>,
    ctx: Arc<SessionContext>,
    wake_lock: Arc<dyn WakeLock>,
    wake_lock_timeout: Duration,
}

impl std::fmt::Debug for AlarmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmService")
            .field("scheduler", &self.scheduler)
            .field("sessions", &self.lock_sessions().len())
            .finish_non_exhaustive()
    }
}

impl AlarmService {
    /// returns the service and the receiver every ended session reports on
    #[must_use]
    pub fn new(config: &Config, parts: Parts) -> (Arc<Self>, Receiver<SessionReport>) {
        let (reports, receiver) = unbounded();
        let ctx = SessionContext::new(
            config,
            Arc::clone(&parts.scheduler),
            parts.alert,
            parts.presenter,
            parts.clock,
            reports,
        );
        let service = Self {
            scheduler: parts.scheduler,
            sessions: Mutex::new(HashMap::new()),
            ctx: Arc::new(ctx),
            wake_lock: parts.wake_lock,
            wake_lock_timeout: config.wake_lock_timeout(),
        };
        (Arc::new(service), receiver)
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<AlarmId, Arc<AlarmSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// # Errors
    /// if the host couldn't arm the wake-up
    pub fn schedule_alarm(
        &self,
        identity: AlarmId,
        fire_at: i64,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<ScheduledAlarm, AlarmError> {
        self.scheduler
            .schedule(AlarmRequest::new(identity, fire_at, title, description))
    }

    /// safe to call for identities that were never scheduled or already fired
    ///
    /// # Errors
    /// never at the moment, kept fallible for hosts whose cancel can fail
    pub fn cancel_alarm(&self, identity: AlarmId) -> Result<(), AlarmError> {
        self.scheduler.cancel(identity);
        Ok(())
    }

    #[must_use]
    pub fn list_alarms(&self) -> Vec<ScheduledAlarm> {
        self.scheduler.alarms()
    }

    /// re-arms what the journal remembers, returns how many alarms came back
    ///
    /// # Errors
    /// if the journal can't be read
    pub fn rehydrate(&self, journal: &Journal) -> Result<usize, JournalError> {
        let alarms = journal.load()?;
        let total = alarms.len();
        let restored = self.scheduler.restore(alarms).len();
        info!("restored {restored} of {total} alarms from the journal");
        Ok(restored)
    }

    /// called by the host when a wake-up fires
    ///
    /// # Errors
    /// [`AlarmError::UnknownIdentity`] if the alarm was cancelled meanwhile and
    /// [`AlarmError::StaleFire`] if it was rescheduled; both fires are ignored
    pub fn on_fire(&self, payload: FirePayload) -> Result<(), AlarmError> {
        let identity = payload.identity;
        let entry = self
            .scheduler
            .entry(identity)
            .ok_or(AlarmError::UnknownIdentity(identity))?;
        if entry.fire_at != payload.fire_at {
            return Err(AlarmError::StaleFire {
                identity,
                expected: entry.fire_at,
                fired: payload.fire_at,
            });
        }

        self.wake_lock.acquire(self.wake_lock_timeout);
        let previous = self.lock_sessions().remove(&identity);
        if let Some(previous) = previous {
            if previous.supersede() {
                warn!("alarm {identity} fired again while ringing, replacing the old session");
            }
        }
        let session = AlarmSession::start(payload, Arc::clone(&self.ctx));
        self.lock_sessions().insert(identity, session);
        self.wake_lock.release();
        Ok(())
    }

    /// drains host fires on a dedicated thread until the sender side goes away
    ///
    /// # Errors
    /// if the thread can't be spawned
    pub fn spawn_fire_loop(
        self: &Arc<Self>,
        fires: Receiver<FirePayload>,
    ) -> std::io::Result<JoinHandle<()>> {
        let service = Arc::clone(self);
        thread::Builder::new()
            .name("alarm-fires".to_string())
            .spawn(move || {
                for payload in fires {
                    match service.on_fire(payload) {
                        Ok(()) => {}
                        Err(e @ AlarmError::StaleFire { .. }) => info!("ignoring {e}"),
                        Err(e) => debug!("ignoring fire: {e}"),
                    }
                }
                debug!("fire loop finished");
            })
    }

    /// the ringing session for `identity`, if any
    #[must_use]
    pub fn session(&self, identity: AlarmId) -> Option<Arc<AlarmSession>> {
        let mut sessions = self.lock_sessions();
        sessions.retain(|_, session| session.is_presenting());
        sessions.get(&identity).cloned()
    }

    /// identities that are ringing right now
    #[must_use]
    pub fn ringing(&self) -> Vec<AlarmId> {
        let mut sessions = self.lock_sessions();
        sessions.retain(|_, session| session.is_presenting());
        let mut ringing: Vec<_> = sessions.keys().copied().collect();
        ringing.sort_unstable();
        ringing
    }

    /// the presentation layer's dismiss button, false if nothing was ringing
    pub fn dismiss(&self, identity: AlarmId) -> bool {
        self.session(identity)
            .is_some_and(|session| session.dismiss())
    }

    /// the presentation layer's snooze button, false if nothing was ringing
    pub fn snooze(&self, identity: AlarmId) -> bool {
        self.session(identity)
            .is_some_and(|session| session.snooze())
    }
}
