//! What happens once an alarm fires.
//!
//! ```text
//!            dismiss / snooze / auto-dismiss (first one wins)
//! Presenting ─────────────────────────────────────────────► Ended
//! ```
//!
//! Every trigger races to flip the state with a compare-and-set, only the winner stops the
//! alert and decides whether the alarm comes back. Ended is terminal, the next fire gets a
//! fresh session.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{after, bounded, select, Sender};
use log::{debug, error, info, warn};

use crate::{
    alarm::{format_millis, AlarmId, AlarmRequest, FirePayload},
    clock::Clock,
    config::{AlertProfile, Config},
    host::{AlertOutput, Presenter},
    scheduler::Scheduler,
};

const PRESENTING: u8 = 0;
const ENDED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Presenting,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Dismissed,
    Snoozed,
    /// nobody reacted before the auto-dismiss timeout, otherwise same as dismissed
    AutoDismissed,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dismissed => write!(f, "dismissed"),
            Self::Snoozed => write!(f, "snoozed"),
            Self::AutoDismissed => write!(f, "auto-dismissed"),
        }
    }
}

/// sent once for every session that ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub identity: AlarmId,
    pub fire_at: i64,
    pub outcome: SessionOutcome,
    pub ended_at: i64,
}

/// everything a session needs from the outside
pub struct SessionContext {
    pub scheduler: Arc<Scheduler>,
    pub alert: Arc<dyn AlertOutput>,
    pub presenter: Arc<dyn Presenter>,
    pub clock: Arc<dyn Clock>,
    pub profile: AlertProfile,
    pub snooze_offset: Duration,
    pub auto_dismiss: Duration,
    pub reports: Sender<SessionReport>,
}

impl SessionContext {
    #[must_use]
    pub fn new(
        config: &Config,
        scheduler: Arc<Scheduler>,
        alert: Arc<dyn AlertOutput>,
        presenter: Arc<dyn Presenter>,
        clock: Arc<dyn Clock>,
        reports: Sender<SessionReport>,
    ) -> Self {
        Self {
            scheduler,
            alert,
            presenter,
            clock,
            profile: config.alert.clone(),
            snooze_offset: config.snooze_offset(),
            auto_dismiss: config.auto_dismiss(),
            reports,
        }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("snooze_offset", &self.snooze_offset)
            .field("auto_dismiss", &self.auto_dismiss)
            .finish_non_exhaustive()
    }
}

/// one firing of one alarm, from presentation until dismiss, snooze or timeout
pub struct AlarmSession {
    payload: FirePayload,
    started_at: i64,
    state: AtomicU8,
    outcome: Mutex<Option<SessionOutcome>>,
    // dropping it cancels the auto-dismiss timer
    auto_dismiss: Mutex<Option<Sender<()>>>,
    ctx: Arc<SessionContext>,
}

impl fmt::Debug for AlarmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmSession")
            .field("payload", &self.payload)
            .field("started_at", &self.started_at)
            .field("state", &self.state())
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AlarmSession {
    /// presents the alarm, starts the alert and the auto-dismiss timer
    ///
    /// An alert that won't start is logged and otherwise ignored, the user can still
    /// dismiss or snooze a silent alarm.
    #[must_use]
    pub fn start(payload: FirePayload, ctx: Arc<SessionContext>) -> Arc<Self> {
        let session = Arc::new(Self {
            started_at: ctx.clock.now_millis(),
            payload,
            state: AtomicU8::new(PRESENTING),
            outcome: Mutex::new(None),
            auto_dismiss: Mutex::new(None),
            ctx,
        });
        info!(
            "alarm {} ringing: {}",
            session.payload.identity,
            session.payload.display_title()
        );

        session.ctx.presenter.present(&session.payload);
        if let Err(e) = session.ctx.alert.start_alert(&session.ctx.profile) {
            warn!(
                "alarm {} continues without sound or vibration: {e}",
                session.payload.identity
            );
        }
        session.start_auto_dismiss();
        session
    }

    fn start_auto_dismiss(self: &Arc<Self>) {
        let (cancel, cancelled) = bounded::<()>(1);
        *lock(&self.auto_dismiss) = Some(cancel);
        let timeout = self.ctx.auto_dismiss;
        let session = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("auto-dismiss-{}", self.payload.identity))
            .spawn(move || {
                select! {
                    recv(cancelled) -> _ => {},
                    recv(after(timeout)) -> _ => {
                        session.auto_dismiss();
                    },
                }
            });
        if let Err(e) = spawned {
            error!(
                "alarm {} won't auto-dismiss, couldn't start timer: {e}",
                self.payload.identity
            );
        }
    }

    /// user pressed dismiss, returns false if the session had already ended
    pub fn dismiss(&self) -> bool {
        self.end(SessionOutcome::Dismissed, true)
    }

    /// user pressed snooze, the alarm comes back after the snooze offset
    pub fn snooze(&self) -> bool {
        self.end(SessionOutcome::Snoozed, true)
    }

    /// the auto-dismiss timeout ran out; a late call after the session ended does nothing
    pub fn auto_dismiss(&self) -> bool {
        self.end(SessionOutcome::AutoDismissed, true)
    }

    /// ends the session as dismissed because a newer fire of the same alarm took over;
    /// the registry entry now belongs to the new session and is left alone
    pub fn supersede(&self) -> bool {
        self.end(SessionOutcome::Dismissed, false)
    }

    fn end(&self, outcome: SessionOutcome, clear_entry: bool) -> bool {
        if self
            .state
            .compare_exchange(PRESENTING, ENDED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(
                "alarm {} already ended, ignoring {outcome}",
                self.payload.identity
            );
            return false;
        }
        *lock(&self.outcome) = Some(outcome);
        drop(lock(&self.auto_dismiss).take());

        let identity = self.payload.identity;
        self.ctx.alert.stop_alert();
        self.ctx.presenter.withdraw(identity);

        let now = self.ctx.clock.now_millis();
        match outcome {
            SessionOutcome::Snoozed => {
                let offset = i64::try_from(self.ctx.snooze_offset.as_millis()).unwrap_or(i64::MAX);
                let request = AlarmRequest::snooze_of(&self.payload, now, offset);
                match self.ctx.scheduler.schedule(request) {
                    Ok(armed) => info!(
                        "alarm {identity} snoozed until {}",
                        format_millis(armed.fire_at)
                    ),
                    Err(e) => error!("couldn't snooze alarm {identity}: {e}"),
                }
            }
            SessionOutcome::Dismissed | SessionOutcome::AutoDismissed => {
                if clear_entry {
                    self.ctx.scheduler.clear(identity, self.payload.fire_at);
                }
                info!("alarm {identity} {outcome}");
            }
        }

        let report = SessionReport {
            identity,
            fire_at: self.payload.fire_at,
            outcome,
            ended_at: now,
        };
        if self.ctx.reports.send(report).is_err() {
            debug!("nobody is listening for session reports");
        }
        true
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.state.load(Ordering::Acquire) == PRESENTING {
            SessionState::Presenting
        } else {
            SessionState::Ended
        }
    }

    #[must_use]
    pub fn is_presenting(&self) -> bool {
        self.state() == SessionState::Presenting
    }

    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        *lock(&self.outcome)
    }

    #[must_use]
    pub const fn payload(&self) -> &FirePayload {
        &self.payload
    }

    #[must_use]
    pub const fn identity(&self) -> AlarmId {
        self.payload.identity
    }

    #[must_use]
    pub const fn started_at(&self) -> i64 {
        self.started_at
    }
}
