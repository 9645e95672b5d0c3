use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{after, bounded, select, unbounded, Receiver, Sender};
use log::{debug, warn};

use super::HostTimer;
use crate::{
    alarm::{AlarmId, FirePayload},
    clock::Clock,
    error::ArmFailure,
};

#[derive(Debug)]
struct Armed {
    generation: u64,
    fire_at: i64,
    exact: bool,
    // dropping the sender wakes the waiter thread up and makes it return
    _cancel: Sender<()>,
}

type ArmedMap = Arc<Mutex<HashMap<AlarmId, Armed>>>;

fn lock(armed: &ArmedMap) -> MutexGuard<'_, HashMap<AlarmId, Armed>> {
    armed.lock().unwrap_or_else(PoisonError::into_inner)
}

/// in-process timer facility, one waiter thread per armed identity
///
/// Fires are delivered on the receiver returned by [`ThreadTimer::new`]. Nothing here
/// survives the process, the journal is what brings alarms back after a restart.
pub struct ThreadTimer {
    clock: Arc<dyn Clock>,
    allow_exact: bool,
    fires: Sender<FirePayload>,
    armed: ArmedMap,
    generation: AtomicU64,
}

impl std::fmt::Debug for ThreadTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTimer")
            .field("allow_exact", &self.allow_exact)
            .field("armed", &lock(&self.armed).len())
            .finish_non_exhaustive()
    }
}

impl ThreadTimer {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, allow_exact: bool) -> (Self, Receiver<FirePayload>) {
        let (fires, receiver) = unbounded();
        (
            Self {
                clock,
                allow_exact,
                fires,
                armed: Arc::default(),
                generation: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// `(identity, fire_at, exact)` for every waiting wake-up
    #[must_use]
    pub fn armed(&self) -> Vec<(AlarmId, i64, bool)> {
        let mut armed: Vec<_> = lock(&self.armed)
            .iter()
            .map(|(identity, armed)| (*identity, armed.fire_at, armed.exact))
            .collect();
        armed.sort_unstable();
        armed
    }
}

impl HostTimer for ThreadTimer {
    fn can_arm_exact(&self) -> bool {
        self.allow_exact
    }

    fn arm(&self, payload: &FirePayload, exact: bool) -> Result<(), ArmFailure> {
        let identity = payload.identity;
        let delay = u64::try_from(payload.fire_at - self.clock.now_millis()).unwrap_or(0);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let (cancel, cancelled) = bounded::<()>(1);

        // replacing an older registration drops its cancel sender which stops its waiter
        lock(&self.armed).insert(
            identity,
            Armed {
                generation,
                fire_at: payload.fire_at,
                exact,
                _cancel: cancel,
            },
        );

        let armed = Arc::clone(&self.armed);
        let fires = self.fires.clone();
        let payload = payload.clone();
        let spawned = thread::Builder::new()
            .name(format!("alarm-{identity}"))
            .spawn(move || {
                select! {
                    recv(cancelled) -> _ => debug!("timer for alarm {identity} disarmed"),
                    recv(after(Duration::from_millis(delay))) -> _ => {
                        let mut guard = lock(&armed);
                        if guard.get(&identity).is_some_and(|a| a.generation == generation) {
                            guard.remove(&identity);
                            drop(guard);
                            if fires.send(payload).is_err() {
                                warn!("alarm {identity} fired but nobody is listening");
                            }
                        }
                    },
                }
            });

        if let Err(e) = spawned {
            let mut guard = lock(&self.armed);
            if guard.get(&identity).is_some_and(|a| a.generation == generation) {
                guard.remove(&identity);
            }
            return Err(ArmFailure::new(identity, format!("couldn't start timer: {e}")));
        }
        debug!(
            "armed {} timer for alarm {identity} in {delay}ms",
            if exact { "exact" } else { "inexact" }
        );
        Ok(())
    }

    fn disarm(&self, identity: AlarmId) {
        if lock(&self.armed).remove(&identity).is_some() {
            debug!("disarmed alarm {identity}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn payload(identity: AlarmId, fire_at: i64) -> FirePayload {
        FirePayload {
            identity,
            fire_at,
            title: "t".into(),
            description: "d".into(),
        }
    }

    #[test]
    fn fires_once_after_delay() {
        let clock = Arc::new(SystemClock);
        let (timer, fires) = ThreadTimer::new(clock.clone(), true);
        let at = clock.now_millis() + 30;
        timer.arm(&payload(1, at), true).unwrap();
        assert_eq!(timer.armed(), vec![(1, at, true)]);
        let fired = fires.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fired.identity, 1);
        assert!(timer.armed().is_empty());
        assert!(fires.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn disarm_prevents_fire() {
        let clock = Arc::new(SystemClock);
        let (timer, fires) = ThreadTimer::new(clock.clone(), true);
        timer.arm(&payload(2, clock.now_millis() + 50), true).unwrap();
        timer.disarm(2);
        timer.disarm(2);
        assert!(fires.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn rearm_replaces_previous_registration() {
        let clock = Arc::new(SystemClock);
        let (timer, fires) = ThreadTimer::new(clock.clone(), false);
        let now = clock.now_millis();
        timer.arm(&payload(3, now + 20), false).unwrap();
        timer.arm(&payload(3, now + 60), false).unwrap();
        let fired = fires.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fired.fire_at, now + 60);
        assert!(fires.recv_timeout(Duration::from_millis(150)).is_err());
        assert!(!timer.can_arm_exact());
    }
}
