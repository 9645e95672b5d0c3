use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use wakealarm::{
    clock::{Clock, SystemClock},
    config::{AlertProfile, Config},
    host::{AlertOutput, LogPresenter, NoopWakeLock, ThreadTimer},
    journal::Journal,
    AlarmService, AlertOutputFailure, CapabilityKind, Parts, Scheduler, SessionOutcome,
    SessionReport,
};

#[derive(Debug, Default)]
struct CountingAlert {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl AlertOutput for CountingAlert {
    fn start_alert(&self, _profile: &AlertProfile) -> Result<(), AlertOutputFailure> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_alert(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Daemon {
    service: Arc<AlarmService>,
    reports: Receiver<SessionReport>,
    alert: Arc<CountingAlert>,
    clock: Arc<dyn Clock>,
}

fn daemon(config: &Config, journal: Option<Journal>) -> Daemon {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (timer, fires) = ThreadTimer::new(Arc::clone(&clock), config.allow_exact);
    let mut scheduler = Scheduler::new(Arc::new(timer), Arc::clone(&clock), config.past_grace());
    if let Some(journal) = journal {
        scheduler = scheduler.with_journal(journal);
    }
    let alert = Arc::new(CountingAlert::default());
    let (service, reports) = AlarmService::new(
        config,
        Parts {
            scheduler: Arc::new(scheduler),
            alert: alert.clone(),
            presenter: Arc::new(LogPresenter),
            wake_lock: Arc::new(NoopWakeLock),
            clock: Arc::clone(&clock),
        },
    );
    service.spawn_fire_loop(fires).unwrap();
    Daemon {
        service,
        reports,
        alert,
        clock,
    }
}

fn wait_for(what: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if what() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn fire_then_snooze_then_cancel() {
    let d = daemon(&Config::default(), None);
    let now = d.clock.now_millis();
    d.service.schedule_alarm(42, now + 50, "Task", "desc").unwrap();

    assert!(wait_for(|| d.service.ringing() == vec![42]));
    let snoozed_at = d.clock.now_millis();
    assert!(d.service.snooze(42));

    let report = d.reports.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(report.outcome, SessionOutcome::Snoozed);
    let alarms = d.service.list_alarms();
    assert_eq!(alarms.len(), 1);
    assert!(alarms[0].fire_at >= snoozed_at + 300_000);
    assert!(alarms[0].fire_at <= d.clock.now_millis() + 300_000);
    assert_eq!(alarms[0].title, "Task");

    d.service.cancel_alarm(42).unwrap();
    assert!(d.service.list_alarms().is_empty());
    assert_eq!(d.alert.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn untouched_alarm_auto_dismisses_once() {
    let config = Config {
        auto_dismiss_secs: 1,
        ..Config::default()
    };
    let d = daemon(&config, None);
    let now = d.clock.now_millis();
    d.service.schedule_alarm(7, now + 20, "", "").unwrap();

    let report = d.reports.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(report.identity, 7);
    assert_eq!(report.outcome, SessionOutcome::AutoDismissed);
    assert!(d.service.list_alarms().is_empty());
    assert!(d.service.ringing().is_empty());
    assert!(!d.service.dismiss(7));
    assert!(d.reports.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(d.alert.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn rescheduling_fires_only_the_latest() {
    let d = daemon(&Config::default(), None);
    let now = d.clock.now_millis();
    d.service.schedule_alarm(1, now + 30, "early", "").unwrap();
    d.service.schedule_alarm(1, now + 120, "late", "").unwrap();

    assert!(wait_for(|| d.service.ringing() == vec![1]));
    thread::sleep(Duration::from_millis(200));
    assert_eq!(d.alert.starts.load(Ordering::SeqCst), 1);
    let session = d.service.session(1).unwrap();
    assert_eq!(session.payload().title, "late");
    assert!(d.service.dismiss(1));
}

#[test]
fn denied_exact_still_rings() {
    let config = Config {
        allow_exact: false,
        ..Config::default()
    };
    let d = daemon(&config, None);
    let now = d.clock.now_millis();
    let armed = d.service.schedule_alarm(3, now + 20, "", "").unwrap();
    assert_eq!(armed.capability, CapabilityKind::InexactAllowWhileIdle);
    assert!(wait_for(|| d.service.ringing() == vec![3]));
    assert!(d.service.dismiss(3));
}

#[test]
fn journal_brings_alarms_back_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::new(dir.path().join("alarms.toml"));
    let now = SystemClock.now_millis();
    {
        let first = daemon(&Config::default(), Some(journal.clone()));
        first
            .service
            .schedule_alarm(9, now + 3_600_000, "later", "")
            .unwrap();
    }

    let second = daemon(&Config::default(), Some(journal.clone()));
    assert_eq!(second.service.rehydrate(&journal).unwrap(), 1);
    let alarms = second.service.list_alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].identity, 9);
    assert_eq!(alarms[0].fire_at, now + 3_600_000);
}
