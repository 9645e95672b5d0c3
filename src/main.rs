#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(
    clippy::use_self,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::missing_panics_doc
)]
#![allow(clippy::multiple_crate_versions)]

use std::{error::Error, sync::Arc, thread};

use clap::{Parser, Subcommand};
use log::{info, warn};
use wakealarm::{
    alarm::{format_millis, seconds_after, AlarmId, AlarmRequest},
    clock::{Clock, SystemClock},
    config::Config,
    daemon::{self, Client},
    host::{LogPresenter, NoopWakeLock, RodioAlert, ThreadTimer},
    journal::Journal,
    protocol::{ClientMessage, ServerMessage},
    AlarmService, Parts, Scheduler,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// write a default config
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// run the alarm daemon
    Serve,
    /// schedule or reschedule an alarm
    Schedule {
        #[clap(long)]
        id: AlarmId,
        #[clap(long, default_value = "")]
        title: String,
        #[clap(long, default_value = "")]
        description: String,
        /// RFC 3339 time, e.g. 2026-10-16T07:30:00+02:00
        #[clap(long, conflicts_with = "in_secs", required_unless_present = "in_secs")]
        at: Option<String>,
        /// seconds from now
        #[clap(long = "in")]
        in_secs: Option<i64>,
    },
    Cancel {
        #[clap(long)]
        id: AlarmId,
    },
    /// show scheduled and ringing alarms
    List,
    Dismiss {
        #[clap(long)]
        id: AlarmId,
    },
    Snooze {
        #[clap(long)]
        id: AlarmId,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("wakealarm").expect("couldn't initialize logger");

    let args = Args::parse();
    match args.command {
        Command::Init { force } => {
            if force || !Config::is_config_present() {
                let path = Config::config_path()?;
                Config::new().save(&path)?;
                std::fs::create_dir_all(Config::sounds_path()?)?;
                println!("wrote {}", path.display());
            } else {
                println!("config already present, use --force to overwrite");
            }
        }
        Command::Serve => serve()?,
        Command::Schedule {
            id,
            title,
            description,
            at,
            in_secs,
        } => {
            let fire_at = match (at, in_secs) {
                (Some(at), _) => chrono::DateTime::parse_from_rfc3339(&at)?.timestamp_millis(),
                (None, Some(secs)) => seconds_after(SystemClock.now_millis(), secs)
                    .ok_or("--in is out of range")?,
                (None, None) => return Err("either --at or --in is required".into()),
            };
            let request = AlarmRequest::new(id, fire_at, title, description);
            if let ServerMessage::Scheduled { alarm } =
                Client::connect()?.request(&ClientMessage::Schedule { request })?
            {
                println!("scheduled {alarm}");
            }
        }
        Command::Cancel { id } => {
            Client::connect()?.request(&ClientMessage::Cancel { identity: id })?;
            println!("cancelled {id}");
        }
        Command::List => {
            if let ServerMessage::Alarms { alarms, ringing } =
                Client::connect()?.request(&ClientMessage::List)?
            {
                for alarm in alarms {
                    println!("{alarm}");
                }
                for identity in ringing {
                    println!("{identity} is ringing");
                }
            }
        }
        Command::Dismiss { id } => {
            if !Client::connect()?.dismiss(id)? {
                println!("alarm {id} isn't ringing");
            }
        }
        Command::Snooze { id } => {
            if !Client::connect()?.snooze(id)? {
                println!("alarm {id} isn't ringing");
            }
        }
    }
    Ok(())
}

fn serve() -> Result<(), Box<dyn Error>> {
    let config = Config::load_or_default()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (timer, fires) = ThreadTimer::new(Arc::clone(&clock), config.allow_exact);

    let mut scheduler = Scheduler::new(Arc::new(timer), Arc::clone(&clock), config.past_grace());
    let journal = if config.journal {
        Some(Journal::new(Config::journal_path()?))
    } else {
        warn!("journal disabled, scheduled alarms are lost when the daemon stops");
        None
    };
    if let Some(journal) = &journal {
        scheduler = scheduler.with_journal(journal.clone());
    }

    let (service, reports) = AlarmService::new(
        &config,
        Parts {
            scheduler: Arc::new(scheduler),
            alert: Arc::new(RodioAlert::new()),
            presenter: Arc::new(LogPresenter),
            wake_lock: Arc::new(NoopWakeLock),
            clock,
        },
    );
    if let Some(journal) = &journal {
        if let Err(e) = service.rehydrate(journal) {
            warn!("starting without the journal: {e}");
        }
    }
    service.spawn_fire_loop(fires)?;
    thread::spawn(move || {
        for report in reports {
            info!(
                "alarm {} {} at {}",
                report.identity,
                report.outcome,
                format_millis(report.ended_at)
            );
        }
    });

    daemon::serve(&service)?;
    Ok(())
}
