use std::{
    io::{self, BufReader},
    sync::Arc,
    thread,
};

use interprocess::local_socket::{
    prelude::*, GenericFilePath, GenericNamespaced, ListenerOptions, Name, RecvHalf, SendHalf,
    Stream,
};
use log::{debug, error, info, warn};

use crate::{
    alarm::AlarmId,
    error::ProtocolError,
    protocol::{self, ClientMessage, ServerMessage},
    service::AlarmService,
};

pub const SOCKET_NAME: &str = "wakealarm.sock";
const SOCKET_PATH: &str = "/tmp/wakealarm.sock";

fn socket_name() -> io::Result<Name<'static>> {
    if GenericNamespaced::is_supported() {
        SOCKET_NAME.to_ns_name::<GenericNamespaced>()
    } else {
        SOCKET_PATH.to_fs_name::<GenericFilePath>()
    }
}

/// answers one client request
#[must_use]
pub fn handle(service: &AlarmService, message: ClientMessage) -> ServerMessage {
    match message {
        ClientMessage::Schedule { request } => {
            let identity = request.identity;
            match service.schedule_alarm(
                identity,
                request.fire_at,
                request.title,
                request.description,
            ) {
                Ok(alarm) => ServerMessage::Scheduled { alarm },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::Cancel { identity } => match service.cancel_alarm(identity) {
            Ok(()) => ServerMessage::Cancelled { identity },
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            },
        },
        ClientMessage::List => ServerMessage::Alarms {
            alarms: service.list_alarms(),
            ringing: service.ringing(),
        },
        ClientMessage::Dismiss { identity } => ServerMessage::Handled {
            identity,
            handled: service.dismiss(identity),
        },
        ClientMessage::Snooze { identity } => ServerMessage::Handled {
            identity,
            handled: service.snooze(identity),
        },
    }
}

fn serve_connection(service: &AlarmService, conn: Stream) {
    let (recv, mut send) = conn.split();
    let mut recv = BufReader::new(recv);
    loop {
        let message: ClientMessage = match protocol::receive(&mut recv) {
            Ok(message) => message,
            Err(ProtocolError::Closed) => break,
            // the rest of the line is still unread, nothing after it can be trusted
            Err(e @ ProtocolError::TooLong(_)) => {
                warn!("dropping client: {e}");
                break;
            }
            Err(e) => {
                warn!("bad request: {e}");
                let reply = ServerMessage::Error {
                    message: e.to_string(),
                };
                if protocol::send(&mut send, &reply).is_err() {
                    break;
                }
                continue;
            }
        };
        debug!("request: {message:?}");
        let reply = handle(service, message);
        if let Err(e) = protocol::send(&mut send, &reply) {
            warn!("couldn't answer client: {e}");
            break;
        }
    }
    debug!("client disconnected");
}

/// accepts clients until the listener fails, one thread per connection
///
/// # Errors
/// if the socket can't be created, e.g. because another daemon holds it
pub fn serve(service: &Arc<AlarmService>) -> io::Result<()> {
    fn handle_error(conn: io::Result<Stream>) -> Option<Stream> {
        match conn {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("incoming connection failed: {e}");
                None
            }
        }
    }

    let opts = ListenerOptions::new().name(socket_name()?);
    let listener = match opts.create_sync() {
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            error!(
                "could not start daemon because {SOCKET_NAME} is occupied, \
                 check if another wakealarm daemon is running"
            );
            return Err(e);
        }
        x => x?,
    };
    info!("daemon listening on {SOCKET_NAME}");

    for conn in listener.incoming().filter_map(handle_error) {
        let service = Arc::clone(service);
        thread::spawn(move || serve_connection(&service, conn));
    }
    Ok(())
}

/// a connection to a running daemon
pub struct Client {
    recv: BufReader<RecvHalf>,
    send: SendHalf,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// # Errors
    /// if no daemon is listening
    pub fn connect() -> Result<Self, ProtocolError> {
        let conn = Stream::connect(socket_name()?)?;
        let (recv, send) = conn.split();
        Ok(Self {
            recv: BufReader::new(recv),
            send,
        })
    }

    /// # Errors
    /// if the daemon can't be reached or answers with an error
    pub fn request(&mut self, message: &ClientMessage) -> Result<ServerMessage, ProtocolError> {
        protocol::send(&mut self.send, message)?;
        match protocol::receive(&mut self.recv)? {
            ServerMessage::Error { message } => Err(ProtocolError::Remote(message)),
            reply => Ok(reply),
        }
    }

    /// # Errors
    /// if the daemon can't be reached or answers with an error
    pub fn dismiss(&mut self, identity: AlarmId) -> Result<bool, ProtocolError> {
        match self.request(&ClientMessage::Dismiss { identity })? {
            ServerMessage::Handled { handled, .. } => Ok(handled),
            _ => Err(ProtocolError::UnexpectedReply),
        }
    }

    /// # Errors
    /// if the daemon can't be reached or answers with an error
    pub fn snooze(&mut self, identity: AlarmId) -> Result<bool, ProtocolError> {
        match self.request(&ClientMessage::Snooze { identity })? {
            ServerMessage::Handled { handled, .. } => Ok(handled),
            _ => Err(ProtocolError::UnexpectedReply),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        alarm::AlarmRequest,
        clock::ManualClock,
        config::Config,
        host::{LogPresenter, NoopWakeLock, SilentAlert},
        scheduler::{tests::FakeHost, Scheduler},
        service::Parts,
    };

    const NOW: i64 = 1_700_000_000_000;

    fn service() -> Arc<AlarmService> {
        let clock = Arc::new(ManualClock::new(NOW));
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(FakeHost::exact()),
            clock.clone(),
            Duration::from_secs(5),
        ));
        AlarmService::new(
            &Config::default(),
            Parts {
                scheduler,
                alert: Arc::new(SilentAlert),
                presenter: Arc::new(LogPresenter),
                wake_lock: Arc::new(NoopWakeLock),
                clock,
            },
        )
        .0
    }

    #[test]
    fn schedule_list_cancel() {
        let service = service();
        let reply = handle(
            &service,
            ClientMessage::Schedule {
                request: AlarmRequest::new(5, NOW + 1_000, "Task", ""),
            },
        );
        assert!(matches!(reply, ServerMessage::Scheduled { alarm } if alarm.identity == 5));

        let ServerMessage::Alarms { alarms, ringing } = handle(&service, ClientMessage::List)
        else {
            panic!("expected alarm list");
        };
        assert_eq!(alarms.len(), 1);
        assert!(ringing.is_empty());

        assert_eq!(
            handle(&service, ClientMessage::Cancel { identity: 99 }),
            ServerMessage::Cancelled { identity: 99 }
        );
        assert_eq!(
            handle(&service, ClientMessage::Cancel { identity: 5 }),
            ServerMessage::Cancelled { identity: 5 }
        );
        assert!(service.list_alarms().is_empty());
    }

    #[test]
    fn dismiss_and_snooze_report_whether_something_rang() {
        let service = service();
        let alarm = service.schedule_alarm(6, NOW + 1_000, "", "").unwrap();
        assert_eq!(
            handle(&service, ClientMessage::Dismiss { identity: 6 }),
            ServerMessage::Handled {
                identity: 6,
                handled: false
            }
        );
        service.on_fire(alarm.payload()).unwrap();
        assert_eq!(
            handle(&service, ClientMessage::Snooze { identity: 6 }),
            ServerMessage::Handled {
                identity: 6,
                handled: true
            }
        );
        assert_eq!(
            service.list_alarms().first().map(|a| a.fire_at),
            Some(NOW + 300_000)
        );
    }
}
