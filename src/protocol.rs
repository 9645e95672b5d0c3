//! Messages between the daemon and its clients.
//!
//! Each message is a toml document, base64 encoded onto a single line.

use std::io::{BufRead, Read, Write};

use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    alarm::{AlarmId, AlarmRequest, ScheduledAlarm},
    error::ProtocolError,
};

/// longest encoded line [`receive`] accepts, newline included
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum ClientMessage {
    Schedule { request: AlarmRequest },
    Cancel { identity: AlarmId },
    List,
    Dismiss { identity: AlarmId },
    Snooze { identity: AlarmId },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum ServerMessage {
    Scheduled { alarm: ScheduledAlarm },
    Cancelled { identity: AlarmId },
    Alarms {
        alarms: Vec<ScheduledAlarm>,
        ringing: Vec<AlarmId>,
    },
    /// answer to dismiss and snooze, `handled` is false if nothing was ringing
    Handled { identity: AlarmId, handled: bool },
    Error { message: String },
}

/// # Errors
/// if the message can't be serialized or written
pub fn send<W: Write, M: Serialize>(conn: &mut W, message: &M) -> Result<(), ProtocolError> {
    let text = toml::to_string(message)?;
    writeln!(
        conn,
        "{}",
        base64::prelude::BASE64_STANDARD.encode(text.as_bytes())
    )?;
    conn.flush()?;
    Ok(())
}

/// reads one message, [`ProtocolError::Closed`] once the other side hung up
///
/// # Errors
/// if the line can't be read, decoded or parsed
pub fn receive<R: BufRead, M: DeserializeOwned>(conn: &mut R) -> Result<M, ProtocolError> {
    let mut line = String::new();
    let read = conn.by_ref().take(MAX_LINE_BYTES).read_line(&mut line)?;
    if read == 0 {
        return Err(ProtocolError::Closed);
    }
    if !line.ends_with('\n') && u64::try_from(read).unwrap_or(u64::MAX) >= MAX_LINE_BYTES {
        return Err(ProtocolError::TooLong(MAX_LINE_BYTES));
    }
    let bytes = base64::prelude::BASE64_STANDARD.decode(line.trim_end())?;
    let text = String::from_utf8(bytes)?;
    Ok(toml::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};

    use super::*;
    use crate::alarm::CapabilityKind;

    fn through_wire<M: Serialize + DeserializeOwned>(message: &M) -> M {
        let mut wire = Vec::new();
        send(&mut wire, message).unwrap();
        assert_eq!(wire.iter().filter(|b| **b == b'\n').count(), 1);
        receive(&mut BufReader::new(Cursor::new(wire))).unwrap()
    }

    #[test]
    fn client_messages_survive_the_wire() {
        let schedule = ClientMessage::Schedule {
            request: AlarmRequest::new(42, 1_700_000_000_000, "Task", "line one\nline two"),
        };
        assert_eq!(through_wire(&schedule), schedule);
        assert_eq!(through_wire(&ClientMessage::List), ClientMessage::List);
        let snooze = ClientMessage::Snooze { identity: 3 };
        assert_eq!(through_wire(&snooze), snooze);
    }

    #[test]
    fn alarm_list_survives_the_wire() {
        let alarms = ServerMessage::Alarms {
            alarms: vec![ScheduledAlarm {
                identity: 1,
                fire_at: 5,
                capability: CapabilityKind::InexactAllowWhileIdle,
                title: "a".into(),
                description: String::new(),
            }],
            ringing: vec![1],
        };
        assert_eq!(through_wire(&alarms), alarms);
    }

    #[test]
    fn several_messages_on_one_stream() {
        let mut wire = Vec::new();
        send(&mut wire, &ClientMessage::Cancel { identity: 1 }).unwrap();
        send(&mut wire, &ClientMessage::Dismiss { identity: 2 }).unwrap();
        let mut reader = BufReader::new(Cursor::new(wire));
        let first: ClientMessage = receive(&mut reader).unwrap();
        let second: ClientMessage = receive(&mut reader).unwrap();
        assert_eq!(first, ClientMessage::Cancel { identity: 1 });
        assert_eq!(second, ClientMessage::Dismiss { identity: 2 });
        assert!(matches!(
            receive::<_, ClientMessage>(&mut reader),
            Err(ProtocolError::Closed)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut reader = BufReader::new(Cursor::new(b"not base64!\n".to_vec()));
        assert!(matches!(
            receive::<_, ClientMessage>(&mut reader),
            Err(ProtocolError::Base64(_))
        ));
    }

    #[test]
    fn overlong_line_is_refused() {
        let mut wire = vec![b'A'; 70 * 1024];
        wire.push(b'\n');
        let mut reader = BufReader::new(Cursor::new(wire));
        assert!(matches!(
            receive::<_, ClientMessage>(&mut reader),
            Err(ProtocolError::TooLong(MAX_LINE_BYTES))
        ));
    }
}
