//! Demuxes the CopyBoth stream produced by `START_REPLICATION` into WAL
//! data and keepalive pings, and encodes the standby status update used
//! for feedback. Framing grounded on
//! `other_examples/3a448675_maximebedard-dbzioum__src-pg-mod.rs.rs`;
//! the polling/cancellation shape matches `crate::packet::PgPacketStream`.

use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt};
use cdc_common::{CResult, ReError};

use crate::packet::PgPacketStream;

/// How often a feedback message is sent even without an explicit request,
/// matching Postgres' own default `wal_receiver_status_interval`.
pub const FEEDBACK_INTERVAL: Duration = Duration::from_secs(10);

pub enum ReplicationMessage {
    XLogData {
        wal_start: u64,
        #[allow(dead_code)]
        wal_end: u64,
        data: Vec<u8>,
    },
    PrimaryKeepalive {
        wal_end: u64,
        reply_requested: bool,
    },
}

pub struct ReplicationStream {
    stream: PgPacketStream,
}

impl ReplicationStream {
    pub fn new(stream: PgPacketStream) -> ReplicationStream {
        ReplicationStream { stream }
    }

    /// Reads the next CopyData frame and unwraps it into an XLogData or
    /// PrimaryKeepaliveMessage. Returns `None` on a clean stop request
    /// with nothing pending, matching `PgPacketStream::read_message`.
    pub fn next_message(&mut self, should_stop: &dyn Fn() -> bool) -> CResult<Option<ReplicationMessage>> {
        loop {
            let (tag, body) = match self.stream.read_message(should_stop)? {
                Some(m) => m,
                None => return Ok(None),
            };
            match tag {
                b'd' => return Ok(Some(parse_copy_data(&body)?)),
                b'c' => return Ok(None), // CopyDone
                b'E' => {
                    return Err(ReError::Protocol(format!(
                        "server error during replication: {}",
                        String::from_utf8_lossy(&body)
                    )))
                }
                b'N' => {} // NoticeResponse
                other => {
                    return Err(ReError::Protocol(format!(
                        "unexpected message tag {other:#x} in replication stream"
                    )))
                }
            }
        }
    }

    /// Sends a standby status update (feedback) reporting the same LSN
    /// for write/flush/apply, which is sufficient since this pipeline has
    /// no separate flush-to-disk or apply-to-store staging of its own.
    pub fn send_feedback(&mut self, lsn: u64, system_clock_micros: i64) -> CResult<()> {
        let mut payload = Vec::with_capacity(34);
        payload.push(b'r');
        payload.write_u64::<BigEndian>(lsn).map_err(map_encode_err)?;
        payload.write_u64::<BigEndian>(lsn).map_err(map_encode_err)?;
        payload.write_u64::<BigEndian>(lsn).map_err(map_encode_err)?;
        payload
            .write_i64::<BigEndian>(system_clock_micros)
            .map_err(map_encode_err)?;
        payload.push(0); // reply_requested = false
        self.stream.write_message(b'd', &payload)
    }
}

fn parse_copy_data(body: &[u8]) -> CResult<ReplicationMessage> {
    if body.is_empty() {
        return Err(ReError::Protocol("empty CopyData frame".into()));
    }
    match body[0] {
        b'w' => {
            if body.len() < 25 {
                return Err(ReError::Protocol("truncated XLogData header".into()));
            }
            let wal_start = u64::from_be_bytes(body[1..9].try_into().unwrap());
            let wal_end = u64::from_be_bytes(body[9..17].try_into().unwrap());
            Ok(ReplicationMessage::XLogData {
                wal_start,
                wal_end,
                data: body[25..].to_vec(),
            })
        }
        b'k' => {
            if body.len() < 18 {
                return Err(ReError::Protocol("truncated PrimaryKeepaliveMessage".into()));
            }
            let wal_end = u64::from_be_bytes(body[1..9].try_into().unwrap());
            let reply_requested = body[17] != 0;
            Ok(ReplicationMessage::PrimaryKeepalive { wal_end, reply_requested })
        }
        other => Err(ReError::Protocol(format!("unknown CopyData frame kind {other:#x}"))),
    }
}

fn map_encode_err(e: std::io::Error) -> ReError {
    ReError::Bug(format!("encoding feedback message: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xlogdata_frame() {
        let mut body = vec![b'w'];
        body.extend_from_slice(&100u64.to_be_bytes());
        body.extend_from_slice(&200u64.to_be_bytes());
        body.extend_from_slice(&0u64.to_be_bytes());
        body.extend_from_slice(b"BEGIN");
        match parse_copy_data(&body).unwrap() {
            ReplicationMessage::XLogData { wal_start, wal_end, data } => {
                assert_eq!(wal_start, 100);
                assert_eq!(wal_end, 200);
                assert_eq!(data, b"BEGIN");
            }
            _ => panic!("expected XLogData"),
        }
    }

    #[test]
    fn parses_keepalive_with_reply_requested() {
        let mut body = vec![b'k'];
        body.extend_from_slice(&42u64.to_be_bytes());
        body.extend_from_slice(&0i64.to_be_bytes());
        body.push(1);
        match parse_copy_data(&body).unwrap() {
            ReplicationMessage::PrimaryKeepalive { wal_end, reply_requested } => {
                assert_eq!(wal_end, 42);
                assert!(reply_requested);
            }
            _ => panic!("expected PrimaryKeepalive"),
        }
    }
}
