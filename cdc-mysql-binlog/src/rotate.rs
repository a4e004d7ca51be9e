//! ROTATE event parsing (§4.2). Grounded on
//! `binlog/src/events/protocol/rotate_event.rs`. Carries no logical
//! change; the decoder uses it only to track the current binlog
//! filename for checkpointing.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use cdc_common::CResult;

pub struct RotateEvent {
    pub next_binlog_filename: String,
    pub next_binlog_position: u64,
}

/// `body` is the event body with any trailing checksum already
/// stripped by the caller.
pub fn parse(body: &[u8]) -> CResult<RotateEvent> {
    let mut cursor = Cursor::new(body);
    let position = cursor.read_u64::<LittleEndian>()?;
    let filename_start = cursor.position() as usize;
    let filename = String::from_utf8_lossy(&body[filename_start..]).into_owned();
    Ok(RotateEvent { next_binlog_filename: filename, next_binlog_position: position })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_position_and_filename() {
        let mut body = Vec::new();
        body.extend_from_slice(&4u64.to_le_bytes());
        body.extend_from_slice(b"binlog.000002");
        let event = parse(&body).unwrap();
        assert_eq!(event.next_binlog_position, 4);
        assert_eq!(event.next_binlog_filename, "binlog.000002");
    }
}
