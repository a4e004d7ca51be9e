//! 19-byte binlog event header (§4.2). Grounded on
//! `binlog/src/events/event_header.rs`, ported from its `nom` parser to
//! `byteorder`+`Cursor` to match the row-decoding code this crate is
//! mostly made of.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use cdc_common::{CResult, ReError};

use crate::event_type::EventType;

pub const EVENT_HEADER_LEN: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type_code: u8,
    pub server_id: u32,
    pub event_length: u32,
    pub next_position: u32,
    pub flags: u16,
}

impl EventHeader {
    pub fn event_type(&self) -> EventType {
        EventType::from_code(self.event_type_code)
    }

    /// Size of the event body, header excluded (the caller still needs to
    /// strip a trailing checksum separately when one is present).
    pub fn body_length(&self) -> usize {
        self.event_length as usize - EVENT_HEADER_LEN
    }

    pub fn parse(bytes: &[u8]) -> CResult<EventHeader> {
        if bytes.len() < EVENT_HEADER_LEN {
            return Err(ReError::Protocol(format!(
                "event header truncated: got {} bytes, need {}",
                bytes.len(),
                EVENT_HEADER_LEN
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let event_type_code = cursor.read_u8()?;
        let server_id = cursor.read_u32::<LittleEndian>()?;
        let event_length = cursor.read_u32::<LittleEndian>()?;
        let next_position = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        if (event_length as usize) < EVENT_HEADER_LEN {
            return Err(ReError::Protocol(format!(
                "event_length {event_length} smaller than header size"
            )));
        }

        Ok(EventHeader {
            timestamp,
            event_type_code,
            server_id,
            event_length,
            next_position,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header_bytes(event_type: u8, event_length: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        buf.push(event_type);
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.extend_from_slice(&event_length.to_le_bytes());
        buf.extend_from_slice(&1000u32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf
    }

    #[test]
    fn parses_table_map_header() {
        let bytes = sample_header_bytes(19, 50);
        let header = EventHeader::parse(&bytes).unwrap();
        assert_eq!(header.event_type(), EventType::TableMapEvent);
        assert_eq!(header.server_id, 42);
        assert_eq!(header.body_length(), 50 - EVENT_HEADER_LEN);
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = vec![0u8; 10];
        assert!(EventHeader::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_event_length_smaller_than_header() {
        let bytes = sample_header_bytes(2, 5);
        assert!(EventHeader::parse(&bytes).is_err());
    }
}
