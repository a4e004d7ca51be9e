//! Decodes `pgoutput` logical-replication messages (the payload carried
//! inside each XLogData frame). Message layout is the well-known Postgres
//! logical decoding wire format; byte-for-byte shapes aren't present in
//! any single retrieved file, so field order here follows the same
//! begin/relation/tuple framing spec.md's worked example assumes.

use cdc_common::{CResult, ReError};
use cdc_schema::{ColumnDescriptor, ColumnFlags, RelationDescriptor};

use crate::value::PgCell;

#[derive(Debug, Clone)]
pub enum PgOutputMessage {
    Begin {
        final_lsn: u64,
        commit_time: i64,
    },
    Commit {
        commit_lsn: u64,
    },
    Relation(RelationDescriptor),
    Insert {
        relation_id: u64,
        new: Vec<PgCell>,
    },
    Update {
        relation_id: u64,
        old: Option<Vec<PgCell>>,
        new: Vec<PgCell>,
    },
    Delete {
        relation_id: u64,
        old: Vec<PgCell>,
    },
    Truncate {
        relation_ids: Vec<u64>,
    },
    /// Origin, logical decoding message (`M`) and type (`Y`) announcements
    /// all carry no capture-relevant data for this pipeline; surfaced so
    /// callers can account for every byte of the stream without silently
    /// dropping unrecognized-but-documented tags.
    Other(u8),
}

pub fn parse_message(body: &[u8]) -> CResult<PgOutputMessage> {
    if body.is_empty() {
        return Err(ReError::Protocol("empty pgoutput message".into()));
    }
    let tag = body[0];
    let rest = &body[1..];
    match tag {
        b'B' => parse_begin(rest),
        b'C' => parse_commit(rest),
        b'R' => parse_relation(rest),
        b'I' => parse_insert(rest),
        b'U' => parse_update(rest),
        b'D' => parse_delete(rest),
        b'T' => parse_truncate(rest),
        b'O' | b'M' | b'Y' => Ok(PgOutputMessage::Other(tag)),
        other => Err(ReError::Protocol(format!("unknown pgoutput message tag {other:#x}"))),
    }
}

fn parse_begin(body: &[u8]) -> CResult<PgOutputMessage> {
    if body.len() < 20 {
        return Err(ReError::Protocol("truncated Begin message".into()));
    }
    let final_lsn = u64::from_be_bytes(body[0..8].try_into().unwrap());
    let commit_time = i64::from_be_bytes(body[8..16].try_into().unwrap());
    Ok(PgOutputMessage::Begin { final_lsn, commit_time })
}

fn parse_commit(body: &[u8]) -> CResult<PgOutputMessage> {
    if body.len() < 21 {
        return Err(ReError::Protocol("truncated Commit message".into()));
    }
    let commit_lsn = u64::from_be_bytes(body[1..9].try_into().unwrap());
    Ok(PgOutputMessage::Commit { commit_lsn })
}

fn parse_relation(body: &[u8]) -> CResult<PgOutputMessage> {
    let mut cursor = Cursor::new(body);
    let relation_id = cursor.read_u32()? as u64;
    let schema_name = cursor.read_cstr()?;
    let table_name = cursor.read_cstr()?;
    let _replica_identity = cursor.read_u8()?;
    let column_count = cursor.read_u16()?;

    let mut columns = Vec::with_capacity(column_count as usize);
    let mut primary_key_columns = Vec::new();
    for _ in 0..column_count {
        let flags = cursor.read_u8()?;
        let name = cursor.read_cstr()?;
        let type_oid = cursor.read_u32()?;
        let type_meta = cursor.read_i32()?;
        let is_key = flags & 0x1 != 0;
        if is_key {
            primary_key_columns.push(name.clone());
        }
        columns.push(ColumnDescriptor {
            name,
            wire_type: type_oid,
            type_meta,
            flags: ColumnFlags { nullable: !is_key, unsigned: false, is_key },
        });
    }

    Ok(PgOutputMessage::Relation(RelationDescriptor {
        relation_id,
        schema_name,
        table_name,
        columns,
        primary_key_columns,
    }))
}

fn parse_insert(body: &[u8]) -> CResult<PgOutputMessage> {
    let mut cursor = Cursor::new(body);
    let relation_id = cursor.read_u32()? as u64;
    let marker = cursor.read_u8()?;
    if marker != b'N' {
        return Err(ReError::Protocol(format!("expected new-tuple marker 'N' in Insert, got {marker:#x}")));
    }
    let new = parse_tuple_data(&mut cursor)?;
    Ok(PgOutputMessage::Insert { relation_id, new })
}

fn parse_update(body: &[u8]) -> CResult<PgOutputMessage> {
    let mut cursor = Cursor::new(body);
    let relation_id = cursor.read_u32()? as u64;
    let marker = cursor.read_u8()?;
    let (old, new_marker) = match marker {
        b'K' | b'O' => (Some(parse_tuple_data(&mut cursor)?), cursor.read_u8()?),
        b'N' => (None, marker),
        other => return Err(ReError::Protocol(format!("unexpected marker {other:#x} in Update"))),
    };
    if new_marker != b'N' {
        return Err(ReError::Protocol(format!("expected new-tuple marker 'N' in Update, got {new_marker:#x}")));
    }
    let new = parse_tuple_data(&mut cursor)?;
    Ok(PgOutputMessage::Update { relation_id, old, new })
}

fn parse_delete(body: &[u8]) -> CResult<PgOutputMessage> {
    let mut cursor = Cursor::new(body);
    let relation_id = cursor.read_u32()? as u64;
    let marker = cursor.read_u8()?;
    if marker != b'K' && marker != b'O' {
        return Err(ReError::Protocol(format!("expected 'K' or 'O' marker in Delete, got {marker:#x}")));
    }
    let old = parse_tuple_data(&mut cursor)?;
    Ok(PgOutputMessage::Delete { relation_id, old })
}

fn parse_truncate(body: &[u8]) -> CResult<PgOutputMessage> {
    let mut cursor = Cursor::new(body);
    let relation_count = cursor.read_u32()?;
    let _options = cursor.read_u8()?;
    let mut relation_ids = Vec::with_capacity(relation_count as usize);
    for _ in 0..relation_count {
        relation_ids.push(cursor.read_u32()? as u64);
    }
    Ok(PgOutputMessage::Truncate { relation_ids })
}

/// Per-column tags: `n` null, `u` unchanged TOAST (elided from output,
/// distinct from null), `t` text value (4-byte length, then UTF-8 bytes).
fn parse_tuple_data(cursor: &mut Cursor) -> CResult<Vec<PgCell>> {
    let column_count = cursor.read_u16()?;
    let mut cells = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
        let kind = cursor.read_u8()?;
        let cell = match kind {
            b'n' => PgCell::Null,
            b'u' => PgCell::UnchangedToast,
            b't' => {
                let len = cursor.read_u32()? as usize;
                let bytes = cursor.read_bytes(len)?;
                PgCell::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            other => return Err(ReError::Protocol(format!("unknown tuple column tag {other:#x}"))),
        };
        cells.push(cell);
    }
    Ok(cells)
}

struct Cursor<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(body: &'a [u8]) -> Cursor<'a> {
        Cursor { body, pos: 0 }
    }

    fn read_u8(&mut self) -> CResult<u8> {
        let b = *self.body.get(self.pos).ok_or_else(truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> CResult<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> CResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> CResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_bytes(&mut self, len: usize) -> CResult<&'a [u8]> {
        if self.pos + len > self.body.len() {
            return Err(truncated());
        }
        let slice = &self.body[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_cstr(&mut self) -> CResult<String> {
        let rest = &self.body[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(truncated)?;
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(s)
    }
}

fn truncated() -> ReError {
    ReError::Protocol("truncated pgoutput message".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation_body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_be_bytes()); // relation id
        body.extend_from_slice(b"public\0");
        body.extend_from_slice(b"accounts\0");
        body.push(b'd'); // replica identity default
        body.extend_from_slice(&2u16.to_be_bytes()); // column count

        body.push(1); // key flag
        body.extend_from_slice(b"id\0");
        body.extend_from_slice(&23u32.to_be_bytes()); // int4 oid
        body.extend_from_slice(&(-1i32).to_be_bytes());

        body.push(0);
        body.extend_from_slice(b"name\0");
        body.extend_from_slice(&25u32.to_be_bytes()); // text oid
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body
    }

    #[test]
    fn parses_relation_message() {
        let mut body = vec![b'R'];
        body.extend_from_slice(&relation_body());
        match parse_message(&body).unwrap() {
            PgOutputMessage::Relation(descriptor) => {
                assert_eq!(descriptor.schema_name, "public");
                assert_eq!(descriptor.table_name, "accounts");
                assert_eq!(descriptor.columns.len(), 2);
                assert_eq!(descriptor.primary_key_columns, vec!["id".to_string()]);
            }
            _ => panic!("expected Relation"),
        }
    }

    #[test]
    fn parses_insert_with_one_text_column() {
        let mut body = vec![b'I'];
        body.extend_from_slice(&1u32.to_be_bytes());
        body.push(b'N');
        body.extend_from_slice(&1u16.to_be_bytes());
        body.push(b't');
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(b"bob");

        match parse_message(&body).unwrap() {
            PgOutputMessage::Insert { relation_id, new } => {
                assert_eq!(relation_id, 1);
                assert_eq!(new.len(), 1);
                assert!(matches!(&new[0], PgCell::Text(s) if s == "bob"));
            }
            _ => panic!("expected Insert"),
        }
    }

    #[test]
    fn delete_with_replica_identity_full_carries_old_row() {
        let mut body = vec![b'D'];
        body.extend_from_slice(&1u32.to_be_bytes());
        body.push(b'O');
        body.extend_from_slice(&2u16.to_be_bytes());
        body.push(b't');
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(b"3");
        body.push(b't');
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(b"bob");

        match parse_message(&body).unwrap() {
            PgOutputMessage::Delete { relation_id, old } => {
                assert_eq!(relation_id, 1);
                assert_eq!(old.len(), 2);
                assert!(matches!(&old[0], PgCell::Text(s) if s == "3"));
                assert!(matches!(&old[1], PgCell::Text(s) if s == "bob"));
            }
            _ => panic!("expected Delete"),
        }
    }

    #[test]
    fn update_with_unchanged_toast_column() {
        let mut body = vec![b'U'];
        body.extend_from_slice(&1u32.to_be_bytes());
        body.push(b'N');
        body.extend_from_slice(&2u16.to_be_bytes());
        body.push(b'u');
        body.push(b't');
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(b"5");

        match parse_message(&body).unwrap() {
            PgOutputMessage::Update { old, new, .. } => {
                assert!(old.is_none());
                assert!(matches!(new[0], PgCell::UnchangedToast));
                assert!(matches!(&new[1], PgCell::Text(s) if s == "5"));
            }
            _ => panic!("expected Update"),
        }
    }
}
