//! QUERY event parsing and classification (§4.2). Grounded on
//! `binlog/src/events/protocol/query_event.rs`, trimmed to what the
//! decoder actually needs: the transaction boundary keywords and the
//! schema/SQL text, skipping the status-vars block without interpreting
//! individual variables (auto_increment, charset, etc. don't feed into
//! anything this decoder emits).

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use cdc_common::CResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Begin,
    Commit,
    Rollback,
    Ddl,
    Other,
}

pub struct QueryEvent {
    pub thread_id: u32,
    pub schema: String,
    pub query: String,
    pub kind: QueryKind,
}

pub fn classify(query: &str) -> QueryKind {
    let trimmed = query.trim_start();
    let upper_prefix: String = trimmed.chars().take(16).collect::<String>().to_ascii_uppercase();
    if upper_prefix.starts_with("BEGIN") || upper_prefix.starts_with("START TRANSACTION") {
        QueryKind::Begin
    } else if upper_prefix.starts_with("COMMIT") {
        QueryKind::Commit
    } else if upper_prefix.starts_with("ROLLBACK") {
        QueryKind::Rollback
    } else if upper_prefix.starts_with("CREATE")
        || upper_prefix.starts_with("ALTER")
        || upper_prefix.starts_with("DROP")
        || upper_prefix.starts_with("TRUNCATE")
        || upper_prefix.starts_with("RENAME")
    {
        QueryKind::Ddl
    } else {
        QueryKind::Other
    }
}

/// `body` is the event body with any trailing checksum already
/// stripped by the caller.
pub fn parse(body: &[u8]) -> CResult<QueryEvent> {
    let mut cursor = Cursor::new(body);
    let thread_id = cursor.read_u32::<LittleEndian>()?;
    let _execution_time = cursor.read_u32::<LittleEndian>()?;
    let schema_length = cursor.read_u8()? as usize;
    let _error_code = cursor.read_u16::<LittleEndian>()?;
    let status_vars_len = cursor.read_u16::<LittleEndian>()? as usize;

    let mut status_vars = vec![0u8; status_vars_len];
    cursor.read_exact(&mut status_vars)?;

    let mut schema_bytes = vec![0u8; schema_length + 1];
    cursor.read_exact(&mut schema_bytes)?;
    let schema = String::from_utf8_lossy(&schema_bytes[..schema_length]).into_owned();

    let query_start = cursor.position() as usize;
    let query = String::from_utf8_lossy(&body[query_start..]).into_owned();
    let kind = classify(&query);

    Ok(QueryEvent { thread_id, schema, query, kind })
}
