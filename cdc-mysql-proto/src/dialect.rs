//! Dialect and binlog-checksum detection (§4.2): vanilla MySQL vs
//! MariaDB from the handshake's `server_version`, and whether row
//! events carry a trailing CRC32 checksum from a side-channel variable
//! lookup.

use cdc_common::CResult;

use crate::connection::MysqlConnection;
use crate::handshake::HandshakePacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Vanilla,
    MariaDb,
}

#[derive(Debug, Clone, Copy)]
pub struct DialectInfo {
    pub dialect: Dialect,
    pub checksum_present: bool,
}

/// Queries `@@GLOBAL.BINLOG_CHECKSUM` to learn whether row events carry
/// a trailing CRC32. Servers with the variable unset (pre-5.6) or
/// reporting `NONE` have no checksum.
pub fn detect_dialect(conn: &mut MysqlConnection, handshake: &HandshakePacket) -> CResult<DialectInfo> {
    let dialect = if handshake.is_mariadb() { Dialect::MariaDb } else { Dialect::Vanilla };
    let checksum_present = match conn.text_query("SELECT @@GLOBAL.BINLOG_CHECKSUM") {
        Ok(rows) => rows
            .first()
            .and_then(|row| row.get(0))
            .map(|value| !value.eq_ignore_ascii_case("none"))
            .unwrap_or(false),
        Err(_) => false,
    };
    Ok(DialectInfo { dialect, checksum_present })
}

/// Parses the labels out of a `SHOW COLUMNS`-style type string such as
/// `enum('a','b','c')` or `set('x','y')` (§4.4 enum/set catalog lookup).
pub fn parse_enum_labels(type_string: &str) -> Vec<String> {
    let lower = type_string.to_ascii_lowercase();
    if !lower.starts_with("enum(") && !lower.starts_with("set(") {
        return Vec::new();
    }
    let open = match type_string.find('(') {
        Some(idx) => idx,
        None => return Vec::new(),
    };
    let close = match type_string.rfind(')') {
        Some(idx) if idx > open => idx,
        _ => return Vec::new(),
    };
    type_string[open + 1..close]
        .split(',')
        .map(|label| label.trim().trim_matches('\'').to_string())
        .collect()
}
