//! FORMAT_DESCRIPTION event parsing (§4.2, §9). Grounded on
//! `binlog/src/events/protocol/format_description_log_event.rs`, trimmed
//! to the two things the decoder actually consults it for: each event
//! type's post-header length (needed to size ROWS event post-headers
//! correctly) and whether the server appends a trailing checksum
//! algorithm byte at all.

use cdc_common::{CResult, ReError};

const SERVER_VERSION_LEN: usize = 50;

pub struct FormatDescription {
    pub binlog_version: u16,
    pub server_version: String,
    pub common_header_len: u8,
    post_header_len: Vec<u8>,
}

impl FormatDescription {
    /// Post-header length for a given event type code, 0 if the server's
    /// table doesn't cover it (older server, unknown event type).
    pub fn post_header_len(&self, event_type_code: u8) -> u8 {
        if event_type_code == 0 {
            return 0;
        }
        self.post_header_len.get(event_type_code as usize - 1).copied().unwrap_or(0)
    }
}

/// `body` is the event body with the trailing checksum already stripped
/// by the caller, the same as every other event parser here. Whether a
/// checksum is present at all is learned separately via
/// `cdc_mysql_proto::dialect::detect_dialect`, not from the trailing
/// checksum-algorithm byte this event otherwise carries, since the
/// caller needs that answer *before* it can correctly strip checksums
/// from any event including this one.
pub fn parse(body: &[u8]) -> CResult<FormatDescription> {
    let header_len = 2 + SERVER_VERSION_LEN + 4 + 1;
    if body.len() < header_len {
        return Err(ReError::Protocol("format description event body too short".into()));
    }
    let binlog_version = u16::from_le_bytes([body[0], body[1]]);
    let version_bytes = &body[2..2 + SERVER_VERSION_LEN];
    let nul = version_bytes.iter().position(|&b| b == 0).unwrap_or(version_bytes.len());
    let server_version = String::from_utf8_lossy(&version_bytes[..nul]).into_owned();
    let common_header_len = body[header_len - 1];

    post_header_table(&body[header_len..]).map(|post_header_len| FormatDescription {
        binlog_version,
        server_version,
        common_header_len,
        post_header_len,
    })
}

fn post_header_table(remaining: &[u8]) -> CResult<Vec<u8>> {
    if remaining.is_empty() {
        return Ok(Vec::new());
    }
    // The trailing byte is the checksum algorithm marker when present;
    // everything before it is one post-header length per known event
    // type. Format_description_log_event itself is always followed by
    // this marker on any server new enough to emit row-based binlogs.
    Ok(remaining[..remaining.len() - 1].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body(post_header_len: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&4u16.to_le_bytes());
        let mut version = vec![0u8; SERVER_VERSION_LEN];
        version[..5].copy_from_slice(b"8.0.3");
        body.extend_from_slice(&version);
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(19); // common_header_len
        body.extend_from_slice(post_header_len);
        body.push(1); // checksum algorithm marker
        body
    }

    #[test]
    fn parses_version_and_common_header_len() {
        let parsed = parse(&sample_body(&[8, 8, 8])).unwrap();
        assert_eq!(parsed.binlog_version, 4);
        assert_eq!(parsed.server_version, "8.0.3");
        assert_eq!(parsed.common_header_len, 19);
    }

    #[test]
    fn post_header_len_indexes_by_event_type_code() {
        // TABLE_MAP_EVENT=19, WRITE_ROWS_EVENT=30; table only covers up
        // to index 30 here, one-based.
        let mut table = vec![0u8; 30];
        table[18] = 8; // event type 19 -> post-header len 8
        table[29] = 10; // event type 30 -> post-header len 10
        let parsed = parse(&sample_body(&table)).unwrap();
        assert_eq!(parsed.post_header_len(19), 8);
        assert_eq!(parsed.post_header_len(30), 10);
        assert_eq!(parsed.post_header_len(200), 0);
    }

    #[test]
    fn rejects_truncated_body() {
        assert!(parse(&[1, 2, 3]).is_err());
    }
}
