//! Trailing CRC32 checksum handling (§4.2). Grounded on
//! `binlog/src/events/checksum_type.rs`; whether a checksum is present at
//! all is learned once per connection via `cdc_mysql_proto::detect_dialect`
//! rather than re-derived here.

pub const CHECKSUM_LEN: usize = 4;

/// Splits a checksum suffix off an event body when the connection is
/// known to carry one, returning `(body, checksum)`.
pub fn split_checksum(body: &[u8], checksum_present: bool) -> (&[u8], Option<u32>) {
    if !checksum_present || body.len() < CHECKSUM_LEN {
        return (body, None);
    }
    let split_at = body.len() - CHECKSUM_LEN;
    let (data, tail) = body.split_at(split_at);
    let checksum = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    (data, Some(checksum))
}

/// Verifies a body against its trailing checksum. Event bodies are
/// checksummed including their 19-byte header in the real binlog stream;
/// callers pass the full `header_bytes ++ body` slice.
pub fn verify(full_event_bytes: &[u8], expected: u32) -> bool {
    crc32fast::hash(full_event_bytes) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trailing_checksum() {
        let mut body = vec![1, 2, 3, 4, 5, 6];
        let checksum: u32 = 0xDEADBEEF;
        body.extend_from_slice(&checksum.to_le_bytes());
        let (data, parsed) = split_checksum(&body, true);
        assert_eq!(data, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(parsed, Some(checksum));
    }

    #[test]
    fn no_checksum_returns_full_body() {
        let body = vec![1, 2, 3];
        let (data, parsed) = split_checksum(&body, false);
        assert_eq!(data, &[1, 2, 3]);
        assert_eq!(parsed, None);
    }

    #[test]
    fn verifies_crc32() {
        let data = b"hello world";
        let expected = crc32fast::hash(data);
        assert!(verify(data, expected));
        assert!(!verify(data, expected.wrapping_add(1)));
    }
}
