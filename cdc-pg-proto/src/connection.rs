//! Startup handshake, authentication and the simple query protocol.
//! Grounded on `other_examples/3a448675_maximebedard-dbzioum__src-pg-mod.rs.rs`
//! (message shapes and ordering), rewritten against blocking I/O to match
//! `cdc_mysql_proto::connection::MysqlConnection`'s synchronous style.

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};
use cdc_common::{CResult, ReError};

use crate::packet::PgPacketStream;

const PROTOCOL_VERSION: u32 = 196_608; // 3.0, encoded as (major << 16) | minor

pub struct PgConnection {
    stream: PgPacketStream,
    pub backend_params: HashMap<String, String>,
}

pub struct PgConnectionParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub password: Option<&'a str>,
    pub database: &'a str,
    pub replication: bool,
}

impl PgConnection {
    pub fn connect(params: &PgConnectionParams) -> CResult<PgConnection> {
        let mut stream = PgPacketStream::connect(params.host, params.port)?;
        send_startup_message(&mut stream, params)?;
        let backend_params = complete_authentication(&mut stream, params.password)?;
        Ok(PgConnection { stream, backend_params })
    }

    /// Runs one statement through the simple query protocol and collects
    /// every `DataRow` as a vector of nullable text-format column values.
    /// Intended for one-shot bootstrap queries (`IDENTIFY_SYSTEM`,
    /// `CREATE_REPLICATION_SLOT`, confirmed_flush_lsn lookups), not for
    /// the replication stream itself.
    pub fn simple_query(&mut self, sql: &str) -> CResult<Vec<Vec<Option<Vec<u8>>>>> {
        let mut payload = Vec::with_capacity(sql.len() + 1);
        payload.extend_from_slice(sql.as_bytes());
        payload.push(0);
        self.stream.write_message(b'Q', &payload)?;

        let mut rows = Vec::new();
        loop {
            let (tag, body) = self
                .stream
                .read_message(&|| false)?
                .ok_or_else(|| ReError::Connect("connection closed mid-query".into()))?;
            match tag {
                b'T' => {} // RowDescription: column shapes aren't needed, callers already know what they asked for
                b'D' => rows.push(parse_data_row(&body)?),
                b'C' => {} // CommandComplete, keep draining until ReadyForQuery
                b'Z' => break,
                b'E' => return Err(ReError::Protocol(format!("server error: {}", format_error_fields(&body)))),
                b'N' => {} // NoticeResponse, not fatal
                b'S' => {} // ParameterStatus
                other => {
                    return Err(ReError::Protocol(format!(
                        "unexpected message tag {other:#x} during simple query"
                    )))
                }
            }
        }
        Ok(rows)
    }

    /// Issues `START_REPLICATION` for the `pgoutput` plugin and, on
    /// success (a `CopyBothResponse`), hands back the packet stream for
    /// the caller to demux as WAL frames.
    pub fn start_replication(mut self, slot: &str, start_lsn: &str, publication_name: &str) -> CResult<PgPacketStream> {
        let sql = format!(
            "START_REPLICATION SLOT \"{slot}\" LOGICAL {start_lsn} \
             (proto_version '1', publication_names '{publication_name}')"
        );
        let mut payload = Vec::with_capacity(sql.len() + 1);
        payload.extend_from_slice(sql.as_bytes());
        payload.push(0);
        self.stream.write_message(b'Q', &payload)?;

        loop {
            let (tag, body) = self
                .stream
                .read_message(&|| false)?
                .ok_or_else(|| ReError::Connect("connection closed starting replication".into()))?;
            match tag {
                b'W' => return Ok(self.stream), // CopyBothResponse
                b'E' => return Err(ReError::Protocol(format!("server error: {}", format_error_fields(&body)))),
                b'N' | b'S' => {}
                other => {
                    return Err(ReError::Protocol(format!(
                        "unexpected message tag {other:#x} starting replication"
                    )))
                }
            }
        }
    }
}

fn send_startup_message(stream: &mut PgPacketStream, params: &PgConnectionParams) -> CResult<()> {
    let mut payload = Vec::new();
    payload.write_u32::<BigEndian>(PROTOCOL_VERSION).map_err(map_encode_err)?;
    write_cstr_pair(&mut payload, "user", params.user);
    write_cstr_pair(&mut payload, "database", params.database);
    if params.replication {
        write_cstr_pair(&mut payload, "replication", "database");
    }
    payload.push(0);
    stream.write_untagged(&payload)
}

fn write_cstr_pair(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.extend_from_slice(key.as_bytes());
    buf.push(0);
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

fn map_encode_err(e: std::io::Error) -> ReError {
    ReError::Bug(format!("encoding startup message: {e}"))
}

/// Drives authentication to completion and collects `ParameterStatus`
/// entries along the way, returning once `ReadyForQuery` arrives.
fn complete_authentication(stream: &mut PgPacketStream, password: Option<&str>) -> CResult<HashMap<String, String>> {
    let mut params = HashMap::new();
    loop {
        let (tag, body) = stream
            .read_message(&|| false)?
            .ok_or_else(|| ReError::Connect("connection closed during authentication".into()))?;
        match tag {
            b'R' => {
                let auth_code = u32::from_be_bytes(body[0..4].try_into().map_err(|_| {
                    ReError::Protocol("truncated authentication request".into())
                })?);
                match auth_code {
                    0 => {} // AuthenticationOk
                    3 => {
                        let password = password.ok_or_else(|| {
                            ReError::Config("server requested a cleartext password but none was configured".into())
                        })?;
                        let mut payload = Vec::with_capacity(password.len() + 1);
                        payload.extend_from_slice(password.as_bytes());
                        payload.push(0);
                        stream.write_message(b'p', &payload)?;
                    }
                    other => {
                        return Err(ReError::Protocol(format!(
                            "unsupported authentication method {other}, only trust and cleartext password are supported"
                        )))
                    }
                }
            }
            b'S' => {
                if let Some((key, value)) = parse_parameter_status(&body) {
                    params.insert(key, value);
                }
            }
            b'K' => {} // BackendKeyData, not needed without query cancellation support
            b'Z' => return Ok(params),
            b'E' => return Err(ReError::Protocol(format!("server error: {}", format_error_fields(&body)))),
            other => {
                return Err(ReError::Protocol(format!(
                    "unexpected message tag {other:#x} during authentication"
                )))
            }
        }
    }
}

fn parse_parameter_status(body: &[u8]) -> Option<(String, String)> {
    let mut parts = body.split(|&b| b == 0);
    let key = parts.next()?;
    let value = parts.next()?;
    Some((
        String::from_utf8_lossy(key).into_owned(),
        String::from_utf8_lossy(value).into_owned(),
    ))
}

fn parse_data_row(body: &[u8]) -> CResult<Vec<Option<Vec<u8>>>> {
    if body.len() < 2 {
        return Err(ReError::Protocol("truncated DataRow".into()));
    }
    let field_count = u16::from_be_bytes([body[0], body[1]]) as usize;
    let mut cursor = 2;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        if cursor + 4 > body.len() {
            return Err(ReError::Protocol("truncated DataRow field length".into()));
        }
        let len = i32::from_be_bytes(body[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        if len < 0 {
            fields.push(None);
            continue;
        }
        let len = len as usize;
        if cursor + len > body.len() {
            return Err(ReError::Protocol("truncated DataRow field value".into()));
        }
        fields.push(Some(body[cursor..cursor + len].to_vec()));
        cursor += len;
    }
    Ok(fields)
}

fn format_error_fields(body: &[u8]) -> String {
    body.split(|&b| b == 0)
        .filter(|f| !f.is_empty())
        .map(|f| String::from_utf8_lossy(&f[1.min(f.len())..]).into_owned())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_row_with_a_null_field() {
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_be_bytes());
        body.extend_from_slice(&3i32.to_be_bytes());
        body.extend_from_slice(b"bob");
        body.extend_from_slice(&(-1i32).to_be_bytes());
        let row = parse_data_row(&body).unwrap();
        assert_eq!(row, vec![Some(b"bob".to_vec()), None]);
    }

    #[test]
    fn parses_parameter_status_pair() {
        let mut body = Vec::new();
        body.extend_from_slice(b"server_version\0");
        body.extend_from_slice(b"14.5\0");
        let (k, v) = parse_parameter_status(&body).unwrap();
        assert_eq!(k, "server_version");
        assert_eq!(v, "14.5");
    }
}
