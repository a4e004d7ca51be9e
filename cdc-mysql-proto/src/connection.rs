//! A blocking MySQL/MariaDB replication connection: handshake, side
//! channel text queries, and the `COM_BINLOG_DUMP` event stream (§4.1,
//! §4.2 dialect detection, §4.4 side-channel lookups).

use cdc_common::{CResult, ReError};

use crate::dump::{DumpBinlogCommand, QueryCommand, RegisterSlaveCommand};
use crate::handshake::{HandshakePacket, HandshakeResponse};
use crate::packet::PacketStream;
use crate::resultset::{read_len_enc_int, read_len_enc_str, TextRow};

pub struct MysqlConnection {
    packets: PacketStream,
    pub collation: u8,
}

impl MysqlConnection {
    /// Connects and completes the handshake using `mysql_native_password`.
    pub fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        database: Option<String>,
    ) -> CResult<(MysqlConnection, HandshakePacket)> {
        let mut packets = PacketStream::connect(host, port)?;

        let (raw, _seq) = packets
            .read_packet(&|| false)?
            .ok_or_else(|| ReError::Connect("timed out waiting for server handshake".into()))?;
        check_error_packet(&raw)?;
        let handshake = HandshakePacket::parse(&raw)?;
        if handshake.protocol_version != 10 {
            return Err(ReError::Protocol(format!(
                "unsupported protocol version {}",
                handshake.protocol_version
            )));
        }

        let response = HandshakeResponse {
            username: username.to_string(),
            password: password.to_string(),
            database,
            scramble: handshake.scramble.clone(),
        };
        let payload = response.serialize(handshake.server_collation)?;
        packets.write_packet(&payload, 1)?;

        let (reply, _seq) = packets
            .read_packet(&|| false)?
            .ok_or_else(|| ReError::Connect("timed out waiting for auth result".into()))?;
        check_error_packet(&reply)?;

        let collation = handshake.server_collation;
        Ok((MysqlConnection { packets, collation }, handshake))
    }

    /// Runs a statement and returns the rows of its text resultset.
    /// Used only for side-channel metadata lookups (§3, §4.2, §4.4), not
    /// for the replication stream itself.
    pub fn text_query(&mut self, sql: &str) -> CResult<Vec<TextRow>> {
        let cmd = QueryCommand::new(sql);
        self.packets.write_packet(&cmd.serialize()?, 0)?;

        let (first, _seq) = self
            .packets
            .read_packet(&|| false)?
            .ok_or_else(|| ReError::Protocol("query response timed out".into()))?;
        check_error_packet(&first)?;

        let (column_count, _) = read_len_enc_int(&first, 0)?;
        let mut column_names = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let (column_packet, _seq) = self
                .packets
                .read_packet(&|| false)?
                .ok_or_else(|| ReError::Protocol("column definition timed out".into()))?;
            column_names.push(parse_column_name(&column_packet)?);
        }
        // EOF terminating the column definitions (CLIENT_DEPRECATE_EOF is
        // never advertised, see capability.rs).
        self.packets.read_packet(&|| false)?;

        let mut rows = Vec::new();
        loop {
            let (packet, _seq) = self
                .packets
                .read_packet(&|| false)?
                .ok_or_else(|| ReError::Protocol("row read timed out".into()))?;
            if is_eof_packet(&packet) {
                break;
            }
            check_error_packet(&packet)?;
            rows.push(TextRow::parse(&packet)?);
        }
        Ok(rows)
    }

    /// `SELECT * FROM schema.table LIMIT 0`: the column definitions carry
    /// the names, and `LIMIT 0` means no row data is ever sent.
    pub fn fetch_column_names(&mut self, schema: &str, table: &str) -> CResult<Vec<String>> {
        let sql = format!("SELECT * FROM `{schema}`.`{table}` LIMIT 0");
        let cmd = QueryCommand::new(sql);
        self.packets.write_packet(&cmd.serialize()?, 0)?;

        let (first, _seq) = self
            .packets
            .read_packet(&|| false)?
            .ok_or_else(|| ReError::SchemaLookup("column name lookup timed out".into()))?;
        check_error_packet(&first)?;

        let (column_count, _) = read_len_enc_int(&first, 0)?;
        let mut names = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let (column_packet, _seq) = self
                .packets
                .read_packet(&|| false)?
                .ok_or_else(|| ReError::SchemaLookup("column definition timed out".into()))?;
            names.push(parse_column_name(&column_packet)?);
        }
        self.packets.read_packet(&|| false)?; // trailing EOF, no rows follow
        Ok(names)
    }

    pub fn register_slave(&mut self, server_id: u32, hostname: &str) -> CResult<()> {
        let cmd = RegisterSlaveCommand { server_id, hostname: hostname.to_string() };
        self.packets.write_packet(&cmd.serialize()?, 0)?;
        let (reply, _seq) = self
            .packets
            .read_packet(&|| false)?
            .ok_or_else(|| ReError::Connect("register slave timed out".into()))?;
        check_error_packet(&reply)
    }

    pub fn start_binlog_dump(&mut self, server_id: u32, filename: String, position: u32) -> CResult<()> {
        let cmd = DumpBinlogCommand::new(server_id, filename, position);
        self.packets.write_packet(&cmd.serialize()?, 0)
    }

    /// Reads one event packet from the dump stream. The leading `0x00`
    /// OK-marker byte every binlog event packet carries is stripped here
    /// so callers see only the raw event bytes.
    pub fn read_event_packet(&mut self, should_stop: &dyn Fn() -> bool) -> CResult<Option<Vec<u8>>> {
        match self.packets.read_packet(should_stop)? {
            None => Ok(None),
            Some((packet, _seq)) => {
                check_error_packet(&packet)?;
                Ok(Some(packet.get(1..).unwrap_or_default().to_vec()))
            }
        }
    }
}

fn parse_column_name(packet: &[u8]) -> CResult<String> {
    let (_catalog, pos) = read_len_enc_str(packet, 0)?;
    let (_schema, pos) = read_len_enc_str(packet, pos)?;
    let (_table, pos) = read_len_enc_str(packet, pos)?;
    let (_org_table, pos) = read_len_enc_str(packet, pos)?;
    let (name, _pos) = read_len_enc_str(packet, pos)?;
    name.ok_or_else(|| ReError::SchemaLookup("column definition missing name".into()))
}

fn is_eof_packet(packet: &[u8]) -> bool {
    packet.first() == Some(&0xFE) && packet.len() < 9
}

fn check_error_packet(packet: &[u8]) -> CResult<()> {
    if packet.first() != Some(&0xFF) {
        return Ok(());
    }
    let code = packet
        .get(1..3)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .unwrap_or(0);
    // Skip the optional 6-byte SQL state marker ('#' + 5 chars) if present.
    let message_start = if packet.get(3) == Some(&b'#') { 9 } else { 3 };
    let message = String::from_utf8_lossy(packet.get(message_start..).unwrap_or_default()).into_owned();
    Err(ReError::Connect(format!("server error {code}: {message}")))
}
