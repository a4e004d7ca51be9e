//! `COM_BINLOG_DUMP` command serialization. Grounded directly on
//! `connection/src/commands/dump_binlog_command.rs`.

use byteorder::{LittleEndian, WriteBytesExt};
use cdc_common::{CResult, ReError};
use std::io::{Cursor, Write};

const COM_BINLOG_DUMP: u8 = 0x12;
const COM_QUERY: u8 = 0x03;
const COM_REGISTER_SLAVE: u8 = 0x15;

pub struct DumpBinlogCommand {
    pub server_id: u32,
    pub binlog_filename: String,
    pub binlog_position: u32,
    pub flags: u16,
}

impl DumpBinlogCommand {
    pub fn new(server_id: u32, binlog_filename: String, binlog_position: u32) -> DumpBinlogCommand {
        DumpBinlogCommand { server_id, binlog_filename, binlog_position, flags: 0 }
    }

    pub fn serialize(&self) -> CResult<Vec<u8>> {
        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);
        cursor.write_u8(COM_BINLOG_DUMP).map_err(io_err)?;
        cursor.write_u32::<LittleEndian>(self.binlog_position).map_err(io_err)?;
        cursor.write_u16::<LittleEndian>(self.flags).map_err(io_err)?;
        cursor.write_u32::<LittleEndian>(self.server_id).map_err(io_err)?;
        cursor.write_all(self.binlog_filename.as_bytes()).map_err(io_err)?;
        Ok(buf)
    }
}

/// `COM_REGISTER_SLAVE`: announces this connection as a replica before
/// `COM_BINLOG_DUMP`. Not strictly required by all servers but matches
/// the teacher's connection sequence and avoids surprising a strict
/// master with an unregistered dump request.
pub struct RegisterSlaveCommand {
    pub server_id: u32,
    pub hostname: String,
}

impl RegisterSlaveCommand {
    pub fn serialize(&self) -> CResult<Vec<u8>> {
        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);
        cursor.write_u8(COM_REGISTER_SLAVE).map_err(io_err)?;
        cursor.write_u32::<LittleEndian>(self.server_id).map_err(io_err)?;
        cursor.write_u8(self.hostname.len() as u8).map_err(io_err)?;
        cursor.write_all(self.hostname.as_bytes()).map_err(io_err)?;
        cursor.write_u8(0).map_err(io_err)?; // user len
        cursor.write_u8(0).map_err(io_err)?; // password len
        cursor.write_u16::<LittleEndian>(0).map_err(io_err)?; // port
        cursor.write_u32::<LittleEndian>(0).map_err(io_err)?; // replication rank
        cursor.write_u32::<LittleEndian>(0).map_err(io_err)?; // master id
        Ok(buf)
    }
}

pub struct QueryCommand {
    pub sql: String,
}

impl QueryCommand {
    pub fn new(sql: impl Into<String>) -> QueryCommand {
        QueryCommand { sql: sql.into() }
    }

    pub fn serialize(&self) -> CResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.sql.len() + 1);
        buf.push(COM_QUERY);
        buf.extend_from_slice(self.sql.as_bytes());
        Ok(buf)
    }
}

fn io_err(e: std::io::Error) -> ReError {
    ReError::Protocol(format!("encoding command: {e}"))
}
