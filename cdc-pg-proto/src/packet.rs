//! Postgres frontend/backend message framing (§4.1 wire reader): a
//! 1-byte message tag followed by a 4-byte big-endian length (including
//! itself) and the payload. Grounded structurally on
//! `cdc_mysql_proto::packet::PacketStream` (same polling-read-with-
//! cancellation shape), with the byte order and header layout taken from
//! the Postgres frontend/backend protocol rather than MySQL's.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use cdc_common::{CResult, ReError};

pub const WAKE_INTERVAL: Duration = Duration::from_secs(1);

pub struct PgPacketStream {
    stream: TcpStream,
}

impl PgPacketStream {
    pub fn connect(host: &str, port: u16) -> CResult<PgPacketStream> {
        let stream = TcpStream::connect((host, port))
            .map_err(|e| ReError::Connect(format!("connecting to {host}:{port}: {e}")))?;
        stream
            .set_read_timeout(Some(WAKE_INTERVAL))
            .map_err(|e| ReError::Connect(format!("setting read timeout: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ReError::Connect(format!("setting nodelay: {e}")))?;
        Ok(PgPacketStream { stream })
    }

    /// Reads one tagged backend message: 1-byte tag, 4-byte big-endian
    /// length (includes itself, excludes the tag byte), then the payload.
    pub fn read_message(&mut self, should_stop: &dyn Fn() -> bool) -> CResult<Option<(u8, Vec<u8>)>> {
        let mut tag = [0u8; 1];
        if !self.read_exact_polling(&mut tag, should_stop)? {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        if !self.read_exact_polling(&mut len_bytes, should_stop)? {
            return Ok(None);
        }
        let len = (&len_bytes[..])
            .read_u32::<BigEndian>()
            .map_err(|e| ReError::Protocol(format!("reading message length: {e}")))? as usize;
        if len < 4 {
            return Err(ReError::Protocol("message length smaller than its own header".into()));
        }
        let mut payload = vec![0u8; len - 4];
        if !payload.is_empty() && !self.read_exact_polling(&mut payload, should_stop)? {
            return Ok(None);
        }
        Ok(Some((tag[0], payload)))
    }

    /// Reads a raw length-prefixed message with no leading tag byte, used
    /// only for the very first startup message the frontend sends.
    pub fn read_untagged_message(&mut self) -> CResult<Vec<u8>> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes).map_err(map_io_fatal)?;
        let len = (&len_bytes[..])
            .read_u32::<BigEndian>()
            .map_err(|e| ReError::Protocol(format!("reading message length: {e}")))? as usize;
        let mut payload = vec![0u8; len.saturating_sub(4)];
        self.stream.read_exact(&mut payload).map_err(map_io_fatal)?;
        Ok(payload)
    }

    fn read_exact_polling(&mut self, buf: &mut [u8], should_stop: &dyn Fn() -> bool) -> CResult<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(ReError::Connect("connection closed by peer".into())),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                    if should_stop() {
                        return Ok(false);
                    }
                }
                Err(e) => return Err(map_io_fatal(e)),
            }
        }
        Ok(true)
    }

    /// Writes a tagged frontend message (startup excepted, see
    /// `write_untagged`).
    pub fn write_message(&mut self, tag: u8, payload: &[u8]) -> CResult<()> {
        self.stream.write_u8(tag).map_err(map_io_fatal)?;
        self.stream
            .write_u32::<BigEndian>((payload.len() + 4) as u32)
            .map_err(map_io_fatal)?;
        self.stream.write_all(payload).map_err(map_io_fatal)?;
        self.stream.flush().map_err(map_io_fatal)?;
        Ok(())
    }

    /// Writes the untagged startup message: just a length prefix and
    /// payload, no leading tag byte.
    pub fn write_untagged(&mut self, payload: &[u8]) -> CResult<()> {
        self.stream
            .write_u32::<BigEndian>((payload.len() + 4) as u32)
            .map_err(map_io_fatal)?;
        self.stream.write_all(payload).map_err(map_io_fatal)?;
        self.stream.flush().map_err(map_io_fatal)?;
        Ok(())
    }
}

fn map_io_fatal(e: io::Error) -> ReError {
    ReError::Connect(format!("replication socket error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn round_trips_a_tagged_message_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut tag = [0u8; 1];
            sock.read_exact(&mut tag).unwrap();
            let mut len_bytes = [0u8; 4];
            sock.read_exact(&mut len_bytes).unwrap();
            let len = (&len_bytes[..]).read_u32::<BigEndian>().unwrap() as usize;
            let mut payload = vec![0u8; len - 4];
            sock.read_exact(&mut payload).unwrap();
            sock.write_all(&tag).unwrap();
            sock.write_all(&len_bytes).unwrap();
            sock.write_all(&payload).unwrap();
        });

        let mut client = PgPacketStream::connect(&addr.ip().to_string(), addr.port()).unwrap();
        client.write_message(b'Q', b"SELECT 1").unwrap();
        let (tag, payload) = client.read_message(&|| false).unwrap().unwrap();
        assert_eq!(tag, b'Q');
        assert_eq!(payload, b"SELECT 1");
        server.join().unwrap();
    }
}
