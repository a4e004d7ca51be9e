pub mod capability;
pub mod connection;
pub mod dialect;
pub mod dump;
pub mod handshake;
pub mod packet;
pub mod resultset;

pub use capability::{client_capabilities, CapabilityFlags};
pub use connection::MysqlConnection;
pub use dialect::{detect_dialect, parse_enum_labels, Dialect, DialectInfo};
pub use dump::{DumpBinlogCommand, QueryCommand, RegisterSlaveCommand};
pub use handshake::{native_password_scramble, HandshakePacket, HandshakeResponse};
pub use packet::PacketStream;
pub use resultset::{read_len_enc_int, read_len_enc_str, TextRow};
