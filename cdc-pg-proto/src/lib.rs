pub mod connection;
pub mod decoder;
pub mod packet;
pub mod pgoutput;
pub mod replication;
pub mod value;

pub use connection::{PgConnection, PgConnectionParams};
pub use decoder::{DecodeOutcome, PgEvent, PgLogicalDecoder};
pub use packet::PgPacketStream;
pub use pgoutput::PgOutputMessage;
pub use replication::{ReplicationMessage, ReplicationStream, FEEDBACK_INTERVAL};
pub use value::{PgCell, PgValue};
