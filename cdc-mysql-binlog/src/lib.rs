pub mod checksum;
pub mod column_type;
pub mod decode;
pub mod decoder;
pub mod event_type;
pub mod format_description;
pub mod header;
pub mod query;
pub mod rotate;
pub mod rows;
pub mod table_map;

pub use checksum::{split_checksum, verify, CHECKSUM_LEN};
pub use column_type::ColumnType;
pub use decode::{decode_cell, CellValue, BINARY_TRUNCATE_LEN};
pub use decoder::{ColumnCatalog, DecodeOutcome, MysqlBinlogDecoder, MysqlEvent};
pub use event_type::EventType;
pub use format_description::FormatDescription;
pub use header::{EventHeader, EVENT_HEADER_LEN};
pub use query::{QueryEvent, QueryKind};
pub use rotate::RotateEvent;
pub use rows::{RowEventVersion, RowImage, RowsPostHeader};
pub use table_map::TableMapBody;
