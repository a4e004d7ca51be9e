//! MySQL column type codes and their TABLE_MAP metadata encoding (§4.2,
//! §4.4). Grounded on `binlog/src/column/column_type.rs` and
//! `binlog/src/events/protocol/table_map_event.rs::parse_metadata`, but
//! kept as a plain numeric code with metadata parsed separately per
//! column rather than baked into the type enum — TABLE_MAP metadata is
//! per-instance (varies with declared precision/length), not a property
//! of the type itself.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use cdc_common::CResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    VarChar,
    Bit,
    Timestamp2,
    DateTime2,
    Time2,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
    Unknown(u8),
}

impl From<u8> for ColumnType {
    fn from(code: u8) -> ColumnType {
        match code {
            0 => ColumnType::Decimal,
            1 => ColumnType::Tiny,
            2 => ColumnType::Short,
            3 => ColumnType::Long,
            4 => ColumnType::Float,
            5 => ColumnType::Double,
            6 => ColumnType::Null,
            7 => ColumnType::Timestamp,
            8 => ColumnType::LongLong,
            9 => ColumnType::Int24,
            10 => ColumnType::Date,
            11 => ColumnType::Time,
            12 => ColumnType::DateTime,
            13 => ColumnType::Year,
            14 => ColumnType::NewDate,
            15 => ColumnType::VarChar,
            16 => ColumnType::Bit,
            17 => ColumnType::Timestamp2,
            18 => ColumnType::DateTime2,
            19 => ColumnType::Time2,
            245 => ColumnType::Json,
            246 => ColumnType::NewDecimal,
            247 => ColumnType::Enum,
            248 => ColumnType::Set,
            249 => ColumnType::TinyBlob,
            250 => ColumnType::MediumBlob,
            251 => ColumnType::LongBlob,
            252 => ColumnType::Blob,
            253 => ColumnType::VarString,
            254 => ColumnType::String,
            255 => ColumnType::Geometry,
            other => ColumnType::Unknown(other),
        }
    }
}

/// Per-column metadata as carried in a TABLE_MAP event: opaque 16-bit
/// value whose interpretation depends on the column's type.
pub fn parse_metadata(cursor: &mut Cursor<&[u8]>, column_type: ColumnType) -> CResult<u16> {
    let meta = match column_type {
        ColumnType::Blob
        | ColumnType::Double
        | ColumnType::Float
        | ColumnType::Geometry
        | ColumnType::Time2
        | ColumnType::DateTime2
        | ColumnType::Timestamp2
        | ColumnType::Json => cursor.read_u8()? as u16,

        ColumnType::Bit | ColumnType::VarChar => cursor.read_u16::<LittleEndian>()?,

        ColumnType::NewDecimal => {
            let precision = cursor.read_u8()? as u16;
            let scale = cursor.read_u8()? as u16;
            (precision << 8) | scale
        }

        ColumnType::Enum | ColumnType::Set | ColumnType::VarString | ColumnType::String => {
            let real_type = cursor.read_u8()? as u16;
            let len = cursor.read_u8()? as u16;
            (real_type << 8) | len
        }

        _ => 0,
    };
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(ColumnType::from(246), ColumnType::NewDecimal);
        assert_eq!(ColumnType::from(15), ColumnType::VarChar);
        assert_eq!(ColumnType::from(200), ColumnType::Unknown(200));
    }

    #[test]
    fn parses_varchar_metadata() {
        let bytes = 300u16.to_le_bytes();
        let mut cursor = Cursor::new(&bytes[..]);
        assert_eq!(parse_metadata(&mut cursor, ColumnType::VarChar).unwrap(), 300);
    }

    #[test]
    fn parses_decimal_metadata() {
        let bytes = [10u8, 2u8];
        let mut cursor = Cursor::new(&bytes[..]);
        let meta = parse_metadata(&mut cursor, ColumnType::NewDecimal).unwrap();
        assert_eq!(meta >> 8, 10);
        assert_eq!(meta & 0xff, 2);
    }

    #[test]
    fn parses_single_byte_metadata() {
        let bytes = [4u8];
        let mut cursor = Cursor::new(&bytes[..]);
        assert_eq!(parse_metadata(&mut cursor, ColumnType::Blob).unwrap(), 4);
    }
}
