//! TABLE_MAP event parsing (§4.2, §4.4). Grounded on
//! `binlog/src/events/protocol/table_map_event.rs`, adapted to populate
//! `cdc_schema::RelationDescriptor` instead of the teacher's bespoke
//! `ColumnInfo`/`TableMetadata` types.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use cdc_common::{CResult, ReError};
use cdc_schema::{ColumnDescriptor, ColumnFlags, RelationDescriptor};

use crate::column_type::{parse_metadata, ColumnType};

/// Parsed body of a TABLE_MAP event, before being folded into a
/// `RelationDescriptor` (which additionally needs primary-key and
/// nullable-flag data the TABLE_MAP event alone does not carry in full
/// for older MySQL versions).
pub struct TableMapBody {
    pub table_id: u64,
    pub schema_name: String,
    pub table_name: String,
    pub column_types: Vec<ColumnType>,
    pub column_metadata: Vec<u16>,
    pub nullable: Vec<bool>,
}

fn read_null_terminated_string(cursor: &mut Cursor<&[u8]>) -> CResult<String> {
    let len = cursor.read_u8()? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    let terminator = cursor.read_u8()?;
    if terminator != 0 {
        return Err(ReError::Protocol("expected null terminator after name field".into()));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_len_enc_int(cursor: &mut Cursor<&[u8]>) -> CResult<u64> {
    let first = cursor.read_u8()?;
    match first {
        0..=0xfa => Ok(first as u64),
        0xfc => Ok(cursor.read_u16::<LittleEndian>()? as u64),
        0xfd => Ok(cursor.read_uint::<LittleEndian>(3)?),
        0xfe => Ok(cursor.read_u64::<LittleEndian>()?),
        0xfb | 0xff => Err(ReError::Protocol("unexpected length-encoded integer marker".into())),
    }
}

/// Reads a little-endian bitmap into one bool per bit, sized to
/// `count` bits (shared shape with the row-event null-bitmap, but
/// kept separate since TABLE_MAP's mask covers every declared column,
/// not just the present ones in a row image).
fn read_bitmap_little_endian(bytes: &[u8], count: usize) -> Vec<bool> {
    let mut result = Vec::with_capacity(count);
    for i in 0..count {
        let byte = bytes[i / 8];
        result.push((byte >> (i % 8)) & 1 == 1);
    }
    result
}

/// Parses a TABLE_MAP event body (post-header already consumed by the
/// caller down to `table_id`/`flags`, which are reparsed here from the
/// full body since both live in the same packet).
pub fn parse(body: &[u8]) -> CResult<TableMapBody> {
    let mut cursor = Cursor::new(body);

    let mut id_bytes = [0u8; 8];
    cursor.read_exact(&mut id_bytes[..6])?;
    let table_id = u64::from_le_bytes(id_bytes);
    let _flags = cursor.read_u16::<LittleEndian>()?;

    let schema_name = read_null_terminated_string(&mut cursor)?;
    let table_name = read_null_terminated_string(&mut cursor)?;

    let column_count = read_len_enc_int(&mut cursor)? as usize;
    let mut type_codes = vec![0u8; column_count];
    cursor.read_exact(&mut type_codes)?;
    let column_types: Vec<ColumnType> = type_codes.iter().map(|&t| ColumnType::from(t)).collect();

    let _metadata_len = read_len_enc_int(&mut cursor)?;
    let mut column_metadata = Vec::with_capacity(column_count);
    for &column_type in &column_types {
        column_metadata.push(parse_metadata(&mut cursor, column_type)?);
    }

    let mask_len = (column_count + 7) / 8;
    let mut mask_bytes = vec![0u8; mask_len];
    cursor.read_exact(&mut mask_bytes)?;
    let nullable = read_bitmap_little_endian(&mask_bytes, column_count);

    Ok(TableMapBody { table_id, schema_name, table_name, column_types, column_metadata, nullable })
}

/// Builds a `RelationDescriptor` from a parsed TABLE_MAP body. Primary
/// key membership is not carried on the wire for MySQL row events
/// before the optional extra-metadata block (§9); callers that need it
/// resolve it via the side-channel `SHOW KEYS` / catalog lookup and
/// patch `primary_key_columns` in afterward.
pub fn to_relation_descriptor(body: &TableMapBody, column_names: Vec<String>) -> RelationDescriptor {
    let columns = body
        .column_types
        .iter()
        .zip(body.column_metadata.iter())
        .zip(body.nullable.iter())
        .zip(column_names.into_iter().chain(std::iter::repeat(String::new())))
        .map(|(((column_type, metadata), nullable), name)| ColumnDescriptor {
            name,
            wire_type: wire_type_code(*column_type),
            type_meta: *metadata as i32,
            flags: ColumnFlags { nullable: *nullable, unsigned: false, is_key: false },
        })
        .collect();

    RelationDescriptor {
        relation_id: body.table_id,
        schema_name: body.schema_name.clone(),
        table_name: body.table_name.clone(),
        columns,
        primary_key_columns: Vec::new(),
    }
}

fn wire_type_code(column_type: ColumnType) -> u32 {
    match column_type {
        ColumnType::Decimal => 0,
        ColumnType::Tiny => 1,
        ColumnType::Short => 2,
        ColumnType::Long => 3,
        ColumnType::Float => 4,
        ColumnType::Double => 5,
        ColumnType::Null => 6,
        ColumnType::Timestamp => 7,
        ColumnType::LongLong => 8,
        ColumnType::Int24 => 9,
        ColumnType::Date => 10,
        ColumnType::Time => 11,
        ColumnType::DateTime => 12,
        ColumnType::Year => 13,
        ColumnType::NewDate => 14,
        ColumnType::VarChar => 15,
        ColumnType::Bit => 16,
        ColumnType::Timestamp2 => 17,
        ColumnType::DateTime2 => 18,
        ColumnType::Time2 => 19,
        ColumnType::Json => 245,
        ColumnType::NewDecimal => 246,
        ColumnType::Enum => 247,
        ColumnType::Set => 248,
        ColumnType::TinyBlob => 249,
        ColumnType::MediumBlob => 250,
        ColumnType::LongBlob => 251,
        ColumnType::Blob => 252,
        ColumnType::VarString => 253,
        ColumnType::String => 254,
        ColumnType::Geometry => 255,
        ColumnType::Unknown(code) => code as u32,
    }
}
