//! Per-type cell decoding (§4.2 value decoding, output policy). Grounded
//! on `binlog/src/column/decoders/{datetime,bit,blob,string,decimal_enhanced}.rs`
//! and `binlog/src/row/row_parser.rs::parse_cell`, consolidated into one
//! module rather than the teacher's one-struct-per-type `TypeDecoder`
//! registry (judged over-engineered for this crate's needs).

use std::io::{Cursor, Read};

use bigdecimal::BigDecimal;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use cdc_common::{CResult, ReError};

use crate::column_type::ColumnType;

/// Binary cell payloads longer than this are truncated in the canonical
/// JSON output, with a trailing `...` marker (§4.2).
pub const BINARY_TRUNCATE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    UnsignedInteger(u64),
    Float(f32),
    Double(f64),
    Decimal(BigDecimal),
    Year(u16),
    Date { year: u16, month: u8, day: u8 },
    Time { hour: i32, minute: u8, second: u8, micros: u32 },
    DateTime { year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8, micros: u32 },
    Timestamp { millis: i64 },
    String(String),
    Bytes(Vec<u8>),
    Bit(Vec<bool>),
    /// Ordinal value; resolved to a label string by the caller once the
    /// relation's enum catalog is available.
    Enum(u64),
    Set(u64),
    Json(serde_json::Value),
}

impl CellValue {
    /// Renders the canonical JSON representation (§3, §4.2): numbers as
    /// JSON numbers, temporals as quoted ISO-8601 strings, binary data as
    /// an escaped string truncated at `BINARY_TRUNCATE_LEN` bytes.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Integer(v) => json!(v),
            CellValue::UnsignedInteger(v) => json!(v),
            CellValue::Float(v) => json!(v),
            CellValue::Double(v) => json!(v),
            CellValue::Decimal(v) => json!(v.to_string()),
            CellValue::Year(y) => json!(y),
            CellValue::Date { year, month, day } => {
                json!(format!("{year:04}-{month:02}-{day:02}"))
            }
            CellValue::Time { hour, minute, second, micros } => {
                if *micros > 0 {
                    json!(format!("{hour:02}:{minute:02}:{second:02}.{micros:06}"))
                } else {
                    json!(format!("{hour:02}:{minute:02}:{second:02}"))
                }
            }
            CellValue::DateTime { year, month, day, hour, minute, second, micros } => {
                if *micros > 0 {
                    json!(format!(
                        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micros:06}"
                    ))
                } else {
                    json!(format!(
                        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}"
                    ))
                }
            }
            CellValue::Timestamp { millis } => {
                let secs = millis.div_euclid(1000);
                let sub_millis = millis.rem_euclid(1000);
                match chrono::DateTime::from_timestamp(secs, (sub_millis * 1_000_000) as u32) {
                    Some(dt) => json!(dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
                    None => serde_json::Value::Null,
                }
            }
            CellValue::String(s) => json!(s),
            CellValue::Bytes(bytes) => json!(truncate_binary(bytes)),
            CellValue::Bit(bits) => {
                json!(bits.iter().map(|b| if *b { '1' } else { '0' }).collect::<String>())
            }
            CellValue::Enum(ordinal) => json!(ordinal),
            CellValue::Set(bitmap) => json!(bitmap),
            CellValue::Json(value) => value.clone(),
        }
    }
}

fn truncate_binary(bytes: &[u8]) -> String {
    if bytes.len() <= BINARY_TRUNCATE_LEN {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        let mut s = String::from_utf8_lossy(&bytes[..BINARY_TRUNCATE_LEN]).into_owned();
        s.push_str("...");
        s
    }
}

/// Decodes a single row cell given its wire type and TABLE_MAP metadata.
pub fn decode_cell(cursor: &mut Cursor<&[u8]>, column_type: ColumnType, metadata: u16) -> CResult<CellValue> {
    match column_type {
        ColumnType::Tiny => Ok(CellValue::Integer(cursor.read_i8()? as i64)),
        ColumnType::Short => Ok(CellValue::Integer(cursor.read_i16::<LittleEndian>()? as i64)),
        ColumnType::Int24 => Ok(CellValue::Integer(cursor.read_i24::<LittleEndian>()? as i64)),
        ColumnType::Long => Ok(CellValue::Integer(cursor.read_i32::<LittleEndian>()? as i64)),
        ColumnType::LongLong => Ok(CellValue::Integer(cursor.read_i64::<LittleEndian>()?)),
        ColumnType::Float => Ok(CellValue::Float(cursor.read_f32::<LittleEndian>()?)),
        ColumnType::Double => Ok(CellValue::Double(cursor.read_f64::<LittleEndian>()?)),
        ColumnType::Null => Ok(CellValue::Null),

        ColumnType::Year => Ok(CellValue::Year(1900 + cursor.read_u8()? as u16)),

        ColumnType::Date => {
            let value = cursor.read_u24::<LittleEndian>()?;
            let day = value % (1 << 5);
            let month = (value >> 5) % (1 << 4);
            let year = value >> 9;
            Ok(CellValue::Date { year: year as u16, month: month as u8, day: day as u8 })
        }

        ColumnType::Time => {
            let raw = (cursor.read_i24::<LittleEndian>()? << 8) >> 8;
            if raw < 0 {
                return Err(ReError::Protocol("negative TIME values are not supported".into()));
            }
            let second = raw % 100;
            let minute = (raw / 100) % 100;
            let hour = raw / 10000;
            Ok(CellValue::Time { hour, minute: minute as u8, second: second as u8, micros: 0 })
        }

        ColumnType::Time2 => {
            let value = cursor.read_u24::<BigEndian>()?;
            let micros = parse_fractional_micros(cursor, metadata)?;
            let negative = ((value >> 23) & 1) == 0;
            if negative {
                return Err(ReError::Protocol("negative TIME2 values are not supported".into()));
            }
            let hour = (value >> 12) % (1 << 10);
            let minute = (value >> 6) % (1 << 6);
            let second = value % (1 << 6);
            Ok(CellValue::Time { hour: hour as i32, minute: minute as u8, second: second as u8, micros })
        }

        ColumnType::DateTime => {
            let mut value = cursor.read_u64::<LittleEndian>()?;
            let second = value % 100;
            value /= 100;
            let minute = value % 100;
            value /= 100;
            let hour = value % 100;
            value /= 100;
            let day = value % 100;
            value /= 100;
            let month = value % 100;
            value /= 100;
            let year = value;
            Ok(CellValue::DateTime {
                year: year as u16,
                month: month as u8,
                day: day as u8,
                hour: hour as u8,
                minute: minute as u8,
                second: second as u8,
                micros: 0,
            })
        }

        ColumnType::DateTime2 => {
            let value = cursor.read_uint::<BigEndian>(5)?;
            let micros = parse_fractional_micros(cursor, metadata)?;
            let year_month = (value >> 22) % (1 << 17);
            let year = year_month / 13;
            let month = year_month % 13;
            let day = (value >> 17) % (1 << 5);
            let hour = (value >> 12) % (1 << 5);
            let minute = (value >> 6) % (1 << 6);
            let second = value % (1 << 6);
            Ok(CellValue::DateTime {
                year: year as u16,
                month: month as u8,
                day: day as u8,
                hour: hour as u8,
                minute: minute as u8,
                second: second as u8,
                micros,
            })
        }

        ColumnType::Timestamp => {
            let seconds = cursor.read_u32::<LittleEndian>()? as i64;
            Ok(CellValue::Timestamp { millis: seconds * 1000 })
        }

        ColumnType::Timestamp2 => {
            let seconds = cursor.read_u32::<BigEndian>()? as i64;
            let micros = parse_fractional_micros(cursor, metadata)? as i64;
            Ok(CellValue::Timestamp { millis: seconds * 1000 + micros / 1000 })
        }

        ColumnType::VarChar | ColumnType::VarString | ColumnType::String => {
            let len = if metadata < 256 {
                cursor.read_u8()? as usize
            } else {
                cursor.read_u16::<LittleEndian>()? as usize
            };
            let mut bytes = vec![0u8; len];
            cursor.read_exact(&mut bytes)?;
            Ok(CellValue::String(String::from_utf8_lossy(&bytes).into_owned()))
        }

        ColumnType::Bit => {
            let bits = ((metadata >> 8) * 8 + (metadata & 0xFF)) as usize;
            let byte_len = (bits + 7) / 8;
            let mut bytes = vec![0u8; byte_len];
            cursor.read_exact(&mut bytes)?;
            Ok(CellValue::Bit(bitmap_big_endian(&bytes, bits)))
        }

        ColumnType::Blob | ColumnType::TinyBlob | ColumnType::MediumBlob | ColumnType::LongBlob => {
            let len_bytes = if metadata == 0 { 1 } else { metadata as usize };
            let len = cursor.read_uint::<LittleEndian>(len_bytes)? as usize;
            let mut bytes = vec![0u8; len];
            cursor.read_exact(&mut bytes)?;
            Ok(CellValue::Bytes(bytes))
        }

        ColumnType::Geometry => {
            let len_bytes = if metadata == 0 { 4 } else { metadata as usize };
            let len = cursor.read_uint::<LittleEndian>(len_bytes)? as usize;
            let mut bytes = vec![0u8; len];
            cursor.read_exact(&mut bytes)?;
            Ok(CellValue::Bytes(bytes))
        }

        ColumnType::Json => {
            let len_bytes = if metadata == 0 { 4 } else { metadata as usize };
            let len = cursor.read_uint::<LittleEndian>(len_bytes)? as usize;
            let mut bytes = vec![0u8; len];
            cursor.read_exact(&mut bytes)?;
            // MySQL's binary JSON format is not decoded here; the value
            // is carried as UTF-8 text, matching what the wire actually
            // sends for logical-replication-style consumption.
            let text = String::from_utf8_lossy(&bytes).into_owned();
            match serde_json::from_str(&text) {
                Ok(value) => Ok(CellValue::Json(value)),
                Err(_) => Ok(CellValue::String(text)),
            }
        }

        ColumnType::NewDecimal => {
            let precision = (metadata >> 8) as u8;
            let scale = (metadata & 0xFF) as u8;
            decode_decimal(cursor, precision, scale)
        }

        ColumnType::Enum => {
            let width = if metadata & 0xFF == 0 { 1 } else { (metadata & 0xFF) as usize };
            let ordinal = cursor.read_uint::<LittleEndian>(width)?;
            Ok(CellValue::Enum(ordinal))
        }

        ColumnType::Set => {
            let width = if metadata & 0xFF == 0 { 1 } else { (metadata & 0xFF) as usize };
            let bitmap = cursor.read_uint::<LittleEndian>(width)?;
            Ok(CellValue::Set(bitmap))
        }

        ColumnType::Decimal => Err(ReError::Protocol("legacy DECIMAL type is not supported".into())),
        ColumnType::NewDate => Err(ReError::Protocol("NEWDATE is an internal-only type".into())),
        ColumnType::Unknown(code) => Err(ReError::Protocol(format!("unsupported column type code {code}"))),
    }
}

fn parse_fractional_micros(cursor: &mut Cursor<&[u8]>, metadata: u16) -> CResult<u32> {
    let length = (metadata + 1) / 2;
    if length == 0 {
        return Ok(0);
    }
    let fraction = cursor.read_uint::<BigEndian>(length as usize)?;
    Ok((fraction * u64::pow(100, 3 - length as u32) / 1000) as u32)
}

fn bitmap_big_endian(bytes: &[u8], bits: usize) -> Vec<bool> {
    let mut result = Vec::with_capacity(bits);
    for i in 0..bits {
        let byte = bytes[i / 8];
        let shift = 7 - (i % 8);
        result.push((byte >> shift) & 1 == 1);
    }
    result
}

/// MySQL's packed-decimal binary format (`DIG_PER_DEC1 = 9`, see
/// `binlog/src/column/decoders/decimal_enhanced.rs`), parsed into a
/// digit string and handed to `bigdecimal` for arbitrary-precision
/// correctness rather than round-tripped through an IEEE-754 float.
fn decode_decimal(cursor: &mut Cursor<&[u8]>, precision: u8, scale: u8) -> CResult<CellValue> {
    const DIG_PER_DEC1: u8 = 9;
    const DIG2BYTES: [u8; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

    let integral_digits = precision - scale;
    let integral_groups = integral_digits / DIG_PER_DEC1;
    let integral_extra = integral_digits - integral_groups * DIG_PER_DEC1;
    let fractional_groups = scale / DIG_PER_DEC1;
    let fractional_extra = scale - fractional_groups * DIG_PER_DEC1;

    let total_len = (integral_groups * 4
        + DIG2BYTES[integral_extra as usize]
        + fractional_groups * 4
        + DIG2BYTES[fractional_extra as usize]) as usize;

    let mut bytes = vec![0u8; total_len];
    cursor.read_exact(&mut bytes)?;

    // Sign bit lives in the top bit of the first byte; 1 means positive.
    // Flip it unconditionally, then for negative values invert every
    // byte (MySQL stores negatives as the bitwise complement of the
    // positive magnitude).
    let is_negative = bytes[0] & 0x80 == 0;
    bytes[0] ^= 0x80;
    if is_negative {
        for b in bytes.iter_mut() {
            *b ^= 0xFF;
        }
    }

    let mut digits = String::new();
    let mut pos = 0usize;

    if integral_extra > 0 {
        let width = DIG2BYTES[integral_extra as usize] as usize;
        let value = read_be_uint(&bytes[pos..pos + width]);
        digits.push_str(&value.to_string());
        pos += width;
    }
    for _ in 0..integral_groups {
        let value = read_be_uint(&bytes[pos..pos + 4]);
        digits.push_str(&format!("{value:09}"));
        pos += 4;
    }
    if digits.is_empty() {
        digits.push('0');
    }

    if scale > 0 {
        digits.push('.');
        for _ in 0..fractional_groups {
            let value = read_be_uint(&bytes[pos..pos + 4]);
            digits.push_str(&format!("{value:09}"));
            pos += 4;
        }
        if fractional_extra > 0 {
            let width = DIG2BYTES[fractional_extra as usize] as usize;
            let value = read_be_uint(&bytes[pos..pos + width]);
            digits.push_str(&format!("{value:0width$}", width = fractional_extra as usize));
        }
    }

    if is_negative {
        digits.insert(0, '-');
    }

    use std::str::FromStr;
    BigDecimal::from_str(&digits)
        .map(CellValue::Decimal)
        .map_err(|e| ReError::Protocol(format!("malformed packed decimal: {e}")))
}

fn read_be_uint(bytes: &[u8]) -> u32 {
    let mut value: u32 = 0;
    for &b in bytes {
        value = (value << 8) | b as u32;
    }
    value
}
