//! Type-directed conversion of `pgoutput`'s text-format tuple values into
//! typed cell values, mirroring `cdc_mysql_binlog::decode::{CellValue,
//! decode_cell}` but working from text representations and Postgres type
//! oids rather than a binary wire format, since `pgoutput` always sends
//! column values as text.

use bigdecimal::BigDecimal;
use cdc_common::{CResult, ReError};

/// Raw per-column tag straight off the wire: a value is either absent
/// (`Null`), an elided unchanged-TOAST column (deliberately distinct from
/// null, §4.3), or present as text.
#[derive(Debug, Clone, PartialEq)]
pub enum PgCell {
    Null,
    UnchangedToast,
    Text(String),
}

/// Typed value after interpreting a `PgCell::Text` against its column's
/// type oid. `PgCell::Null`/`PgCell::UnchangedToast` pass through
/// unconverted; only `Text` carries oid-directed parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    UnchangedToast,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl PgValue {
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            PgValue::Null | PgValue::UnchangedToast => serde_json::Value::Null,
            PgValue::Boolean(b) => json!(b),
            PgValue::Integer(v) => json!(v),
            PgValue::Double(v) => json!(v),
            PgValue::Decimal(v) => json!(v.to_string()),
            PgValue::Text(s) => json!(s),
            PgValue::Bytes(bytes) => json!(encode_bytea_hex(bytes)),
            PgValue::Json(value) => value.clone(),
        }
    }
}

// Well-known built-in type oids this pipeline understands; anything else
// is carried through as text, matching Postgres' own "unknown type"
// fallback behavior for clients that don't special-case every oid.
const OID_BOOL: u32 = 16;
const OID_BYTEA: u32 = 17;
const OID_INT8: u32 = 20;
const OID_INT2: u32 = 21;
const OID_INT4: u32 = 23;
const OID_JSON: u32 = 114;
const OID_FLOAT4: u32 = 700;
const OID_FLOAT8: u32 = 701;
const OID_NUMERIC: u32 = 1700;
const OID_JSONB: u32 = 3802;

/// Interprets one `PgCell` against its column's type oid.
pub fn decode_cell(cell: &PgCell, type_oid: u32) -> CResult<PgValue> {
    let text = match cell {
        PgCell::Null => return Ok(PgValue::Null),
        PgCell::UnchangedToast => return Ok(PgValue::UnchangedToast),
        PgCell::Text(s) => s,
    };

    match type_oid {
        OID_BOOL => match text.as_str() {
            "t" => Ok(PgValue::Boolean(true)),
            "f" => Ok(PgValue::Boolean(false)),
            other => Err(ReError::Protocol(format!("invalid boolean text value {other:?}"))),
        },
        OID_INT2 | OID_INT4 | OID_INT8 => text
            .parse::<i64>()
            .map(PgValue::Integer)
            .map_err(|e| ReError::Protocol(format!("invalid integer text value {text:?}: {e}"))),
        OID_FLOAT4 | OID_FLOAT8 => text
            .parse::<f64>()
            .map(PgValue::Double)
            .map_err(|e| ReError::Protocol(format!("invalid float text value {text:?}: {e}"))),
        OID_NUMERIC => text
            .parse::<BigDecimal>()
            .map(PgValue::Decimal)
            .map_err(|e| ReError::Protocol(format!("invalid numeric text value {text:?}: {e}"))),
        OID_BYTEA => decode_bytea(text).map(PgValue::Bytes),
        OID_JSON | OID_JSONB => serde_json::from_str(text)
            .map(PgValue::Json)
            .map_err(|e| ReError::Protocol(format!("invalid json text value: {e}"))),
        _ => Ok(PgValue::Text(text.clone())),
    }
}

/// Postgres' `bytea` hex output format is `\x` followed by hex digit
/// pairs; the legacy escape format is not supported since `bytea_output`
/// defaults to `hex` on every server this pipeline targets.
fn decode_bytea(text: &str) -> CResult<Vec<u8>> {
    let hex = text
        .strip_prefix("\\x")
        .ok_or_else(|| ReError::Protocol(format!("unsupported bytea encoding (expected \\x prefix): {text:?}")))?;
    if hex.len() % 2 != 0 {
        return Err(ReError::Protocol("bytea hex string has odd length".into()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| ReError::Protocol(format!("invalid bytea hex digit: {e}"))))
        .collect()
}

fn encode_bytea_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("\\x");
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
