//! The canonical event record (§3) and its wire JSON shape (§6.5).
//!
//! `CanonicalEvent` is the internal representation threaded through the
//! pipeline: it carries the source position so the checkpoint manager can
//! record it. `EventWire` is the restricted subset actually handed to
//! sinks — no position, no source label, a fixed key order.

use cdc_common::Position;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    Ddl,
    Commit,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
            EventKind::Ddl => "DDL",
            EventKind::Commit => "COMMIT",
        }
    }
}

/// A single row's data, after column projection.
#[derive(Debug, Clone)]
pub enum RowImage {
    /// INSERT / DELETE: the full (projected) row.
    Row(Vec<(String, serde_json::Value)>),
    /// UPDATE: before/after images, same projected column set in both.
    Change {
        before: Vec<(String, serde_json::Value)>,
        after: Vec<(String, serde_json::Value)>,
    },
}

fn columns_to_value(columns: &[(String, serde_json::Value)]) -> serde_json::Value {
    let mut map = serde_json::Map::with_capacity(columns.len());
    for (name, value) in columns {
        map.insert(name.clone(), value.clone());
    }
    serde_json::Value::Object(map)
}

impl RowImage {
    fn to_value(&self) -> serde_json::Value {
        match self {
            RowImage::Row(cols) => columns_to_value(cols),
            RowImage::Change { before, after } => {
                let mut map = serde_json::Map::with_capacity(2);
                map.insert("before".into(), columns_to_value(before));
                map.insert("after".into(), columns_to_value(after));
                serde_json::Value::Object(map)
            }
        }
    }
}

/// The full internal event record (§3): what the checkpoint manager and
/// dispatcher see. `position` and `source_label` never reach a sink.
#[derive(Debug, Clone)]
pub struct CanonicalEvent {
    pub kind: EventKind,
    pub txn: String,
    pub schema: String,
    pub table: String,
    pub primary_key_columns: Vec<String>,
    pub rows: Vec<RowImage>,
    pub position: Position,
    /// Rendered `file_name:offset` or LSN, for logging and diagnostics only.
    pub source_label: String,
}

/// The field-order-pinned struct actually serialized to sinks (§6.5):
/// `type, txn, schema, table, primary_key, rows`. Struct field order is
/// what fixes the key order here, not any JSON map ordering feature.
#[derive(Serialize)]
struct EventWire<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    txn: &'a str,
    schema: &'a str,
    table: &'a str,
    primary_key: &'a [String],
    rows: Vec<serde_json::Value>,
}

impl CanonicalEvent {
    /// Renders the restricted wire JSON handed to sinks. Always a single
    /// well-formed JSON object; control characters inside string values
    /// were already escaped to `\u00XX` by serde_json's string escaper,
    /// which conservatively escapes every byte below 0x20.
    pub fn to_wire_json(&self) -> serde_json::Value {
        let wire = EventWire {
            kind: self.kind.as_str(),
            txn: &self.txn,
            schema: &self.schema,
            table: &self.table,
            primary_key: &self.primary_key_columns,
            rows: self.rows.iter().map(RowImage::to_value).collect(),
        };
        serde_json::to_value(&wire).expect("EventWire always serializes")
    }

    pub fn to_wire_string(&self) -> String {
        serde_json::to_string(&self.to_wire_json()).expect("EventWire always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(kind: EventKind, rows: Vec<RowImage>) -> CanonicalEvent {
        CanonicalEvent {
            kind,
            txn: "11111111-1111-1111-1111-111111111111".into(),
            schema: "testdb".into(),
            table: "users".into(),
            primary_key_columns: vec!["id".into()],
            rows,
            position: Position::Mysql { file_name: "mysql-bin.000001".into(), offset: 4 },
            source_label: "mysql-bin.000001:4".into(),
        }
    }

    #[test]
    fn insert_event_key_order_and_shape() {
        let ev = sample(
            EventKind::Insert,
            vec![RowImage::Row(vec![
                ("id".into(), json!(1)),
                ("name".into(), json!("ada")),
            ])],
        );
        let s = ev.to_wire_string();
        let type_pos = s.find("\"type\"").unwrap();
        let txn_pos = s.find("\"txn\"").unwrap();
        let schema_pos = s.find("\"schema\"").unwrap();
        let table_pos = s.find("\"table\"").unwrap();
        let pk_pos = s.find("\"primary_key\"").unwrap();
        let rows_pos = s.find("\"rows\"").unwrap();
        assert!(type_pos < txn_pos);
        assert!(txn_pos < schema_pos);
        assert!(schema_pos < table_pos);
        assert!(table_pos < pk_pos);
        assert!(pk_pos < rows_pos);

        let value: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(value["type"], "INSERT");
        assert_eq!(value["rows"][0]["name"], "ada");
    }

    #[test]
    fn update_event_has_before_after() {
        let ev = sample(
            EventKind::Update,
            vec![RowImage::Change {
                before: vec![("id".into(), json!(1)), ("name".into(), json!("ada"))],
                after: vec![("id".into(), json!(1)), ("name".into(), json!("grace"))],
            }],
        );
        let value = ev.to_wire_json();
        assert_eq!(value["rows"][0]["before"]["name"], "ada");
        assert_eq!(value["rows"][0]["after"]["name"], "grace");
        let before_keys: std::collections::BTreeSet<_> =
            value["rows"][0]["before"].as_object().unwrap().keys().collect();
        let after_keys: std::collections::BTreeSet<_> =
            value["rows"][0]["after"].as_object().unwrap().keys().collect();
        assert_eq!(before_keys, after_keys);
    }

    #[test]
    fn position_and_source_label_not_in_wire_json() {
        let ev = sample(EventKind::Commit, vec![]);
        let value = ev.to_wire_json();
        assert!(value.get("position").is_none());
        assert!(value.get("source_label").is_none());
    }

    #[test]
    fn control_characters_are_escaped() {
        let ev = sample(
            EventKind::Insert,
            vec![RowImage::Row(vec![("note".into(), json!("a\u{0007}b"))])],
        );
        let s = ev.to_wire_string();
        assert!(s.contains("\\u0007"));
    }
}
