//! Shapes decoded source events into `cdc_capture::CanonicalEvent`
//! (§3): resolves capture policy and column projection, and converts
//! each decoder's cell values into the shared JSON row representation.
//! The final "`MysqlEvent` -> `CanonicalEvent`" translation the MySQL
//! decoder deliberately leaves to a higher layer happens here.

use cdc_capture::{CanonicalEvent, CapturePolicy, EventKind, Projection, RowImage};
use cdc_common::Position;
use cdc_mysql_binlog::{CellValue, MysqlEvent};
use cdc_pg_proto::{PgEvent, PgValue};
use cdc_schema::RelationDescriptor;
use serde_json::json;

fn mysql_row_to_columns(
    relation: &RelationDescriptor,
    projection: &Projection,
    row: &[Option<CellValue>],
) -> Vec<(String, serde_json::Value)> {
    relation
        .columns
        .iter()
        .enumerate()
        .filter(|(i, _)| projection.includes(*i))
        .map(|(i, col)| {
            let value = row.get(i).and_then(|c| c.as_ref()).map(CellValue::to_json).unwrap_or(serde_json::Value::Null);
            (col.name.clone(), value)
        })
        .collect()
}

/// Postgres unchanged-TOAST columns are omitted from the row object
/// entirely, distinct from a JSON `null` (§4.3).
fn pg_row_to_columns(
    relation: &RelationDescriptor,
    projection: &Projection,
    row: &[PgValue],
) -> Vec<(String, serde_json::Value)> {
    relation
        .columns
        .iter()
        .enumerate()
        .filter(|(i, _)| projection.includes(*i))
        .filter_map(|(i, col)| match row.get(i) {
            Some(PgValue::UnchangedToast) | None => None,
            Some(value) => Some((col.name.clone(), value.to_json())),
        })
        .collect()
}

fn commit_event(txn: String, position: Position, source_label: String) -> CanonicalEvent {
    CanonicalEvent {
        kind: EventKind::Commit,
        txn,
        schema: String::new(),
        table: String::new(),
        primary_key_columns: Vec::new(),
        rows: Vec::new(),
        position,
        source_label,
    }
}

pub fn shape_mysql_event(
    event: MysqlEvent,
    policy: &CapturePolicy,
    position: Position,
) -> Option<CanonicalEvent> {
    let source_label = position.render();
    match event {
        MysqlEvent::Rotate | MysqlEvent::TableMap | MysqlEvent::Begin { .. } | MysqlEvent::Rollback { .. } => None,
        MysqlEvent::Commit { txn } => Some(commit_event(txn, position, source_label)),
        MysqlEvent::Ddl { txn, schema, query } => {
            if !policy.schema_captures_ddl(&schema) {
                return None;
            }
            Some(CanonicalEvent {
                kind: EventKind::Ddl,
                txn,
                schema,
                table: String::new(),
                primary_key_columns: Vec::new(),
                rows: vec![RowImage::Row(vec![("query".to_string(), json!(query))])],
                position,
                source_label,
            })
        }
        MysqlEvent::Insert { txn, relation, rows } => {
            let table_policy = policy.lookup(&relation.schema_name, &relation.table_name)?;
            if !table_policy.capture_dml {
                return None;
            }
            let projection = Projection::build(&relation, table_policy);
            Some(CanonicalEvent {
                kind: EventKind::Insert,
                txn,
                schema: relation.schema_name.clone(),
                table: relation.table_name.clone(),
                primary_key_columns: projection.primary_key_columns.clone(),
                rows: rows
                    .iter()
                    .map(|row| RowImage::Row(mysql_row_to_columns(&relation, &projection, row)))
                    .collect(),
                position,
                source_label,
            })
        }
        MysqlEvent::Delete { txn, relation, rows } => {
            let table_policy = policy.lookup(&relation.schema_name, &relation.table_name)?;
            if !table_policy.capture_dml {
                return None;
            }
            let projection = Projection::build(&relation, table_policy);
            Some(CanonicalEvent {
                kind: EventKind::Delete,
                txn,
                schema: relation.schema_name.clone(),
                table: relation.table_name.clone(),
                primary_key_columns: projection.primary_key_columns.clone(),
                rows: rows
                    .iter()
                    .map(|row| RowImage::Row(mysql_row_to_columns(&relation, &projection, row)))
                    .collect(),
                position,
                source_label,
            })
        }
        MysqlEvent::Update { txn, relation, rows } => {
            let table_policy = policy.lookup(&relation.schema_name, &relation.table_name)?;
            if !table_policy.capture_dml {
                return None;
            }
            let projection = Projection::build(&relation, table_policy);
            Some(CanonicalEvent {
                kind: EventKind::Update,
                txn,
                schema: relation.schema_name.clone(),
                table: relation.table_name.clone(),
                primary_key_columns: projection.primary_key_columns.clone(),
                rows: rows
                    .iter()
                    .map(|(before, after)| RowImage::Change {
                        before: mysql_row_to_columns(&relation, &projection, before),
                        after: mysql_row_to_columns(&relation, &projection, after),
                    })
                    .collect(),
                position,
                source_label,
            })
        }
    }
}

pub fn shape_pg_event(event: PgEvent, policy: &CapturePolicy, position: Position) -> Option<CanonicalEvent> {
    let source_label = position.render();
    match event {
        PgEvent::Begin { .. } => None,
        PgEvent::Commit { txn } => Some(commit_event(txn, position, source_label)),
        PgEvent::Truncate { .. } => None,
        PgEvent::Insert { txn, relation, row } => {
            let table_policy = policy.lookup(&relation.schema_name, &relation.table_name)?;
            if !table_policy.capture_dml {
                return None;
            }
            let projection = Projection::build(&relation, table_policy);
            Some(CanonicalEvent {
                kind: EventKind::Insert,
                txn,
                schema: relation.schema_name.clone(),
                table: relation.table_name.clone(),
                primary_key_columns: projection.primary_key_columns.clone(),
                rows: vec![RowImage::Row(pg_row_to_columns(&relation, &projection, &row))],
                position,
                source_label,
            })
        }
        PgEvent::Delete { txn, relation, row } => {
            let table_policy = policy.lookup(&relation.schema_name, &relation.table_name)?;
            if !table_policy.capture_dml {
                return None;
            }
            let projection = Projection::build(&relation, table_policy);
            Some(CanonicalEvent {
                kind: EventKind::Delete,
                txn,
                schema: relation.schema_name.clone(),
                table: relation.table_name.clone(),
                primary_key_columns: projection.primary_key_columns.clone(),
                rows: vec![RowImage::Row(pg_row_to_columns(&relation, &projection, &row))],
                position,
                source_label,
            })
        }
        PgEvent::Update { txn, relation, old, new } => {
            let table_policy = policy.lookup(&relation.schema_name, &relation.table_name)?;
            if !table_policy.capture_dml {
                return None;
            }
            let projection = Projection::build(&relation, table_policy);
            let after = pg_row_to_columns(&relation, &projection, &new);
            let before = old
                .map(|old| pg_row_to_columns(&relation, &projection, &old))
                .unwrap_or_else(|| after.clone());
            Some(CanonicalEvent {
                kind: EventKind::Update,
                txn,
                schema: relation.schema_name.clone(),
                table: relation.table_name.clone(),
                primary_key_columns: projection.primary_key_columns.clone(),
                rows: vec![RowImage::Change { before, after }],
                position,
                source_label,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_common::config::{CaptureConfig, PrimaryKeySpec, SchemaCapture, TableCapture};
    use cdc_schema::{ColumnDescriptor, ColumnFlags};

    fn policy() -> CapturePolicy {
        CapturePolicy::from_config(&CaptureConfig {
            databases: vec![SchemaCapture {
                name: "testdb".into(),
                capture_dml: true,
                capture_ddl: true,
                tables: vec![TableCapture {
                    name: "users".into(),
                    primary_key: PrimaryKeySpec::Single("id".into()),
                    columns: vec!["*".into()],
                }],
            }],
        })
    }

    fn relation() -> RelationDescriptor {
        RelationDescriptor {
            relation_id: 1,
            schema_name: "testdb".into(),
            table_name: "users".into(),
            columns: vec![
                ColumnDescriptor { name: "id".into(), wire_type: 23, type_meta: -1, flags: ColumnFlags::default() },
                ColumnDescriptor { name: "name".into(), wire_type: 25, type_meta: -1, flags: ColumnFlags::default() },
            ],
            primary_key_columns: vec!["id".into()],
        }
    }

    #[test]
    fn mysql_insert_shapes_into_one_canonical_event() {
        let event = MysqlEvent::Insert {
            txn: "t1".into(),
            relation: relation(),
            rows: vec![vec![Some(CellValue::Integer(7)), Some(CellValue::String("ann".into()))]],
        };
        let out = shape_mysql_event(event, &policy(), Position::Mysql { file_name: "f".into(), offset: 4 }).unwrap();
        let wire = out.to_wire_json();
        assert_eq!(wire["type"], "INSERT");
        assert_eq!(wire["rows"][0]["name"], "ann");
    }

    #[test]
    fn mysql_event_for_uncaptured_table_is_dropped() {
        let mut relation = relation();
        relation.table_name = "orders".into();
        let event = MysqlEvent::Insert { txn: "t1".into(), relation, rows: vec![] };
        assert!(shape_mysql_event(event, &policy(), Position::Mysql { file_name: "f".into(), offset: 4 }).is_none());
    }

    #[test]
    fn pg_delete_with_replica_identity_full_yields_full_row() {
        let event = PgEvent::Delete {
            txn: "t1".into(),
            relation: relation(),
            row: vec![PgValue::Integer(3), PgValue::Text("bob".into())],
        };
        let out = shape_pg_event(event, &policy(), Position::Postgres { lsn: 100 }).unwrap();
        let wire = out.to_wire_json();
        assert_eq!(wire["type"], "DELETE");
        assert_eq!(wire["rows"][0]["id"], 3);
        assert_eq!(wire["rows"][0]["name"], "bob");
    }

    #[test]
    fn pg_update_with_unchanged_toast_omits_column_not_nulls_it() {
        let event = PgEvent::Update {
            txn: "t1".into(),
            relation: relation(),
            old: None,
            new: vec![PgValue::Integer(3), PgValue::UnchangedToast],
        };
        let out = shape_pg_event(event, &policy(), Position::Postgres { lsn: 120 }).unwrap();
        let wire = out.to_wire_json();
        assert!(wire["rows"][0]["after"].get("name").is_none());
    }

    #[test]
    fn ddl_event_respects_schema_capture_flag() {
        let no_ddl_policy = CapturePolicy::from_config(&CaptureConfig {
            databases: vec![SchemaCapture {
                name: "testdb".into(),
                capture_dml: true,
                capture_ddl: false,
                tables: vec![],
            }],
        });
        let event = MysqlEvent::Ddl { txn: "t1".into(), schema: "testdb".into(), query: "ALTER TABLE users ADD x INT".into() };
        assert!(shape_mysql_event(event, &no_ddl_policy, Position::Mysql { file_name: "f".into(), offset: 1 }).is_none());
    }
}
