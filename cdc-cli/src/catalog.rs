//! Adapts a live `MysqlConnection` to `cdc_mysql_binlog::ColumnCatalog`
//! (§3, §4.4): column names, primary key columns and enum/set labels,
//! fetched lazily the first time a relation is seen or invalidated.
//! Kept out of `cdc-mysql-binlog` itself so that crate never depends on
//! `cdc-mysql-proto`.

use cdc_common::CResult;
use cdc_mysql_binlog::ColumnCatalog;
use cdc_mysql_proto::dialect::parse_enum_labels;
use cdc_mysql_proto::MysqlConnection;

pub struct LiveMysqlCatalog<'a> {
    conn: &'a mut MysqlConnection,
}

impl<'a> LiveMysqlCatalog<'a> {
    pub fn new(conn: &'a mut MysqlConnection) -> LiveMysqlCatalog<'a> {
        LiveMysqlCatalog { conn }
    }
}

impl<'a> ColumnCatalog for LiveMysqlCatalog<'a> {
    fn fetch_column_names(&mut self, schema: &str, table: &str) -> CResult<Vec<String>> {
        self.conn.fetch_column_names(schema, table)
    }

    /// `SHOW KEYS ... WHERE Key_name = 'PRIMARY'` gives key columns in
    /// `Seq_in_index` order via the text resultset's `Column_name` field
    /// (index 4).
    fn fetch_primary_key_columns(&mut self, schema: &str, table: &str) -> CResult<Vec<String>> {
        let sql = format!("SHOW KEYS FROM `{schema}`.`{table}` WHERE Key_name = 'PRIMARY'");
        let rows = self.conn.text_query(&sql)?;
        Ok(rows.iter().filter_map(|row| row.get(4).map(str::to_string)).collect())
    }

    /// `SHOW COLUMNS ... LIKE 'col'` reports the full `enum(...)`/`set(...)`
    /// type string in its `Type` field (index 1).
    fn fetch_enum_labels(&mut self, schema: &str, table: &str, column: &str) -> CResult<Vec<String>> {
        let sql = format!("SHOW COLUMNS FROM `{schema}`.`{table}` LIKE '{column}'");
        let rows = self.conn.text_query(&sql)?;
        Ok(rows
            .first()
            .and_then(|row| row.get(1))
            .map(parse_enum_labels)
            .unwrap_or_default())
    }
}
