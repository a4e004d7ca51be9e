use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CResult, ReError};

/// Root of the JSON configuration document (see spec §6.2).
#[derive(Debug, Clone, Deserialize)]
pub struct CdcConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub master_server: Option<ServerConfig>,
    pub postgres_server: Option<ServerConfig>,
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub publishers: Vec<PublisherEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
    pub log_file: Option<String>,
    #[serde(default = "default_max_files")]
    pub max_files: u32,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_files() -> u32 {
    10
}
fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
            stdout: true,
            log_file: None,
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
}

/// Tagged on the source dialect the pipeline should speak.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplicationConfig {
    Mysql(MysqlReplicationConfig),
    Postgres(PostgresReplicationConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MysqlReplicationConfig {
    pub server_id: u32,
    pub binlog_file: Option<String>,
    pub binlog_position: Option<u64>,
    #[serde(default)]
    pub save_last_position: SaveMode,
    #[serde(default = "default_save_event_count")]
    pub save_position_event_count: u64,
    pub checkpoint_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresReplicationConfig {
    pub slot_name: String,
    pub publication_name: String,
    /// `"current"` or a `"HI/LO"` hex LSN.
    pub start_lsn: Option<String>,
    #[serde(default)]
    pub save_last_position: SaveMode,
    #[serde(default = "default_save_event_count")]
    pub save_position_event_count: u64,
    pub checkpoint_file: String,
}

fn default_save_event_count() -> u64 {
    1
}

/// When the checkpoint manager persists the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Persist after every event.
    EveryEvent,
    /// Persist every N events (see `save_position_event_count`).
    #[default]
    EveryN,
    /// Persist only at transaction commit boundaries.
    AtCommit,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub databases: Vec<SchemaCapture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaCapture {
    pub name: String,
    #[serde(default = "default_true")]
    pub capture_dml: bool,
    #[serde(default)]
    pub capture_ddl: bool,
    #[serde(default)]
    pub tables: Vec<TableCapture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableCapture {
    pub name: String,
    /// Either a single column name or an ordered list (composite key).
    #[serde(default)]
    pub primary_key: PrimaryKeySpec,
    /// `["*"]` for all columns, or an explicit ordered allow-list.
    #[serde(default = "default_all_columns")]
    pub columns: Vec<String>,
}

fn default_all_columns() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeySpec {
    #[default]
    None,
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKeySpec {
    pub fn as_columns(&self) -> Vec<String> {
        match self {
            PrimaryKeySpec::None => vec![],
            PrimaryKeySpec::Single(s) => vec![s.clone()],
            PrimaryKeySpec::Composite(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherEntry {
    pub plugin: PluginConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default)]
    pub library_path: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    #[serde(default)]
    pub publish_schemas: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

fn default_max_queue_depth() -> usize {
    1024
}

impl CdcConfig {
    pub fn load(path: &Path) -> CResult<CdcConfig> {
        let text = fs::read_to_string(path)
            .map_err(|e| ReError::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| ReError::Config(format!("parsing config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mysql_config() {
        let json = r#"{
            "master_server": {"host": "db", "port": 3306, "username": "root", "password": "x"},
            "replication": {"server_id": 1, "checkpoint_file": "/tmp/cp", "save_last_position": "every_event"},
            "capture": {"databases": [{"name": "testdb", "capture_dml": true, "tables": [
                {"name": "users", "primary_key": "id", "columns": ["*"]}
            ]}]},
            "publishers": [{"plugin": {"name": "null", "active": true, "config": {}}}]
        }"#;
        let cfg: CdcConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.publishers.len(), 1);
        match cfg.replication {
            ReplicationConfig::Mysql(m) => assert_eq!(m.server_id, 1),
            _ => panic!("expected mysql replication config"),
        }
    }

    #[test]
    fn primary_key_accepts_single_or_composite() {
        let single: PrimaryKeySpec = serde_json::from_str(r#""id""#).unwrap();
        assert_eq!(single.as_columns(), vec!["id".to_string()]);

        let composite: PrimaryKeySpec = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(composite.as_columns(), vec!["a".to_string(), "b".to_string()]);
    }
}
