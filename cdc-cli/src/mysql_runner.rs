//! MySQL/MariaDB decode loop (§4.1, §4.2): connects the replication and
//! catalog side-channel connections, resolves the starting binlog
//! position, then drives `MysqlBinlogDecoder` until asked to stop.

use cdc_capture::CapturePolicy;
use cdc_checkpoint::{CheckpointManager, SourceKind};
use cdc_common::config::{MysqlReplicationConfig, ServerConfig};
use cdc_common::{CResult, Position, ReError, Shutdown};
use cdc_mysql_binlog::{MysqlBinlogDecoder, MysqlEvent};
use cdc_mysql_proto::dialect::detect_dialect;
use cdc_mysql_proto::MysqlConnection;
use cdc_sink::SinkRegistry;
use tracing::{info, warn};

use crate::catalog::LiveMysqlCatalog;
use crate::shape::shape_mysql_event;

/// Slave hostname reported during `COM_REGISTER_SLAVE`. Purely
/// cosmetic: it shows up in the master's `SHOW SLAVE HOSTS`, nothing
/// here reads it back.
const SLAVE_HOSTNAME: &str = "cdc-cli";

fn starting_position(
    checkpoint: &CheckpointManager,
    cfg: &MysqlReplicationConfig,
) -> CResult<(String, u32)> {
    if let Some(Position::Mysql { file_name, offset }) = checkpoint.load()? {
        return Ok((file_name, offset as u32));
    }
    let file_name = cfg.binlog_file.clone().ok_or_else(|| {
        ReError::Config("no checkpoint and no configured binlog_file to start from".into())
    })?;
    let position = cfg
        .binlog_position
        .ok_or_else(|| ReError::Config("no checkpoint and no configured binlog_position to start from".into()))?;
    Ok((file_name, position as u32))
}

pub fn run(
    server: &ServerConfig,
    cfg: &MysqlReplicationConfig,
    policy: &CapturePolicy,
    registry: &SinkRegistry,
    checkpoint: &CheckpointManager,
    shutdown: &Shutdown,
) -> CResult<()> {
    let (mut replication_conn, handshake) = MysqlConnection::connect(
        &server.host,
        server.port,
        &server.username,
        &server.password,
        server.database.clone(),
    )?;
    let dialect_info = detect_dialect(&mut replication_conn, &handshake)?;
    info!(dialect = ?dialect_info.dialect, checksum = dialect_info.checksum_present, "mysql dialect detected");

    let (mut catalog_conn, _) = MysqlConnection::connect(
        &server.host,
        server.port,
        &server.username,
        &server.password,
        server.database.clone(),
    )?;
    let mut catalog = LiveMysqlCatalog::new(&mut catalog_conn);

    let (file_name, position) = starting_position(checkpoint, cfg)?;
    info!(file = %file_name, position, "starting mysql binlog stream");

    replication_conn.register_slave(cfg.server_id, SLAVE_HOSTNAME)?;
    replication_conn.start_binlog_dump(cfg.server_id, file_name.clone(), position)?;

    let mut decoder = MysqlBinlogDecoder::new(file_name, dialect_info.checksum_present);
    let should_stop = shutdown.as_poll_fn();

    loop {
        let Some(raw_event) = replication_conn.read_event_packet(&should_stop)? else {
            break;
        };
        let Some(outcome) = decoder.decode_event(&raw_event, &mut catalog)? else {
            continue;
        };
        let is_commit = matches!(outcome.event, MysqlEvent::Commit { .. });
        let position = outcome.position.clone();
        if let Some(event) = shape_mysql_event(outcome.event, policy, outcome.position) {
            registry.dispatch(&event);
        }
        if let Err(e) = checkpoint.record(position, is_commit) {
            warn!(error = %e, "failed to record checkpoint");
        }
    }

    checkpoint.flush()?;
    Ok(())
}
