//! Postgres logical replication decode loop (§4.1, §4.3): resolves and
//! clamps the resume LSN against the slot's `confirmed_flush_lsn`,
//! streams `pgoutput` messages, and answers keepalives with feedback so
//! the slot's WAL retention can advance.

use std::time::Instant;

use cdc_capture::CapturePolicy;
use cdc_checkpoint::{clamp_postgres_start, CheckpointManager};
use cdc_common::config::{PostgresReplicationConfig, ServerConfig};
use cdc_common::position::{format_lsn, parse_lsn};
use cdc_common::time::now_pg_epoch_micros;
use cdc_common::{CResult, Position, ReError, Shutdown};
use cdc_pg_proto::{
    PgConnection, PgConnectionParams, PgEvent, PgLogicalDecoder, ReplicationMessage, ReplicationStream,
    FEEDBACK_INTERVAL,
};
use cdc_sink::SinkRegistry;
use tracing::{info, warn};

use crate::shape::shape_pg_event;

fn confirmed_flush_lsn(conn: &mut PgConnection, slot_name: &str) -> CResult<u64> {
    let sql = format!("SELECT confirmed_flush_lsn FROM pg_replication_slots WHERE slot_name = '{slot_name}'");
    let rows = conn.simple_query(&sql)?;
    let raw = rows
        .first()
        .and_then(|row| row.first())
        .and_then(|cell| cell.as_ref())
        .ok_or_else(|| ReError::Config(format!("replication slot '{slot_name}' not found")))?;
    let text = String::from_utf8_lossy(raw);
    parse_lsn(&text).ok_or_else(|| ReError::Protocol(format!("unparseable confirmed_flush_lsn: {text}")))
}

fn starting_lsn(
    checkpoint: &CheckpointManager,
    cfg: &PostgresReplicationConfig,
    server_confirmed: u64,
) -> CResult<u64> {
    let local = match checkpoint.load()? {
        Some(Position::Postgres { lsn }) => Some(lsn),
        _ => None,
    };
    if let Some(clamped) = clamp_postgres_start(local, server_confirmed) {
        return Ok(clamped);
    }
    match cfg.start_lsn.as_deref() {
        None | Some("current") => Ok(server_confirmed),
        Some(hex) => parse_lsn(hex).ok_or_else(|| ReError::Config(format!("invalid start_lsn: {hex}"))),
    }
}

pub fn run(
    server: &ServerConfig,
    cfg: &PostgresReplicationConfig,
    policy: &CapturePolicy,
    registry: &SinkRegistry,
    checkpoint: &CheckpointManager,
    shutdown: &Shutdown,
) -> CResult<()> {
    let database = server
        .database
        .as_deref()
        .ok_or_else(|| ReError::Config("postgres_server.database is required for logical replication".into()))?;

    let params = PgConnectionParams {
        host: &server.host,
        port: server.port,
        user: &server.username,
        password: Some(server.password.as_str()),
        database,
        replication: true,
    };
    let mut conn = PgConnection::connect(&params)?;

    let server_confirmed = confirmed_flush_lsn(&mut conn, &cfg.slot_name)?;
    let start_lsn = starting_lsn(checkpoint, cfg, server_confirmed)?;
    info!(slot = %cfg.slot_name, start_lsn = %format_lsn(start_lsn), "starting postgres replication stream");

    let stream = conn.start_replication(&cfg.slot_name, &format_lsn(start_lsn), &cfg.publication_name)?;
    let mut replication = ReplicationStream::new(stream);
    let mut decoder = PgLogicalDecoder::new();
    let should_stop = shutdown.as_poll_fn();

    let mut last_lsn = start_lsn;
    let mut last_feedback = Instant::now();

    loop {
        if should_stop() {
            break;
        }
        let Some(message) = replication.next_message(&should_stop)? else {
            break;
        };
        match message {
            ReplicationMessage::XLogData { wal_end, data, .. } => {
                last_lsn = wal_end;
                if let Some(outcome) = decoder.decode_message(&data, wal_end)? {
                    let position = outcome.position.clone();
                    let is_commit = matches!(outcome.event, PgEvent::Commit { .. });
                    if let Some(event) = shape_pg_event(outcome.event, policy, outcome.position) {
                        registry.dispatch(&event);
                    }
                    if let Err(e) = checkpoint.record(position, is_commit) {
                        warn!(error = %e, "failed to record checkpoint");
                    }
                }
            }
            ReplicationMessage::PrimaryKeepalive { wal_end, reply_requested } => {
                last_lsn = wal_end;
                if reply_requested || last_feedback.elapsed() >= FEEDBACK_INTERVAL {
                    replication.send_feedback(last_lsn, now_pg_epoch_micros())?;
                    last_feedback = Instant::now();
                }
            }
        }
    }

    // Final feedback lets the slot's confirmed_flush_lsn advance past
    // everything dispatched so far, so a clean shutdown doesn't leave
    // WAL behind for the next connection to re-stream.
    if let Err(e) = replication.send_feedback(last_lsn, now_pg_epoch_micros()) {
        warn!(error = %e, "failed to send final feedback before shutdown");
    }
    checkpoint.flush()?;
    Ok(())
}
