//! Durable resume-after-restart position tracking (§4.6, §6.4).
//!
//! One `CheckpointManager` per source connection. Only the decode loop
//! ever calls `record`/`flush` — the mutex exists to make that contract
//! enforceable, not because multiple writers are expected.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cdc_common::config::SaveMode;
use cdc_common::position::{format_lsn, parse_lsn};
use cdc_common::{CResult, Position, ReError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Mysql,
    Postgres,
}

struct State {
    last_position: Option<Position>,
    events_since_save: u64,
}

pub struct CheckpointManager {
    path: PathBuf,
    source: SourceKind,
    save_mode: SaveMode,
    save_every_n: u64,
    state: Mutex<State>,
}

impl CheckpointManager {
    pub fn new(
        path: impl Into<PathBuf>,
        source: SourceKind,
        save_mode: SaveMode,
        save_every_n: u64,
    ) -> CheckpointManager {
        CheckpointManager {
            path: path.into(),
            source,
            save_mode,
            save_every_n: save_every_n.max(1),
            state: Mutex::new(State { last_position: None, events_since_save: 0 }),
        }
    }

    /// Reads the last persisted position, or `None` if no checkpoint file
    /// exists yet (a fresh start).
    pub fn load(&self) -> CResult<Option<Position>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => self.parse(&text).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReError::Checkpoint(format!(
                "reading checkpoint {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn parse(&self, text: &str) -> CResult<Position> {
        match self.source {
            SourceKind::Mysql => {
                let mut lines = text.lines();
                let file_name = lines
                    .next()
                    .ok_or_else(|| ReError::Checkpoint("missing file_name line".into()))?
                    .to_string();
                let offset: u64 = lines
                    .next()
                    .ok_or_else(|| ReError::Checkpoint("missing offset line".into()))?
                    .trim()
                    .parse()
                    .map_err(|e| ReError::Checkpoint(format!("invalid offset: {e}")))?;
                Ok(Position::Mysql { file_name, offset })
            }
            SourceKind::Postgres => {
                let lsn_str = text
                    .lines()
                    .next()
                    .ok_or_else(|| ReError::Checkpoint("empty checkpoint file".into()))?
                    .trim();
                let lsn = parse_lsn(lsn_str)
                    .ok_or_else(|| ReError::Checkpoint(format!("invalid lsn: {lsn_str}")))?;
                Ok(Position::Postgres { lsn })
            }
        }
    }

    fn render(&self, position: &Position) -> String {
        match position {
            Position::Mysql { file_name, offset } => format!("{file_name}\n{offset}\n"),
            Position::Postgres { lsn } => format!("{}\n", format_lsn(*lsn)),
        }
    }

    /// Advances the in-memory position and, depending on the configured
    /// save mode, persists it. `is_commit` should be true for COMMIT
    /// events (and DDL events treated as implicit commits).
    pub fn record(&self, position: Position, is_commit: bool) -> CResult<()> {
        let mut state = self.state.lock().unwrap();
        state.last_position = Some(position);
        state.events_since_save += 1;

        let should_write = match self.save_mode {
            SaveMode::EveryEvent => true,
            SaveMode::EveryN => state.events_since_save >= self.save_every_n,
            SaveMode::AtCommit => is_commit,
        };

        if should_write {
            self.write_locked(&state)?;
            state.events_since_save = 0;
        }
        Ok(())
    }

    /// Forces a write of the current in-memory position, regardless of
    /// save mode. Called on clean shutdown.
    pub fn flush(&self) -> CResult<()> {
        let state = self.state.lock().unwrap();
        self.write_locked(&state)
    }

    fn write_locked(&self, state: &State) -> CResult<()> {
        let Some(position) = &state.last_position else {
            return Ok(());
        };
        fs::write(&self.path, self.render(position)).map_err(|e| {
            ReError::Checkpoint(format!("writing checkpoint {}: {e}", self.path.display()))
        })
    }
}

/// Postgres resume clamp (§4.6, IV-5): before `START_REPLICATION`, the
/// requested start LSN must never exceed the slot's
/// `confirmed_flush_lsn` — a local checkpoint that has drifted ahead of
/// the server (slot recreated, checkpoint restored from backup) would
/// otherwise ask the server to replay WAL it has already discarded.
/// Returns `None` when there is no local checkpoint to clamp; the caller
/// falls back to the configured `start_lsn`.
pub fn clamp_postgres_start(local: Option<u64>, server_confirmed_flush_lsn: u64) -> Option<u64> {
    local.map(|l| l.min(server_confirmed_flush_lsn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tmp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("cdc-checkpoint-test-{name}-{}", std::process::id()));
        p
    }

    #[test]
    fn mysql_roundtrip() {
        let path = tmp_path("mysql-roundtrip");
        let _ = fs::remove_file(&path);
        let mgr = CheckpointManager::new(&path, SourceKind::Mysql, SaveMode::EveryEvent, 1);
        assert!(mgr.load().unwrap().is_none());

        mgr.record(Position::Mysql { file_name: "mysql-bin.000003".into(), offset: 512 }, false)
            .unwrap();

        let loaded = mgr.load().unwrap().unwrap();
        assert_eq!(loaded, Position::Mysql { file_name: "mysql-bin.000003".into(), offset: 512 });
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn postgres_roundtrip() {
        let path = tmp_path("pg-roundtrip");
        let _ = fs::remove_file(&path);
        let mgr = CheckpointManager::new(&path, SourceKind::Postgres, SaveMode::EveryEvent, 1);
        mgr.record(Position::Postgres { lsn: 0x1000 }, false).unwrap();
        let loaded = mgr.load().unwrap().unwrap();
        assert_eq!(loaded, Position::Postgres { lsn: 0x1000 });
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn every_n_only_writes_on_threshold() {
        let path = tmp_path("every-n");
        let _ = fs::remove_file(&path);
        let mgr = CheckpointManager::new(&path, SourceKind::Mysql, SaveMode::EveryN, 3);

        mgr.record(Position::Mysql { file_name: "f".into(), offset: 1 }, false).unwrap();
        mgr.record(Position::Mysql { file_name: "f".into(), offset: 2 }, false).unwrap();
        assert!(mgr.load().unwrap().is_none());

        mgr.record(Position::Mysql { file_name: "f".into(), offset: 3 }, false).unwrap();
        assert_eq!(mgr.load().unwrap().unwrap(), Position::Mysql { file_name: "f".into(), offset: 3 });
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn at_commit_ignores_non_commit_events() {
        let path = tmp_path("at-commit");
        let _ = fs::remove_file(&path);
        let mgr = CheckpointManager::new(&path, SourceKind::Mysql, SaveMode::AtCommit, 1);

        mgr.record(Position::Mysql { file_name: "f".into(), offset: 1 }, false).unwrap();
        assert!(mgr.load().unwrap().is_none());

        mgr.record(Position::Mysql { file_name: "f".into(), offset: 2 }, true).unwrap();
        assert_eq!(mgr.load().unwrap().unwrap(), Position::Mysql { file_name: "f".into(), offset: 2 });
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn flush_forces_write_regardless_of_mode() {
        let path = tmp_path("flush");
        let _ = fs::remove_file(&path);
        let mgr = CheckpointManager::new(&path, SourceKind::Mysql, SaveMode::AtCommit, 1);
        mgr.record(Position::Mysql { file_name: "f".into(), offset: 9 }, false).unwrap();
        assert!(mgr.load().unwrap().is_none());
        mgr.flush().unwrap();
        assert_eq!(mgr.load().unwrap().unwrap(), Position::Mysql { file_name: "f".into(), offset: 9 });
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn postgres_resume_clamp_picks_server_when_behind() {
        // S5: local=0/2000, server confirmed_flush_lsn=0/1000 -> start at 0/1000.
        let local = parse_lsn("0/2000").unwrap();
        let server = parse_lsn("0/1000").unwrap();
        let clamped = clamp_postgres_start(Some(local), server).unwrap();
        assert_eq!(format_lsn(clamped), "0/1000");
    }

    #[test]
    fn postgres_resume_clamp_picks_local_when_behind_server() {
        let local = parse_lsn("0/500").unwrap();
        let server = parse_lsn("0/1000").unwrap();
        let clamped = clamp_postgres_start(Some(local), server).unwrap();
        assert_eq!(format_lsn(clamped), "0/500");
    }

    #[test]
    fn postgres_resume_clamp_with_no_local_returns_none() {
        assert_eq!(clamp_postgres_start(None, 0x1000), None);
    }
}
