//! Entry point (§6.1): loads configuration, wires up capture policy,
//! checkpointing and sinks, and runs whichever replication source the
//! config selects until asked to stop.

mod catalog;
mod cli;
mod mysql_runner;
mod pg_runner;
mod shape;

use std::process::ExitCode;

use clap::Parser;
use cdc_capture::CapturePolicy;
use cdc_checkpoint::{CheckpointManager, SourceKind};
use cdc_common::config::{CdcConfig, ReplicationConfig};
use cdc_common::log::init_logging;
use cdc_common::{CResult, ReError, Shutdown};
use cdc_sink::SinkRegistry;
use cli::CliArgs;
use tracing::{error, info};

fn run(args: CliArgs) -> CResult<()> {
    let mut config = CdcConfig::load(&args.config)?;
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging);

    let shutdown = Shutdown::new();
    let handler_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("shutdown requested");
        handler_shutdown.request();
    })
    .map_err(|e| ReError::Bug(format!("installing signal handler: {e}")))?;

    let policy = CapturePolicy::from_config(&config.capture);
    let registry = SinkRegistry::load(&config.publishers);

    let result = match &config.replication {
        ReplicationConfig::Mysql(cfg) => {
            let server = config
                .master_server
                .as_ref()
                .ok_or_else(|| ReError::Config("master_server is required for mysql replication".into()))?;
            let checkpoint =
                CheckpointManager::new(&cfg.checkpoint_file, SourceKind::Mysql, cfg.save_last_position, cfg.save_position_event_count);
            mysql_runner::run(server, cfg, &policy, &registry, &checkpoint, &shutdown)
        }
        ReplicationConfig::Postgres(cfg) => {
            let server = config
                .postgres_server
                .as_ref()
                .ok_or_else(|| ReError::Config("postgres_server is required for postgres replication".into()))?;
            let checkpoint = CheckpointManager::new(
                &cfg.checkpoint_file,
                SourceKind::Postgres,
                cfg.save_last_position,
                cfg.save_position_event_count,
            );
            pg_runner::run(server, cfg, &policy, &registry, &checkpoint, &shutdown)
        }
    };

    registry.shutdown();
    result
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "cdc-cli exiting");
            ExitCode::FAILURE
        }
    }
}
