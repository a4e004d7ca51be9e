use std::sync::Once;

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Initializes the global `tracing` subscriber from the `logging` config
/// section. Safe to call more than once; only the first call takes effect.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_new(&config.level)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let builder = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_thread_names(true);

        match &config.log_file {
            Some(path) => {
                let directory = std::path::Path::new(path)
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| std::path::PathBuf::from("."));
                let file_name = std::path::Path::new(path)
                    .file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_else(|| "cdc.log".to_string());
                let appender = tracing_appender::rolling::Builder::new()
                    .rotation(tracing_appender::rolling::Rotation::DAILY)
                    .filename_prefix(file_name)
                    .max_log_files(config.max_files as usize)
                    .build(directory)
                    .unwrap_or_else(|_| tracing_appender::rolling::never(".", "cdc.log"));
                if config.stdout {
                    builder.with_writer(std::io::stdout.and(appender)).init();
                } else {
                    builder.with_writer(appender).init();
                }
            }
            None => {
                builder.init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let cfg = LoggingConfig::default();
        init_logging(&cfg);
        init_logging(&cfg);
    }
}
