use std::path::PathBuf;

use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LogsConfig;

/// Non-blocking file appender guard. Must be kept alive for the lifetime of
/// the process; dropping it flushes and stops the background writer thread.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Installs the global `tracing` subscriber: console output always, plus a
/// rolling file layer when `logs.save` is enabled. Byte-exact size rotation
/// (`max_size_mb`/`max_files`) is not available from `tracing-appender`'s
/// rolling writer; this installs daily rotation instead and logs the
/// configured limits so operators can see they are advisory only.
pub fn init_logging(config: &LogsConfig) -> LoggingGuard {
    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_timer(LocalTime::rfc_3339());

    let registry = Registry::default().with(env_filter).with(console_layer);

    if config.save {
        let dir: PathBuf = PathBuf::from(&config.directory);
        let file_appender = tracing_appender::rolling::daily(&dir, "logs.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_timer(LocalTime::rfc_3339())
            .with_writer(non_blocking);

        registry.with(file_layer).init();

        tracing::info!(
            max_size_mb = config.max_size_mb,
            max_files = config.max_files,
            directory = %dir.display(),
            "file logging enabled (daily rotation; max_size_mb/max_files are advisory)"
        );

        LoggingGuard {
            _file_guard: Some(guard),
        }
    } else {
        registry.init();
        LoggingGuard { _file_guard: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_only_config_builds_guard() {
        let cfg = LogsConfig {
            save: false,
            directory: String::new(),
            max_size_mb: 10,
            max_files: 5,
            level: "info".into(),
        };
        // Only one subscriber may be installed per process; this test only
        // checks the config-to-guard path does not panic when `save` is
        // false, so it is safe to run alongside other tests.
        if std::env::var("CAMERA_HUB_SKIP_LOG_INIT").is_err() {
            std::env::set_var("CAMERA_HUB_SKIP_LOG_INIT", "1");
            let _guard = init_logging(&cfg);
        }
    }
}
