//! Process-wide terminal and file logging.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Log level used when `RUST_LOG` is unset or invalid
const DEFAULT_DIRECTIVE: &str = "info";

type OpFileLayer = fmt::Layer<
    Registry,
    fmt::format::DefaultFields,
    fmt::format::Format<fmt::format::Full, fmt::time::ChronoUtc>,
    NonBlocking,
>;

static LOGGING: OnceLock<LoggingGuards> = OnceLock::new();

/// Writer threads behind the global subscriber.
///
/// The guards live in a static and are never dropped on their own,
/// so the process must call [`LoggingGuards::shutdown`] before exiting
/// or the last lines written may never reach the terminal or the op log.
pub struct LoggingGuards {
    terminal: Mutex<Option<WorkerGuard>>,
    op_file: Mutex<Option<WorkerGuard>>,
    op_file_reload: reload::Handle<OpFileLayer, Registry>,
}

impl LoggingGuards {
    /// Redirect file logging to a new op's log file.
    fn switch_op_file(&self, logfile: File) -> Result<(), String> {
        let (writer, guard) = tracing_appender::non_blocking(logfile);

        let mut current = self
            .op_file
            .lock()
            .map_err(|_| "Op log guard lock poisoned".to_string())?;
        self.op_file_reload
            .modify(|layer| *layer = op_file_layer(writer))
            .map_err(|e| format!("Failed to redirect op log: {e}"))?;

        // Dropping the old guard flushes the previous op's file
        *current = Some(guard);
        Ok(())
    }

    /// Flush everything logged so far and stop the writer threads.
    ///
    /// Lines logged afterwards are discarded until the next [`init_logging`].
    pub fn shutdown(&self) {
        for writer in [&self.op_file, &self.terminal] {
            let mut slot = match writer.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            drop(slot.take());
        }
    }
}

fn op_file_layer(writer: NonBlocking) -> OpFileLayer {
    fmt::layer::<Registry>()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(writer)
        .with_ansi(false)
}

fn open_op_log(op_dir: &Path, op_name: &str) -> Result<(PathBuf, File), String> {
    let log_dir = op_dir.join("logs");
    fs::create_dir_all(&log_dir)
        .map_err(|e| format!("Failed to create log directory {log_dir:?}: {e}"))?;
    let log_path = log_dir.join(format!("{op_name}.log"));
    let logfile = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to open op log {log_path:?}: {e}"))?;
    Ok((log_path, logfile))
}

/// Log to the terminal and to `{op_dir}/logs/{op_name}.log`.
///
/// Calling again for a later op keeps the terminal logger
/// and points file logging at the new op's file.
pub fn init_logging(
    op_dir: &Path,
    op_name: &str,
) -> Result<(PathBuf, &'static LoggingGuards), String> {
    let (log_path, logfile) = open_op_log(op_dir, op_name)?;

    if let Some(guards) = LOGGING.get() {
        guards.switch_op_file(logfile)?;
        return Ok((log_path, guards));
    }

    let (terminal_writer, terminal_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file_writer, file_guard) = tracing_appender::non_blocking(logfile);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVE))
        .map_err(|e| format!("Failed to build log filter: {e}"))?;

    let terminal_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(terminal_writer)
        .with_target(false);
    let (file_layer, file_reload) = reload::Layer::new(op_file_layer(file_writer));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(env_filter)
        .with(terminal_layer)
        .try_init()
        .map_err(|e| format!("Failed to install logger: {e}"))?;

    let guards = LOGGING.get_or_init(|| LoggingGuards {
        terminal: Mutex::new(Some(terminal_guard)),
        op_file: Mutex::new(Some(file_guard)),
        op_file_reload: file_reload,
    });
    Ok((log_path, guards))
}

#[cfg(test)]
mod test {
    use super::*;
    use tracing::error;

    #[test]
    fn op_log_lands_under_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _file) = open_op_log(dir.path(), "op").unwrap();
        assert_eq!(path, dir.path().join("logs").join("op.log"));
        assert!(path.exists());
    }

    #[test]
    fn shutdown_flushes_last_error_to_op_log() {
        let dir = tempfile::tempdir().unwrap();
        let (path, guards) = init_logging(dir.path(), "fatal_op").unwrap();

        error!("Run aborted: remote clock unreachable");
        guards.shutdown();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(
            text.contains("Run aborted: remote clock unreachable"),
            "op log was `{text}`"
        );
    }
}
