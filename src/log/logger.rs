use crate::{
    config::Config,
    log::{log_level::LogLevel, log_msg::LogMsg, logger_handle::LoggerHandle},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError, TrySendError},
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Flush to disk every 100 lines if debugging/tracing (to see crashes near real-time).
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

/// Flush to disk every 1000 lines in production/default (to save I/O & CPU).
#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

/// An idle worker flushes after this long without new lines.
const IDLE_FLUSH: Duration = Duration::from_millis(500);

/// Bounded, non-blocking logger that writes to a per-process log file.
///
/// # Architecture
///
/// 1. **Producers**: relay threads call `LogSink::log` on a [`LoggerHandle`].
/// 2. **Queue**: a bounded `mpsc` channel buffers messages; overflow is dropped.
/// 3. **Consumer**: a dedicated thread appends to the file, flushing in batches
///    and whenever the queue goes idle.
/// 4. **Console mirror**: lines at or above `console_level` are also written to
///    stderr so operators see problems without tailing the file.
pub struct Logger {
    handle: LoggerHandle,
    worker: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Starts the relay's logger from the `[Logging]` section
    /// (`server_log_path`, `server_log_filename`).
    #[must_use]
    pub fn start_server(cap: usize, config: &Config) -> Self {
        let app_name = config.get_non_empty("Logging", "server_log_filename");

        match config.get_non_empty("Logging", "server_log_path") {
            Some(dir_str) => {
                Self::start_in_dir(expand_path(dir_str), app_name, cap, LogLevel::Warn)
            }
            None => Self::start_default(app_name, cap),
        }
    }

    /// Creates a `logs/` directory next to the executable and starts the logger there.
    ///
    /// # Example Filename
    /// `target/debug/logs/relay_server-1761000000-pid1234.log`
    #[must_use]
    pub fn start_default(app_name: Option<&str>, cap: usize) -> Self {
        let base = exe_dir_fallback_cwd().join("logs");
        Self::start_in_dir(base, app_name, cap, LogLevel::Warn)
    }

    /// Starts the logger in a specific directory, creating it if missing.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory where the log file will be created.
    /// * `app_name` - Optional prefix for the log filename.
    /// * `cap` - Capacity of the log channel (backpressure buffer).
    /// * `console_level` - Minimum level mirrored to stderr.
    pub fn start_in_dir<D: AsRef<Path>>(
        dir: D,
        app_name: Option<&str>,
        cap: usize,
        console_level: LogLevel,
    ) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let pid = std::process::id();
        let fname = match app_name {
            Some(name) => format!("{name}-{secs}-pid{pid}.log"),
            None => format!("{secs}-pid{pid}.log"),
        };
        let file_path = dir.join(&fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let handle = LoggerHandle { tx };
        let file_path_clone = file_path.clone();

        let worker = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || {
                // Try target file -> temp file -> sink (never panic).
                let writer: Box<dyn Write + Send> = if let Ok(f) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file_path_clone)
                {
                    Box::new(f)
                } else {
                    let fallback = std::env::temp_dir().join("callrelay-fallback.log");
                    match OpenOptions::new().create(true).append(true).open(&fallback) {
                        Ok(f) => Box::new(f),
                        Err(_) => Box::new(io::sink()),
                    }
                };

                let mut out = BufWriter::new(writer);
                let mut lines_written: u32 = 0;

                loop {
                    match rx.recv_timeout(IDLE_FLUSH) {
                        Ok(m) => {
                            let line = m.render();
                            let _ = writeln!(&mut out, "{line}");
                            if m.level >= console_level {
                                eprintln!("{line}");
                            }
                            lines_written = lines_written.wrapping_add(1);
                            if lines_written % FLUSH_BATCH_SIZE == 0 {
                                let _ = out.flush();
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let _ = out.flush();
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                let _ = out.flush();
            })
            .ok();

        Self {
            handle,
            worker,
            file_path,
        }
    }

    /// Attempts to enqueue a log message without blocking.
    ///
    /// # Errors
    /// Returns [`TrySendError`] if the queue is full or the worker is gone; the
    /// message is dropped in both cases.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.handle.try_log(level, text, target)
    }

    /// Returns a cloneable handle to the logger sink.
    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Path of the active log file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Stops the worker once every queued line is written and flushed.
    ///
    /// The worker only exits when all [`LoggerHandle`] clones are gone, so
    /// drop the handles given out by [`Logger::handle`] first or this blocks.
    pub fn shutdown(mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        drop(self.handle);
        let _ = worker.join();
    }
}

/// Directory of the executable, or the current working directory on error.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Expands a leading `~` to the user's home directory.
fn expand_path(path_str: &str) -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from);

    match (path_str, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") || p.starts_with("~\\") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}
