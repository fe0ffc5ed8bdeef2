//! Leveled logging shared by the Space, Computers and clients.
//!
//! Log levels:
//! - ERROR: Collaborator failures and broken invariants
//! - WARN: Evicted workers, lost links, requeued tasks
//! - INFO: Startup, registration, final results, shutdown
//! - DEBUG: Dispatch, merge and shared-value traces
//! - TRACE: Every message routed through the Space
//!
//! Lines go to stderr, tagged with the process role. When a role is given to
//! [`init_with_debug`] they are also appended to `~/.forkspace/<role>.log`.
//!
//! `--debug` or `FORKSPACE_DEBUG=1` raise the level to DEBUG;
//! `FORKSPACE_LOG=<level>` selects any level explicitly and wins over both.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::error::Error;

struct Sink {
    role: String,
    file: Option<PathBuf>,
}

static SINK: OnceLock<Sink> = OnceLock::new();
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(Error::Validation(format!("unknown log level '{}'", other))),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Level implied by the flag and the environment.
fn resolve_level(debug: bool, explicit: Option<&str>) -> LogLevel {
    if let Some(level) = explicit.and_then(|s| s.parse().ok()) {
        return level;
    }
    if debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Initialize stderr-only logging.
pub fn init() {
    init_with_debug(None, false);
}

/// Initialize logging for one process.
///
/// `role` ("space", "computer", "client") tags every line and names the log
/// file. Only the first call installs the sink; later calls only adjust
/// the level.
pub fn init_with_debug(role: Option<&str>, debug: bool) {
    let explicit = std::env::var("FORKSPACE_LOG").ok();
    set_level(resolve_level(
        debug || env_flag("FORKSPACE_DEBUG"),
        explicit.as_deref(),
    ));

    let file = role.and_then(|role| {
        let dir = dirs::home_dir()?.join(".forkspace");
        std::fs::create_dir_all(&dir).ok()?;
        let path = dir.join(format!("{}.log", role));
        // Truncated per run
        std::fs::write(&path, "").ok()?;
        Some(path)
    });
    let _ = SINK.set(Sink {
        role: role.unwrap_or("forkspace").to_string(),
        file,
    });
}

pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}

pub fn is_debug() -> bool {
    enabled(LogLevel::Debug)
}

/// Whether a line at `level` would be written.
pub fn enabled(level: LogLevel) -> bool {
    level <= get_level()
}

fn format_line(role: &str, level: LogLevel, msg: &str) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    format!("[{}] [{}] [{}] {}", timestamp, role, level, msg)
}

/// Write one line at `level`. Prefer the `flog*!` macros.
pub fn write(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }
    let role = SINK.get().map_or("forkspace", |sink| sink.role.as_str());
    let line = format_line(role, level, msg);
    eprintln!("{}", line);

    if let Some(path) = SINK.get().and_then(|sink| sink.file.as_ref()) {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// INFO line.
#[macro_export]
macro_rules! flog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! flog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! flog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

/// DEBUG line; the message is only formatted when the level allows it.
#[macro_export]
macro_rules! flog_debug {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Debug) {
            $crate::log::write($crate::log::LogLevel::Debug, &format!($($arg)*))
        }
    };
}

#[macro_export]
macro_rules! flog_trace {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Trace) {
            $crate::log::write($crate::log::LogLevel::Trace, &format!($($arg)*))
        }
    };
}
