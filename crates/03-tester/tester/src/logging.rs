//! Caller-attributed log forwarding.
//!
//! Tester code logs through [`tester_log!`](crate::tester_log), which records
//! where the call was made and forwards the line to the `log` facade with that
//! location attached instead of the forwarding function's own.

use std::fmt;

use dispatch::{DispatchError, DispatchResult};

/// Target for ordinary tester log lines.
pub const LOG_TARGET: &str = "tester";
/// Target for [`LogLevel::Fatal`] lines; `log` has no fatal level.
pub const FATAL_TARGET: &str = "tester::fatal";

/// Severity accepted by the tester log operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Verbose = 1,
    Debug = 2,
    Info = 3,
    Warn = 4,
    Error = 5,
    Fatal = 6,
}

impl LogLevel {
    pub fn from_i32(raw: i32) -> DispatchResult<Self> {
        Ok(match raw {
            1 => LogLevel::Verbose,
            2 => LogLevel::Debug,
            3 => LogLevel::Info,
            4 => LogLevel::Warn,
            5 => LogLevel::Error,
            6 => LogLevel::Fatal,
            other => {
                return Err(DispatchError::invalid_argument(format!(
                    "unknown log level {other}"
                )))
            }
        })
    }

    pub fn as_log(self) -> log::Level {
        match self {
            LogLevel::Verbose => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error | LogLevel::Fatal => log::Level::Error,
        }
    }

    pub fn target(self) -> &'static str {
        match self {
            LogLevel::Fatal => FATAL_TARGET,
            _ => LOG_TARGET,
        }
    }
}

/// Where a log call was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogSite<'a> {
    pub function: &'a str,
    pub file: &'a str,
    pub line: u32,
}

impl fmt::Display for LogSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.function, self.file, self.line)
    }
}

/// Builds a [`LogSite`] for the invocation point.
#[macro_export]
macro_rules! log_site {
    () => {
        $crate::LogSite {
            function: module_path!(),
            file: file!(),
            line: line!(),
        }
    };
}

/// Logs through a tester environment with the caller's location.
///
/// ```ignore
/// tester_log!(env, LogLevel::Info, "got {} frames", count);
/// ```
#[macro_export]
macro_rules! tester_log {
    ($env:expr, $level:expr, $($arg:tt)+) => {
        $env.log($level, $crate::log_site!(), &format!($($arg)+))
    };
}

/// Forwards one line to the installed logger.
pub fn emit(level: LogLevel, site: LogSite<'_>, message: &str) {
    let lvl = level.as_log();
    if lvl > log::max_level() {
        return;
    }
    let logger = log::logger();
    logger.log(
        &log::Record::builder()
            .args(format_args!("{message}"))
            .level(lvl)
            .target(level.target())
            .module_path(Some(site.function))
            .file(Some(site.file))
            .line(Some(site.line))
            .build(),
    );
}
