//! Logging for Alibaba Cloud KMS master keys
//!
//! Each master key carries its own [`Logger`], handed in when the key is built.
//! There is no process-wide logger in this crate: the default [`LogFacade`]
//! forwards to the `log` crate and leaves subscriber setup to the host.

use std::fmt;
use std::sync::Mutex;

pub use ::log::Level;

/// Target used for records forwarded to the `log` crate
pub const LOG_TARGET: &str = "ALIYUNKMS";

/// Logger interface used by master keys and client factories
pub trait Logger: Send + Sync + fmt::Debug {
    /// Log a formatted message about the key identified by `arn`
    fn log(&self, level: Level, arn: &str, args: fmt::Arguments<'_>);

    /// Log at debug level
    fn debugf(&self, arn: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, arn, args);
    }

    /// Log at info level
    fn infof(&self, arn: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Info, arn, args);
    }
}

/// A no-op logger that does nothing
#[derive(Debug, Default)]
pub struct NoopLogger;

impl NoopLogger {
    /// Create a new no-op logger
    pub fn new() -> Self {
        Self
    }
}

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _arn: &str, _args: fmt::Arguments<'_>) {}
}

/// Forwards records to the `log` facade under the `ALIYUNKMS` target
#[derive(Debug, Default)]
pub struct LogFacade;

impl LogFacade {
    /// Create a new facade logger
    pub fn new() -> Self {
        Self
    }
}

impl Logger for LogFacade {
    fn log(&self, level: Level, arn: &str, args: fmt::Arguments<'_>) {
        if arn.is_empty() {
            ::log::log!(target: LOG_TARGET, level, "{}", args);
        } else {
            ::log::log!(target: LOG_TARGET, level, "arn={} {}", arn, args);
        }
    }
}

/// A captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub arn: String,
    pub message: String,
}

/// Keeps every record in memory, for tests that assert on what was logged
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    /// Create an empty memory logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything logged so far
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns true if any record for `arn` contains `needle`
    pub fn contains(&self, arn: &str, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.arn == arn && r.message.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, arn: &str, args: fmt::Arguments<'_>) {
        let record = LogRecord {
            level,
            arn: arn.to_string(),
            message: args.to_string(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
