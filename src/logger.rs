//! Logging handle injected into every component.
//!
//! Components never reach for a process-wide logger on their own. Each one is
//! handed a [`Logger`] when it is constructed; the handle forwards records to
//! a [`log::Log`] sink, which is the installed `log` backend by default.

use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

/// Cloneable logging capability carrying a target name and a sink.
#[derive(Clone)]
pub struct Logger {
    target: String,
    sink: Arc<dyn Log>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("target", &self.target)
            .finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::global("webrtc_roap")
    }
}

impl Logger {
    /// new creates a logger writing to the given sink.
    pub fn new(target: impl Into<String>, sink: Arc<dyn Log>) -> Self {
        Logger {
            target: target.into(),
            sink,
        }
    }

    /// global creates a logger forwarding to the backend installed for the
    /// `log` facade.
    pub fn global(target: impl Into<String>) -> Self {
        Logger::new(target, Arc::new(GlobalLog))
    }

    /// silent creates a logger that drops every record.
    pub fn silent() -> Self {
        Logger::new("", Arc::new(SilentLog))
    }

    /// with_target returns a logger sharing the same sink under a sub-target.
    pub fn with_target(&self, target: &str) -> Self {
        let target = if self.target.is_empty() {
            target.to_owned()
        } else {
            format!("{}::{}", self.target, target)
        };
        Logger {
            target,
            sink: Arc::clone(&self.sink),
        }
    }

    pub fn target(&self) -> &str {
        self.target.as_str()
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(self.target.as_str())
            .build();
        if self.sink.enabled(record.metadata()) {
            self.sink.log(&record);
        }
    }
}

struct GlobalLog;

impl Log for GlobalLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

struct SilentLog;

impl Log for SilentLog {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        false
    }

    fn log(&self, _record: &Record<'_>) {}

    fn flush(&self) {}
}

macro_rules! log_trace {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Trace, format_args!($($arg)+))
    };
}

macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Debug, format_args!($($arg)+))
    };
}

macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Info, format_args!($($arg)+))
    };
}

macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Warn, format_args!($($arg)+))
    };
}

macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log(::log::Level::Error, format_args!($($arg)+))
    };
}
