//! Logging setup and namespaced loggers.
//!
//! Everything goes through `tracing`. A [`Logger`] additionally records each
//! entry into a shared [`LogBuffer`] so recent activity can be included in a
//! diagnostics report without scraping the subscriber output.

use crate::error::{DiagnosticsError, DiagnosticsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use statebridge_types::Timestamp;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
    /// Include the event target in each line.
    pub with_target: bool,
    /// Colorize output.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_target: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Shorthand for a debug-level configuration.
    pub fn verbose() -> Self {
        Self {
            filter: "debug".to_string(),
            ..Self::default()
        }
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` overrides `config.filter`.
pub fn init_logging(config: &LogConfig) -> DiagnosticsResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| DiagnosticsError::InvalidFilter(e.to_string()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .compact()
        .try_init()
        .map_err(|e| DiagnosticsError::AlreadyInitialized(e.to_string()))
}

/// Severity of a buffered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One buffered log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub namespace: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Map<String, Value>>,
}

/// Bounded, shared buffer of recent log entries.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl LogBuffer {
    /// A buffer keeping the newest `capacity` entries. Zero disables it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    fn push(&self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Oldest-first copy of the buffered entries.
    pub fn recent(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Buffered entries at or above `level`.
    pub fn at_least(&self, level: LogLevel) -> Vec<LogEntry> {
        self.recent()
            .into_iter()
            .filter(|e| e.level >= level)
            .collect()
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every buffered entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(200)
    }
}

/// A logger scoped to one namespace, e.g. `"bridge:sessions"`.
#[derive(Debug, Clone)]
pub struct Logger {
    namespace: Arc<str>,
    buffer: LogBuffer,
}

impl Logger {
    /// A logger recording into `buffer`.
    #[must_use]
    pub fn new(namespace: &str, buffer: LogBuffer) -> Self {
        Self {
            namespace: Arc::from(namespace),
            buffer,
        }
    }

    /// A logger for `"<namespace>:<name>"` sharing this logger's buffer.
    pub fn child(&self, name: &str) -> Self {
        Self::new(&format!("{}:{}", self.namespace, name), self.buffer.clone())
    }

    /// The namespace stamped on every entry.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The shared buffer.
    #[must_use]
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None);
    }

    /// Logs at error level.
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, None);
    }

    /// Logs with structured fields.
    pub fn log(&self, level: LogLevel, message: &str, fields: Option<Map<String, Value>>) {
        let ns = &*self.namespace;
        let rendered = fields
            .as_ref()
            .map(|f| serde_json::Value::Object(f.clone()).to_string());
        match (rendered.as_deref(), level) {
            (None, LogLevel::Debug) => debug!(namespace = ns, "{message}"),
            (None, LogLevel::Info) => info!(namespace = ns, "{message}"),
            (None, LogLevel::Warn) => warn!(namespace = ns, "{message}"),
            (None, LogLevel::Error) => error!(namespace = ns, "{message}"),
            (Some(f), LogLevel::Debug) => debug!(namespace = ns, fields = f, "{message}"),
            (Some(f), LogLevel::Info) => info!(namespace = ns, fields = f, "{message}"),
            (Some(f), LogLevel::Warn) => warn!(namespace = ns, fields = f, "{message}"),
            (Some(f), LogLevel::Error) => error!(namespace = ns, fields = f, "{message}"),
        }
        self.buffer.push(LogEntry {
            timestamp: Timestamp::now(),
            level,
            namespace: ns.to_string(),
            message: message.to_string(),
            fields,
        });
    }
}
