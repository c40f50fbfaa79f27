//! Logging infrastructure - structured tracing across the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Per-target filtering (`ffi`, `handles`, `classdb`, `scene`, `signals`)
//! - Zero cost when disabled
//! - Console output, or daily-rotated files through `tracing-appender`
//!
//! Initialization is idempotent: the first call installs the subscriber and
//! later calls are ignored, so both the C entry point and tests may call it.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn, Level};

use crate::engine::ObjectPtr;
use crate::handle::HandleKind;

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with timestamps
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
    /// JSON lines
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// File with daily rotation
    File { directory: String, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events
    pub span_events: bool,
    /// Extra filter directives (e.g. "extbridge::handle=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: if cfg!(debug_assertions) {
                Level::DEBUG
            } else {
                Level::INFO
            },
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // EXTBRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("EXTBRIDGE_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // EXTBRIDGE_LOG_FILE: directory/prefix of the rotated log file
        if let Ok(path) = std::env::var("EXTBRIDGE_LOG_FILE") {
            config.output = file_output(Path::new(&path));
        }

        if std::env::var("EXTBRIDGE_LOG_JSON").is_ok() {
            config.format = LogFormat::Json;
        }

        config.span_events = std::env::var("EXTBRIDGE_LOG_SPANS").is_ok();

        config
    }
}

/// Parse a textual level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Split a log file path into the rolling appender's directory and prefix
pub fn file_output(path: &Path) -> LogOutput {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let prefix = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extbridge.log".to_string());
    LogOutput::File { directory, prefix }
}

/// Initialize the global logging system
///
/// Returns a `WorkerGuard` that must be kept alive for as long as logs should
/// be flushed. Returns `None` when logging was already initialized.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(&config);
        let spans = span_events_config(config.span_events);

        let (writer, worker) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File { directory, prefix } => {
                tracing_appender::non_blocking(rolling::daily(directory, prefix))
            }
        };

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(writer)
                .pretty()
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .with_writer(writer)
                .compact()
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_writer(writer)
                .json()
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
        };

        // Another subscriber (e.g. a test harness) may already be installed.
        if tracing_subscriber::registry().with(layer).try_init().is_ok() {
            guard = Some(worker);
        }
    });
    guard
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!(
            "extbridge={}",
            config.level.as_str().to_lowercase()
        )));

    match &config.filter {
        Some(directives) => directives
            .split(',')
            .filter(|d| !d.trim().is_empty())
            .fold(base, |filter, directive| match directive.trim().parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log an outbound bound-method call
#[inline]
pub fn log_ffi_call(class: &str, method: &str, args_count: usize) {
    trace!(target: "ffi", class, method, args_count, "ptrcall");
}

/// Log a missing method bind
#[inline]
pub fn log_missing_bind(class: &str, method: &str) {
    error!(target: "ffi", class, method, "engine has no method bind");
}

/// Log handle ownership being taken
#[inline]
pub fn log_handle_pin(kind: HandleKind, raw: usize) {
    trace!(target: "handles", kind = ?kind, raw = format_args!("{raw:#x}"), "pinned");
}

/// Log a handle release
#[inline]
pub fn log_handle_release(kind: HandleKind, raw: usize) {
    trace!(target: "handles", kind = ?kind, raw = format_args!("{raw:#x}"), "released");
}

/// Log a class registration
pub fn log_class_registered(name: &str, parent: &str, tool: bool) {
    info!(target: "classdb", class = name, parent, tool, "class registered");
}

/// Log a class unregistration
pub fn log_class_unregistered(name: &str) {
    debug!(target: "classdb", class = name, "class unregistered");
}

/// Log an instance construction
#[inline]
pub fn log_instance_created(class: &str, object: ObjectPtr) {
    debug!(target: "classdb", class, object = %object, "instance created");
}

/// Log an instance free
#[inline]
pub fn log_instance_freed(class: &str, object: ObjectPtr) {
    debug!(target: "classdb", class, object = %object, "instance freed");
}

/// Log a child binding decision
#[inline]
pub fn log_child_bound(parent: ObjectPtr, name: &str, created: bool) {
    debug!(target: "scene", parent = %parent, child = name, created, "child bound");
}

/// Log a signal forwarder lifecycle event
#[inline]
pub fn log_forwarder(object: ObjectPtr, signal: &str, event: &'static str) {
    debug!(target: "signals", object = %object, signal, event, "forwarder");
}
