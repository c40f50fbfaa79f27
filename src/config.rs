//! Bridge configuration, loaded from `extbridge.toml`
//!
//! Every section and field is optional; missing values take their defaults.
//!
//! ```toml
//! extension = "my_game"
//!
//! [log]
//! level = "debug"
//! format = "json"
//!
//! [handles]
//! track = true
//!
//! [docs]
//! path = "addons/my_game/my_game.docs.toml"
//!
//! [signals]
//! thread_prefix = "my-game-signal"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::logging::{file_output, parse_level, Level, LogConfig, LogFormat};

/// File name searched for by [`BridgeConfig::discover`]
pub const CONFIG_FILE: &str = "extbridge.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Extension name; prefixes the default documentation sidecar
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default)]
    pub log: LogSection,

    #[serde(default)]
    pub handles: HandleSection,

    #[serde(default)]
    pub docs: DocsSection,

    /// Force editor mode on or off instead of asking the engine
    #[serde(default)]
    pub editor: Option<bool>,

    #[serde(default)]
    pub signals: SignalSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Rotated log file (`directory/prefix`); stderr when absent
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default = "default_false")]
    pub spans: bool,

    /// Extra filter directives
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleSection {
    /// Detect double release and use after release
    #[serde(default = "default_track")]
    pub track: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sidecar location; `<extension>.docs.toml` when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSection {
    /// Name prefix of forwarder threads
    #[serde(default = "default_thread_prefix")]
    pub thread_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            log: LogSection::default(),
            handles: HandleSection::default(),
            docs: DocsSection::default(),
            editor: None,
            signals: SignalSection::default(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
            spans: false,
            filter: None,
        }
    }
}

impl Default for HandleSection {
    fn default() -> Self {
        Self {
            track: default_track(),
        }
    }
}

impl Default for DocsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Default for SignalSection {
    fn default() -> Self {
        Self {
            thread_prefix: default_thread_prefix(),
        }
    }
}

fn default_extension() -> String {
    "extbridge".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_track() -> bool {
    cfg!(debug_assertions)
}

fn default_thread_prefix() -> String {
    "extbridge-signal".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Search `start` and its ancestors for `extbridge.toml`
    pub fn discover(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Configuration from the environment
    ///
    /// `EXTBRIDGE_CONFIG` names a file to load (errors fall back to defaults);
    /// `EXTBRIDGE_TRACK_HANDLES` and the `EXTBRIDGE_LOG_*` variables override
    /// individual fields.
    pub fn from_env() -> Self {
        let mut config = std::env::var_os("EXTBRIDGE_CONFIG")
            .and_then(|path| Self::load(Path::new(&path)).ok())
            .unwrap_or_default();

        if let Ok(track) = std::env::var("EXTBRIDGE_TRACK_HANDLES") {
            config.handles.track = matches!(track.as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(level) = std::env::var("EXTBRIDGE_LOG_LEVEL") {
            config.log.level = level;
        }
        if let Ok(path) = std::env::var("EXTBRIDGE_LOG_FILE") {
            config.log.file = Some(PathBuf::from(path));
        }
        if std::env::var("EXTBRIDGE_LOG_JSON").is_ok() {
            config.log.format = LogFormat::Json;
        }
        if std::env::var("EXTBRIDGE_LOG_SPANS").is_ok() {
            config.log.spans = true;
        }
        config
    }

    /// Sidecar path, resolved against the extension name
    pub fn docs_path(&self) -> PathBuf {
        self.docs
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.docs.toml", self.extension)))
    }

    /// Logging settings for [`crate::logging::init_logging`]
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::new()
            .with_level(parse_level(&self.log.level).unwrap_or(Level::INFO))
            .with_format(self.log.format)
            .with_span_events(self.log.spans);
        if let Some(path) = &self.log.file {
            config = config.with_output(file_output(path));
        }
        if let Some(filter) = &self.log.filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.extension, "extbridge");
        assert_eq!(config.handles.track, cfg!(debug_assertions));
        assert!(config.docs.enabled);
        assert_eq!(config.editor, None);
        assert_eq!(config.docs_path(), PathBuf::from("extbridge.docs.toml"));
    }

    #[test]
    fn test_parse_partial() {
        let config = BridgeConfig::parse(
            r#"
            extension = "arena"
            editor = true

            [handles]
            track = false

            [signals]
            thread_prefix = "arena-sig"
            "#,
        )
        .unwrap();
        assert_eq!(config.extension, "arena");
        assert_eq!(config.editor, Some(true));
        assert!(!config.handles.track);
        assert_eq!(config.signals.thread_prefix, "arena-sig");
        assert_eq!(config.log.level, "info");
        assert_eq!(config.docs_path(), PathBuf::from("arena.docs.toml"));
    }

    #[test]
    fn test_parse_error() {
        let err = BridgeConfig::parse("handles = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let path = dir.path().join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[log]\nlevel = \"trace\"\nformat = \"json\"").unwrap();

        assert_eq!(BridgeConfig::discover(&nested), Some(path.clone()));

        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log_config().level, Level::TRACE);
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load(Path::new("/nonexistent/extbridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
