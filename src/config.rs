//! Configuration management for sterm.
//!
//! Settings come from TOML files layered in priority order, then from the
//! command line:
//!
//! 1. `/etc/sterm.toml`
//! 2. `~/.sterm/config.toml`
//! 3. `./sterm.toml`
//! 4. the file given with `--config`
//! 5. explicit command line flags
//!
//! Later layers override earlier ones key by key. Missing files are skipped.
//!
//! # Configuration File
//!
//! ```toml
//! [connection]
//! device = "/dev/ttyUSB0"
//! baudrate = 115200
//! format = "8N1"
//!
//! [terminal]
//! echo = true
//! escape = "^_"          # single character or caret notation
//! mode = "text"          # text | binary
//! input = "raw"          # raw | line
//! logfile = "uart.log"
//!
//! [remote]
//! newline = "crlf"       # lf | cr | crlf
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::format::{FormatError, SerialFormat};
use crate::core::framing::Framing;
use crate::ui::{InputMode, LineEnding};

/// Default escape character (Ctrl+_)
pub const DEFAULT_ESCAPE: char = '\x1f';
pub const DEFAULT_BAUDRATE: u32 = 115_200;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("escape \"{0}\" must be a single character or caret notation like ^]")]
    InvalidEscape(String),

    #[error("unknown terminal mode \"{0}\" (expected text or binary)")]
    InvalidMode(String),

    #[error("unknown input mode \"{0}\" (expected raw or line)")]
    InvalidInput(String),

    #[error("unknown newline \"{0}\" (expected lf, cr or crlf)")]
    InvalidNewline(String),

    #[error("no device given")]
    MissingDevice,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One configuration layer. Every key is optional so layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub connection: ConnectionConfig,
    pub terminal: TerminalConfig,
    pub remote: RemoteConfig,
}

/// `[connection]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub device: Option<String>,
    pub baudrate: Option<u32>,
    pub format: Option<String>,
}

/// `[terminal]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub echo: Option<bool>,
    pub logfile: Option<PathBuf>,
    pub escape: Option<String>,
    pub mode: Option<String>,
    pub input: Option<String>,
}

/// `[remote]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub newline: Option<String>,
}

impl ConfigFile {
    /// Load one file. `Ok(None)` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }

    /// Load a file the user named explicitly; a missing file is an error
    pub fn load_required(path: &Path) -> Result<Self, ConfigError> {
        Self::load(path)?.ok_or_else(|| ConfigError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        })
    }

    /// Load and merge `paths` in order; later files win
    pub fn load_layers<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = Self::default();
        for path in paths {
            if let Some(layer) = Self::load(path.as_ref())? {
                tracing::debug!("Loaded config {}", path.as_ref().display());
                merged.merge(layer);
            }
        }
        Ok(merged)
    }

    /// Standard locations, lowest priority first
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/sterm.toml")];
        if let Some(home) = home_dir() {
            paths.push(home.join(".sterm").join("config.toml"));
        }
        paths.push(PathBuf::from("sterm.toml"));
        paths
    }

    /// Overlay every key set in `other`
    pub fn merge(&mut self, other: ConfigFile) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.connection.device, other.connection.device);
        take(&mut self.connection.baudrate, other.connection.baudrate);
        take(&mut self.connection.format, other.connection.format);
        take(&mut self.terminal.echo, other.terminal.echo);
        take(&mut self.terminal.logfile, other.terminal.logfile);
        take(&mut self.terminal.escape, other.terminal.escape);
        take(&mut self.terminal.mode, other.terminal.mode);
        take(&mut self.terminal.input, other.terminal.input);
        take(&mut self.remote.newline, other.remote.newline);
    }
}

/// Validated settings the session is built from
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub device: String,
    pub baudrate: u32,
    pub format: SerialFormat,
    pub framing: Framing,
    pub echo: bool,
    pub input: InputMode,
    pub escape: char,
    pub logfile: Option<PathBuf>,
    /// Terminator for transmitted lines; `None` keeps the input mode default
    pub newline: Option<LineEnding>,
}

impl Settings {
    /// Apply defaults to the merged layers and validate every value
    pub fn resolve(config: ConfigFile) -> Result<Self, ConfigError> {
        let ConfigFile {
            connection,
            terminal,
            remote,
        } = config;

        let device = connection.device.ok_or(ConfigError::MissingDevice)?;
        let format = match connection.format {
            Some(format) => format.parse::<SerialFormat>()?,
            None => SerialFormat::default(),
        };
        let framing = match terminal.mode {
            Some(mode) => Framing::parse(&mode).ok_or(ConfigError::InvalidMode(mode))?,
            None => Framing::Text,
        };
        let input = match terminal.input {
            Some(input) => InputMode::parse(&input).ok_or(ConfigError::InvalidInput(input))?,
            None => InputMode::Raw,
        };
        let escape = match terminal.escape {
            Some(escape) => parse_escape(&escape)?,
            None => DEFAULT_ESCAPE,
        };
        let newline = match remote.newline {
            Some(newline) => Some(LineEnding::parse(&newline).ok_or(ConfigError::InvalidNewline(newline))?),
            None => None,
        };

        Ok(Self {
            device,
            baudrate: connection.baudrate.unwrap_or(DEFAULT_BAUDRATE),
            format,
            framing,
            echo: terminal.echo.unwrap_or(true),
            input,
            escape,
            logfile: terminal.logfile,
            newline,
        })
    }
}

/// A single character, or `^X` caret notation for control characters
pub fn parse_escape(value: &str) -> Result<char, ConfigError> {
    let invalid = || ConfigError::InvalidEscape(value.to_string());
    let mut chars = value.chars();

    match (chars.next(), chars.next(), chars.next()) {
        (Some(ch), None, None) => Ok(ch),
        (Some('^'), Some('?'), None) => Ok('\x7f'),
        (Some('^'), Some(ch), None) => {
            let upper = ch.to_ascii_uppercase();
            if ('@'..='_').contains(&upper) {
                Ok(char::from(upper as u8 - b'@'))
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}

/// Printable form of the escape character for messages
pub fn describe_escape(escape: char) -> String {
    match escape {
        '\x7f' => "^?".to_string(),
        ch if (ch as u32) < 0x20 => format!("^{}", char::from(ch as u8 + b'@')),
        ch => ch.to_string(),
    }
}

// Get home directory
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
