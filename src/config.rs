//! Configuration file parsing
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working setup:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 23
//! read_wait_ms = 100
//! idle_timeout_ms = 30000
//!
//! [storage]
//! root = "./spiffs"
//! show_hidden = true
//!
//! [console]
//! input_buffer = 8192
//! echo_buffer = 8192
//!
//! [programmer]
//! kind = "updi"
//! signature = "1E 96 51"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use portaprog_core::programmer::{Programmer, ProgrammerKind, Signature, SimulatedTarget};
use portaprog_core::ring::DEFAULT_CAPACITY;
use portaprog_net::ServerConfig;
use serde::Deserialize;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "portaprog.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has wrongly typed fields
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Whole configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub console: ConsoleSection,
    pub programmer: ProgrammerSection,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    pub read_wait_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 23,
            read_wait_ms: 100,
            idle_timeout_ms: 30_000,
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub root: PathBuf,
    pub show_hidden: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./spiffs"),
            show_hidden: true,
        }
    }
}

/// `[console]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleSection {
    pub input_buffer: usize,
    pub echo_buffer: usize,
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            input_buffer: DEFAULT_CAPACITY,
            echo_buffer: DEFAULT_CAPACITY,
        }
    }
}

/// Programmer interface choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgrammerChoice {
    #[default]
    None,
    Spi,
    Updi,
}

impl From<ProgrammerChoice> for Option<ProgrammerKind> {
    fn from(choice: ProgrammerChoice) -> Self {
        match choice {
            ProgrammerChoice::None => None,
            ProgrammerChoice::Spi => Some(ProgrammerKind::Spi),
            ProgrammerChoice::Updi => Some(ProgrammerKind::Updi),
        }
    }
}

/// `[programmer]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgrammerSection {
    pub kind: ProgrammerChoice,
    /// Signature the simulated target answers with; no target when unset
    #[serde(deserialize_with = "deserialize_signature")]
    pub signature: Option<Signature>,
}

/// Deserialize a signature written as hex, e.g. `"1E 95 0F"` or `"0x1E950F"`
fn deserialize_signature<'de, D>(deserializer: D) -> Result<Option<Signature>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_signature(&text)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Parse three hex bytes, separators and a `0x` prefix optional
pub fn parse_signature(text: &str) -> Result<Signature, String> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-' | '_'))
        .collect();
    if digits.len() != 6 {
        return Err(format!("signature needs 3 hex bytes, got '{}'", text));
    }
    let mut sig = [0u8; 3];
    for (i, byte) in sig.iter_mut().enumerate() {
        let pair = digits
            .get(i * 2..i * 2 + 2)
            .ok_or_else(|| format!("invalid signature '{}'", text))?;
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|e| format!("invalid signature '{}': {}", text, e))?;
    }
    Ok(sig)
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the explicit file, else the default file if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                log::debug!("using {}", DEFAULT_CONFIG_FILE);
                Self::from_toml_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    /// Listener settings for the TCP server
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.server.bind.clone(),
            port: self.server.port,
            read_wait: Duration::from_millis(self.server.read_wait_ms),
            idle_timeout: Duration::from_millis(self.server.idle_timeout_ms),
        }
    }

    /// Programmer backend described by `[programmer]`
    pub fn programmer(&self) -> Programmer {
        let Some(kind) = Option::<ProgrammerKind>::from(self.programmer.kind) else {
            return Programmer::Detached;
        };
        let target = match self.programmer.signature {
            Some(sig) => SimulatedTarget::new(sig),
            None => SimulatedTarget::absent(),
        };
        Programmer::new(kind, Box::new(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 23);
        assert_eq!(config.storage.root, PathBuf::from("./spiffs"));
        assert!(config.storage.show_hidden);
        assert_eq!(config.console.echo_buffer, 8 * 1024);
        assert!(matches!(config.programmer(), Programmer::Detached));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            [server]
            bind = "127.0.0.1"
            port = 2323
            read_wait_ms = 20
            idle_timeout_ms = 0

            [storage]
            root = "/tmp/store"
            show_hidden = false

            [programmer]
            kind = "updi"
            signature = "1E 96 51"
            "#,
        )
        .unwrap();
        let server = config.server_config();
        assert_eq!(server.port, 2323);
        assert_eq!(server.read_wait, Duration::from_millis(20));
        assert!(server.idle_timeout.is_zero());
        assert!(!config.storage.show_hidden);
        assert_eq!(config.programmer.signature, Some([0x1E, 0x96, 0x51]));
        assert_eq!(config.programmer().kind(), Some(ProgrammerKind::Updi));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            Config::from_toml_str("[server]\nprot = 23\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(Config::from_toml_str("[programmer]\nkind = \"jtag\"\n").is_err());
    }

    #[test]
    fn test_parse_signature() {
        assert_eq!(parse_signature("1e950f"), Ok([0x1E, 0x95, 0x0F]));
        assert_eq!(parse_signature("0x1E:93:0B"), Ok([0x1E, 0x93, 0x0B]));
        assert!(parse_signature("1E 95").is_err());
        assert!(parse_signature("zz zz zz").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[console]\ninput_buffer = 64").unwrap();
        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.console.input_buffer, 64);
        assert_eq!(config.console.echo_buffer, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_toml_file("/nonexistent/portaprog.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
