//! Configuration module

use crate::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at an alternative configuration file
pub const CONFIG_ENV_VAR: &str = "GS_FASTCOPY_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// External compression tools
    #[serde(default)]
    pub tools: ToolConfig,
    /// Remote transfer settings
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Scratch directory settings
    #[serde(default)]
    pub scratch: ScratchConfig,
}

/// Names of the gzip tools and where to look for them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Parallel compressor, used when found
    pub parallel_compress: String,
    /// Fallback compressor
    pub serial_compress: String,
    /// Parallel decompressor, used when found
    pub parallel_decompress: String,
    /// Fallback decompressor
    pub serial_decompress: String,
    /// Directories searched for the tools instead of `PATH`
    pub search_path: Option<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            parallel_compress: "pigz".to_string(),
            serial_compress: "gzip".to_string(),
            parallel_decompress: "unpigz".to_string(),
            serial_decompress: "gunzip".to_string(),
            search_path: None,
        }
    }
}

/// Remote transfer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Program used to copy objects down (`<program> storage cp ...`)
    pub copy_program: String,
    /// Upload workers when the caller gives none (default: available CPUs)
    pub max_workers: Option<usize>,
    /// Upload chunk size in bytes when the caller gives none
    #[serde(deserialize_with = "deserialize_chunk_size")]
    pub chunk_size: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            copy_program: "gcloud".to_string(),
            max_workers: None,
            chunk_size: None,
        }
    }
}

/// Scratch directory configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory scratch sessions are created in (default: system temp dir)
    pub root: Option<PathBuf>,
}

/// Chunk size given either as bytes or as a string like "32MiB"
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Numeric(u64),
    String(String),
}

fn deserialize_chunk_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<SizeValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(SizeValue::Numeric(bytes)) => Ok(Some(bytes)),
        Some(SizeValue::String(text)) => parse_size(&text)
            .map(Some)
            .map_err(|e| D::Error::custom(format!("Failed to parse chunk_size: {}", e))),
    }
}

/// Parse a byte count such as `"33554432"`, `"512KiB"` or `"32MiB"`.
///
/// Units are binary (`KiB`, `MiB`, `GiB`) or decimal (`KB`, `MB`, `GB`),
/// matched case-insensitively. Only whole numbers are accepted.
pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(digits_end);

    let count: u64 = digits
        .parse()
        .map_err(|_| Error::Config(format!("size '{}' must start with a byte count", text)))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        other => {
            return Err(Error::Config(format!(
                "size '{}' has unknown unit '{}'",
                text, other
            )))
        }
    };

    count
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("size '{}' is out of range", text)))
}

impl Config {
    /// Get the configuration file path
    ///
    /// `GS_FASTCOPY_CONFIG` takes precedence over the per-user config directory.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = config_dir().ok_or_else(|| {
            Error::Config("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join("gs-fastcopy").join("config.toml"))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Ignoring configuration: {}", e);
            Self::default()
        })
    }

    /// Serialize configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }
}
