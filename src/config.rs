//! Settings file loading.
//!
//! Settings are read from a JSON file of the following form:
//!
//! ```json
//! {
//!   "AppSettings": {
//!     "InputFile": "text.txt",
//!     "BufferSize": 1048576,
//!     "TempFileSize": 104857600
//!   }
//! }
//! ```
//!
//! Sizes may be given as numbers or numeric strings. Missing or unparseable sizes are read as zero
//! and rejected by [`AppSettings::validate`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::sort::SortError;

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(rename = "AppSettings", default)]
    app_settings: AppSettings,
}

/// Raw application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSettings {
    /// File to be sorted.
    #[serde(default)]
    pub input_file: Option<PathBuf>,
    /// Read/write buffer size in bytes.
    #[serde(default, deserialize_with = "lenient_size")]
    pub buffer_size: usize,
    /// Temporary file (chunk) size in bytes.
    #[serde(default, deserialize_with = "lenient_size")]
    pub temp_file_size: usize,
}

/// Validated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSettings {
    pub input_file: PathBuf,
    pub buffer_size: usize,
    pub temp_file_size: usize,
}

impl AppSettings {
    /// Loads settings from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SortError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SortError> {
        let settings: SettingsFile = serde_json::from_str(content).map_err(SortError::ConfigFormat)?;
        Ok(settings.app_settings)
    }

    /// Checks that all settings are present and usable.
    pub fn validate(self) -> Result<SortSettings, SortError> {
        let input_file = match self.input_file {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(SortError::InvalidConfig("input file is not set".to_string())),
        };
        if self.buffer_size == 0 {
            return Err(SortError::InvalidConfig("buffer size must be positive".to_string()));
        }
        if self.temp_file_size == 0 {
            return Err(SortError::InvalidConfig("temporary file size must be positive".to_string()));
        }

        return Ok(SortSettings {
            input_file,
            buffer_size: self.buffer_size,
            temp_file_size: self.temp_file_size,
        });
    }
}

fn lenient_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let size = match value {
        serde_json::Value::Number(number) => number.as_u64().and_then(|n| usize::try_from(n).ok()),
        serde_json::Value::String(text) => text.trim().parse::<usize>().ok(),
        _ => None,
    };

    Ok(size.unwrap_or(0))
}
