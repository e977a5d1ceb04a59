//! Settings loaded from `prompt-merger.toml` in the working directory.
//!
//! Every field is optional; relative paths resolve against the working directory.

use crate::models::DEFAULT_MODEL;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const SETTINGS_FILE: &str = "prompt-merger.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub default_model: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub key_file: PathBuf,
    pub api_key_file: PathBuf,
    pub templates_dir: PathBuf,
    pub responses_dir: PathBuf,
    /// Extensions offered by the file picker. Empty means any file.
    pub file_extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            connect_timeout_secs: 60,
            read_timeout_secs: 360,
            key_file: PathBuf::from("encryption_key.key"),
            api_key_file: PathBuf::from("api_key.txt"),
            templates_dir: PathBuf::from("active_templates"),
            responses_dir: PathBuf::from("Responses"),
            file_extensions: vec!["cs".to_string()],
        }
    }
}

/// Connect and read timeouts for the completion client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Settings {
    /// Default settings with paths resolved against `base`.
    pub fn defaults(base: &Path) -> Self {
        Self::default().resolved(base)
    }

    /// Reads `<base>/prompt-merger.toml`, or returns defaults when it is absent.
    pub fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = base.join(SETTINGS_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::defaults(base));
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let settings: Settings =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
        Ok(settings.resolved(base))
    }

    fn resolved(mut self, base: &Path) -> Self {
        for path in [
            &mut self.key_file,
            &mut self.api_key_file,
            &mut self.templates_dir,
            &mut self.responses_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
        }
    }
}
