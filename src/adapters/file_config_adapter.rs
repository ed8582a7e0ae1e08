//! INI file configuration adapter.

use crate::domain::error::TradesimError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;
use tracing::{debug, info_span, warn};

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TradesimError> {
        let path = path.as_ref();
        let _span = info_span!("load_config", path = %path.display()).entered();
        let content = std::fs::read_to_string(path)?;
        Self::parse(content, &path.display().to_string())
    }

    pub fn from_string(content: &str) -> Result<Self, TradesimError> {
        Self::parse(content.to_string(), "<string>")
    }

    fn parse(content: String, origin: &str) -> Result<Self, TradesimError> {
        let mut config = Ini::new();
        config
            .read(content)
            .map_err(|reason| TradesimError::ConfigParse {
                file: origin.to_string(),
                reason,
            })?;
        debug!(sections = config.sections().len(), "config parsed");
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.config.get(section, key) {
            Some(raw) => Self::parse_bool(&raw).unwrap_or_else(|| {
                warn!(section, key, value = %raw, default, "unrecognised boolean, using default");
                default
            }),
            None => default,
        }
    }

    fn sections(&self) -> Vec<String> {
        self.config.sections()
    }
}
