use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

pub const DEFAULT_LEFTOVER_FOLDER: &str = "leftover";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_leftover_folder")]
    pub leftover_folder: String,
    #[serde(default = "default_audit_trail")]
    pub audit_trail: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            ignore_patterns: Vec::new(),
            leftover_folder: default_leftover_folder(),
            audit_trail: default_audit_trail(),
        }
    }
}

fn default_leftover_folder() -> String {
    DEFAULT_LEFTOVER_FOLDER.to_string()
}

fn default_audit_trail() -> bool {
    true
}

/// `Config.toml` in the working directory (optional), then `SYNCHIVE_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, Error> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(environment())
        .build()?;
    Ok(builder.try_deserialize::<AppConfig>()?)
}

/// Load from an explicit file, still overlaid by the environment.
pub fn load_configuration_from(path: &Path) -> Result<AppConfig, Error> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(path).required(true))
        .add_source(environment())
        .build()?;
    Ok(builder.try_deserialize::<AppConfig>()?)
}

fn environment() -> Environment {
    Environment::with_prefix("SYNCHIVE")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("ignore_patterns")
}

/// True when one directory contains the other (or they are the same).
pub fn roots_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
