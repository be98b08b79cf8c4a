use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

const DEFAULT_CONFIG: &str = include_str!("default_config.toml");

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub document: DocumentConfig,
    pub fonts: FontConfig,
    pub assets: AssetsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DocumentConfig {
    /// Argument of `\documentclass`.
    pub class: String,
    /// One level of indentation in the generated source.
    pub indent: String,
    /// Directories searched by `\includegraphics`.
    pub graphics_path: Vec<String>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            class: "article".to_string(),
            indent: "  ".to_string(),
            graphics_path: vec!["./images/".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FontConfig {
    pub main: String,
    pub mono: String,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            main: "FreeSerif".to_string(),
            mono: "FreeMono".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    /// Where downloaded images are cached.
    pub image_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("images"),
        }
    }
}

impl Config {
    /// Load config from a TOML file, or return defaults if not found.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring invalid config");
                Self::compiled_default()
            }),
            Err(_) => Self::compiled_default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The configuration embedded at build time.
    pub fn compiled_default() -> Self {
        Self::from_toml_str(DEFAULT_CONFIG).unwrap_or_default()
    }
}
