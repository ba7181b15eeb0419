//! Configuration loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tendon_client::DEFAULT_PARAM;
use tendon_core::Color;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub meshes: MeshesConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Http,
    #[default]
    File,
}

/// Where the robot description is fetched from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Base URL of the parameter server (`kind = "http"`)
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Directory holding one file per parameter (`kind = "file"`)
    #[serde(default = "default_store_dir")]
    pub dir: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            url: default_store_url(),
            dir: default_store_dir(),
            timeout_secs: default_store_timeout(),
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:9090/params".to_string()
}

fn default_store_dir() -> String {
    ".".to_string()
}

fn default_store_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Parameter holding the robot description
    #[serde(default = "default_param")]
    pub param: String,
    /// Base path or URL for `package://` mesh references
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub frame_prefix: String,
    /// Flat colour for every mesh, e.g. "#ff8800" or "1 0.5 0 1"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Load without attaching to the scene root
    #[serde(default)]
    pub hidden: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            param: default_param(),
            path: default_path(),
            frame_prefix: String::new(),
            color: None,
            hidden: false,
        }
    }
}

fn default_param() -> String {
    DEFAULT_PARAM.to_string()
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshesConfig {
    /// How long to wait for all meshes before printing
    #[serde(default = "default_mesh_wait")]
    pub timeout_secs: u64,
    /// Per-request timeout for remote meshes
    #[serde(default = "default_mesh_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for MeshesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_mesh_wait(),
            http_timeout_secs: default_mesh_http_timeout(),
        }
    }
}

fn default_mesh_wait() -> u64 {
    30
}

fn default_mesh_http_timeout() -> u64 {
    10
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Saved default configuration");
    Ok(())
}
