use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::report::FailOn;
use crate::resolve::first_existing;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "FLOWCHECK_CONFIG";

/// Schema versions this build understands.
pub const SUPPORTED_SCHEMA_VERSIONS: [u64; 1] = [2];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowcheckConfig {
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub fail_on: FailOn,
}

/// Where "latest artifact" resolution looks, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_plans_dir")]
    pub plans_dir: PathBuf,
    #[serde(default = "default_issues_dir")]
    pub issues_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plans_dir: default_plans_dir(),
            issues_dir: default_issues_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<u64>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            supported_versions: default_supported_versions(),
        }
    }
}

/// Config plus the file it came from (`None` means built-in defaults).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub config: FlowcheckConfig,
    pub source: Option<PathBuf>,
}

/// Ordered config candidates: explicit override, project, user.
#[must_use]
pub fn config_candidates(project_root: &Path, explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.push(project_root.join(".flowcheck/config.toml"));
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("flowcheck/config.toml"));
    }
    candidates
}

/// Load the first config file that exists among [`config_candidates`].
///
/// `explicit` is the value of [`CONFIG_ENV`], read by the caller. An explicit
/// path that does not exist is skipped like any other candidate.
///
/// # Errors
///
/// Returns an error if the selected file cannot be read or parsed.
pub fn load_config(project_root: &Path, explicit: Option<&Path>) -> Result<LoadedConfig> {
    let Some(path) = first_existing(config_candidates(project_root, explicit)) else {
        tracing::debug!("no config file found, using defaults");
        return Ok(LoadedConfig {
            config: FlowcheckConfig::default(),
            source: None,
        });
    };

    let config = load_config_file(&path)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(LoadedConfig {
        config,
        source: Some(path),
    })
}

/// Parse one config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid config TOML.
pub fn load_config_file(path: &Path) -> Result<FlowcheckConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<FlowcheckConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn default_plans_dir() -> PathBuf {
    PathBuf::from("docs/plans")
}

fn default_issues_dir() -> PathBuf {
    PathBuf::from("docs/issues")
}

fn default_supported_versions() -> Vec<u64> {
    SUPPORTED_SCHEMA_VERSIONS.to_vec()
}
