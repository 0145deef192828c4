//! pkgstate configuration file
//!
//! ```toml
//! tool = "conda"
//! jobs = 8
//! install_options = ["force-bottle"]
//!
//! [brew]
//! path = "~/.linuxbrew/bin"
//!
//! [conda]
//! path = "/opt/conda/bin"
//! channels = ["conda-forge", "bioconda"]
//!
//! [env]
//! HOMEBREW_NO_AUTO_UPDATE = "1"
//! ```
//!
//! Every field is optional and command-line flags take precedence.

use anyhow::{Context, Result};
use pkgkit::{Tool, ToolOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Package manager used when `--tool` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Tool>,

    /// Parallel reconciliation jobs for batches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Extra install flags, `--` is added when missing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install_options: Vec<String>,

    #[serde(default)]
    pub brew: ToolSection,

    #[serde(default)]
    pub conda: ToolSection,

    /// Environment variables set for every tool invocation
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Per-tool settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSection {
    /// `:`-separated directories searched before the well-known locations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Extra channels (conda only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
}

impl Config {
    /// Load the config from an explicit file, or from the default location.
    ///
    /// A missing default file yields the default config; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Could not read config file: {}", path.display()))?;
                Self::parse(&content, path)
            }
            None => {
                let path = paths::config_file()?;
                Self::load_from(&path)
            }
        }
    }

    /// Load a config file, returning the default when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn section(&self, tool: Tool) -> &ToolSection {
        match tool {
            Tool::Brew => &self.brew,
            Tool::Conda => &self.conda,
        }
    }

    /// Build the host execution context for a tool.
    ///
    /// `path_override` replaces the configured search path.
    pub fn tool_options(&self, tool: Tool, path_override: Option<&str>) -> ToolOptions {
        let section = self.section(tool);
        let mut options = ToolOptions::default();

        if let Some(path) = path_override.or(section.path.as_deref()) {
            options = options.with_search_path(&paths::expand_search_path(path));
        }

        options.install_options = self.install_options.clone();
        if tool == Tool::Conda {
            options.channels = section.channels.clone();
        }
        options
            .env
            .extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        options
    }
}
