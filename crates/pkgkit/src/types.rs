//! Core types shared by the package manager backends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// A wrapped package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Homebrew / Linuxbrew
    Brew,
    /// Conda (and drop-in replacements exposing the same CLI)
    Conda,
}

impl Tool {
    /// Name of the executable that is searched for.
    pub fn executable(&self) -> &'static str {
        match self {
            Tool::Brew => "brew",
            Tool::Conda => "conda",
        }
    }

    /// Locations checked after the caller-supplied search path.
    pub fn well_known_dirs(&self) -> &'static [&'static str] {
        match self {
            Tool::Brew => &[
                "/home/linuxbrew/.linuxbrew/bin",
                "/opt/homebrew/bin",
                "/usr/local/bin",
            ],
            Tool::Conda => &["/mnt/gvl/apps/anaconda_ete/bin", "/opt/conda/bin"],
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.executable())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "brew" | "linuxbrew" | "homebrew" => Ok(Tool::Brew),
            "conda" => Ok(Tool::Conda),
            other => Err(format!("unknown package manager: {other}")),
        }
    }
}

/// A package addressed within an optional environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    /// Package name (formula name for brew, package spec name for conda)
    pub name: String,
    /// Environment the package is scoped to, if any
    pub environment: Option<String>,
}

impl PackageRef {
    /// Address a package in the tool's default namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: None,
        }
    }

    /// Scope the package to an environment.
    pub fn in_environment(mut self, environment: Option<impl Into<String>>) -> Self {
        self.environment = environment.map(Into::into);
        self
    }
}

impl std::fmt::Display for PackageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.environment {
            Some(env) => write!(f, "{}:{}", env, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// What a package manager reports about one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name
    pub name: String,
    /// Every installed version (brew kegs, conda records)
    pub installed_versions: Vec<String>,
    /// The version currently exposed on the search path, if any
    pub linked_version: Option<String>,
    /// Newest version the registry/recipe declares, if the package is known to it
    pub latest_version: Option<String>,
}

/// Outcome of refreshing the package manager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// New definitions or a new tool version were fetched
    Updated,
    /// Nothing to fetch
    AlreadyUpToDate,
}

/// Host execution context for a package manager.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Directories searched for the executable before well-known locations
    pub search_path: Vec<PathBuf>,
    /// Extra install flags, rendered as `--<option>`
    pub install_options: Vec<String>,
    /// Additional channels (conda only)
    pub channels: Vec<String>,
    /// Environment variables set for every invocation
    pub env: BTreeMap<String, String>,
}

impl Default for ToolOptions {
    fn default() -> Self {
        let env = ["LANG", "LC_ALL", "LC_MESSAGES", "LC_CTYPE"]
            .into_iter()
            .map(|k| (k.to_string(), "C".to_string()))
            .collect();
        Self {
            search_path: Vec::new(),
            install_options: Vec::new(),
            channels: Vec::new(),
            env,
        }
    }
}

impl ToolOptions {
    /// Parse a `:`-separated search path.
    pub fn with_search_path(mut self, path: &str) -> Self {
        self.search_path = path
            .split(':')
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .collect();
        self
    }

    /// Install options as command-line flags.
    pub fn install_flags(&self) -> Vec<String> {
        self.install_options
            .iter()
            .map(|o| {
                if o.starts_with("--") {
                    o.clone()
                } else {
                    format!("--{o}")
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_from_str() {
        assert_eq!("brew".parse::<Tool>(), Ok(Tool::Brew));
        assert_eq!("Linuxbrew".parse::<Tool>(), Ok(Tool::Brew));
        assert_eq!("CONDA".parse::<Tool>(), Ok(Tool::Conda));
        assert!("apt".parse::<Tool>().is_err());
    }

    #[test]
    fn test_package_ref_display() {
        assert_eq!(PackageRef::new("samtools").to_string(), "samtools");
        let scoped = PackageRef::new("samtools").in_environment(Some("bio"));
        assert_eq!(scoped.to_string(), "bio:samtools");
    }

    #[test]
    fn test_tool_options_defaults_force_c_locale() {
        let opts = ToolOptions::default();
        assert_eq!(opts.env.get("LC_ALL").map(String::as_str), Some("C"));
        assert_eq!(opts.env.len(), 4);
    }

    #[test]
    fn test_search_path_split() {
        let opts = ToolOptions::default().with_search_path("/a/bin::/b/bin");
        assert_eq!(
            opts.search_path,
            vec![PathBuf::from("/a/bin"), PathBuf::from("/b/bin")]
        );
    }

    #[test]
    fn test_install_flags() {
        let opts = ToolOptions {
            install_options: vec!["with-baz".into(), "--enable-debug".into()],
            ..Default::default()
        };
        assert_eq!(opts.install_flags(), vec!["--with-baz", "--enable-debug"]);
    }
}
