//! Path resolution for pkgstate
//!
//! # Environment Variables
//!
//! - `PKGSTATE_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/pkgstate`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PKGSTATE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/pkgstate` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\pkgstate`
//!    - macOS/Linux: `~/.config/pkgstate`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PKGSTATE_CONFIG_DIR";

/// Name of the config file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the pkgstate config directory path
pub fn config_dir() -> Result<PathBuf> {
    config_dir_with(|key| std::env::var(key).ok())
}

/// Resolve the config directory with a custom environment lookup.
fn config_dir_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(dir) = env(ENV_CONFIG_DIR).filter(|d| !d.is_empty()) {
        let path = expand_path(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Some(xdg_config) = env("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        let path = PathBuf::from(xdg_config).join("pkgstate");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("pkgstate"));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("pkgstate");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Default config file location
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand `~` and environment variables in a path
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(path).into_owned());
    PathBuf::from(expanded)
}

/// Expand each entry of a `:`-separated search path
pub fn expand_search_path(path: &str) -> String {
    path.split(':')
        .filter(|p| !p.trim().is_empty())
        .map(|p| expand_path(p.trim()).display().to_string())
        .collect::<Vec<_>>()
        .join(":")
}

/// Render a path with the home directory collapsed to `~`
pub fn display_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(rest) = path.strip_prefix(&home)
    {
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_dir_override() {
        let dir = config_dir_with(lookup(&[
            (ENV_CONFIG_DIR, "/tmp/pkgstate-config"),
            ("XDG_CONFIG_HOME", "/tmp/xdg"),
        ]))
        .unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/pkgstate-config"));
    }

    #[test]
    fn test_config_dir_xdg() {
        let dir = config_dir_with(lookup(&[("XDG_CONFIG_HOME", "/tmp/xdg")])).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/xdg/pkgstate"));
    }

    #[test]
    fn test_config_dir_empty_override_is_ignored() {
        let dir = config_dir_with(lookup(&[
            (ENV_CONFIG_DIR, ""),
            ("XDG_CONFIG_HOME", "/tmp/xdg"),
        ]))
        .unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/xdg/pkgstate"));
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/bin");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("bin"));
    }

    #[test]
    fn test_expand_path_absolute_unchanged() {
        assert_eq!(
            expand_path("/opt/conda/bin"),
            PathBuf::from("/opt/conda/bin")
        );
    }

    #[test]
    fn test_expand_search_path() {
        let expanded = expand_search_path("/opt/a::/opt/b");
        assert_eq!(expanded, "/opt/a:/opt/b");
    }

    #[test]
    fn test_display_path_collapses_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(display_path(&home.join("x")), "~/x");
        }
        assert_eq!(display_path(Path::new("/opt/x")), "/opt/x");
    }
}
