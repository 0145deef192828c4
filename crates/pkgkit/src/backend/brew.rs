//! Homebrew / Linuxbrew backend using `brew` commands.

use crate::backend::Backend;
use crate::command::{ToolCommand, locate};
use crate::error::{Error, Result};
use crate::types::{PackageInfo, PackageRef, Tool, ToolOptions, UpdateOutcome};
use std::fs;
use std::path::{Path, PathBuf};

/// Backend that executes real `brew` commands.
///
/// Brew has no environments; every package lives in the prefix the
/// executable belongs to. Each installed version is a keg under
/// `Cellar/<name>/<version>` and at most one keg is linked.
pub struct BrewBackend {
    cmd: ToolCommand,
    install_flags: Vec<String>,
}

impl BrewBackend {
    /// Locate `brew` and create a backend.
    ///
    /// Returns an error if Homebrew is not installed.
    pub fn new(options: &ToolOptions) -> Result<Self> {
        let brew_path = locate(Tool::Brew, &options.search_path)?;
        log::debug!("using brew at {}", brew_path.display());
        Ok(Self {
            cmd: ToolCommand::new(Tool::Brew, brew_path, options.env.clone()),
            install_flags: options.install_flags(),
        })
    }

    fn reject_environment(&self, package: &PackageRef) -> Result<()> {
        if package.environment.is_some() {
            return Err(self.unsupported("environments"));
        }
        Ok(())
    }

    /// Directory holding every keg of a formula.
    fn cellar(&self, name: &str) -> Result<PathBuf> {
        let out = self.cmd.run_checked(&["--cellar", name], Some(name))?;
        Ok(PathBuf::from(out.trim()))
    }

    fn install_args<'a>(&'a self, extra: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec!["install"];
        args.extend(self.install_flags.iter().map(String::as_str));
        args.extend_from_slice(extra);
        args
    }
}

impl Backend for BrewBackend {
    fn tool(&self) -> Tool {
        Tool::Brew
    }

    fn is_available(&self) -> bool {
        self.cmd
            .run(&["--version"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn info(&self, package: &PackageRef) -> Result<Option<PackageInfo>> {
        self.reject_environment(package)?;
        let output = self
            .cmd
            .run(&["info", "--json=v2", "--formula", &package.name])?;

        if !output.status.success() {
            // Unknown formula: brew exits non-zero
            return Ok(None);
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(parse_formula_info(&json))
    }

    fn install(
        &self,
        package: &PackageRef,
        version: Option<&str>,
        recipe: Option<&str>,
    ) -> Result<()> {
        self.reject_environment(package)?;
        // A versioned recipe file determines the version that gets built
        let source = recipe.unwrap_or(package.name.as_str());
        log::debug!(
            "brew install {} (version {})",
            source,
            version.unwrap_or("from recipe")
        );
        let args = self.install_args(&[source]);
        self.cmd.run_checked(&args, Some(&package.name))?;
        Ok(())
    }

    fn uninstall(&self, package: &PackageRef, version: &str) -> Result<()> {
        self.reject_environment(package)?;
        let cellar = self.cellar(&package.name)?;
        let kegs = list_kegs(&cellar)?;

        if !kegs.iter().any(|k| k == version) {
            return Err(Error::NotFound {
                name: format!("{}/{}", package.name, version),
                stderr: String::new(),
            });
        }

        if kegs.len() == 1 {
            self.cmd
                .run_checked(&["uninstall", "--formula", &package.name], Some(&package.name))?;
            return Ok(());
        }

        // Other versions stay: only this keg goes, unlinking it first if needed
        let linked = self.info(package)?.and_then(|i| i.linked_version);
        if linked.as_deref() == Some(version) {
            self.cmd.run_checked(&["unlink", &package.name], Some(&package.name))?;
        }
        remove_keg(&cellar, version)
    }

    fn link(&self, package: &PackageRef, version: &str) -> Result<()> {
        self.reject_environment(package)?;
        self.cmd
            .run_checked(&["link", "--overwrite", &package.name], Some(&package.name))?;

        // brew links by formula name; make sure the requested keg won
        let linked = self.info(package)?.and_then(|i| i.linked_version);
        match linked {
            Some(v) if v == version => Ok(()),
            other => Err(Error::Conflict {
                message: format!(
                    "brew linked {} {} instead of {}",
                    package.name,
                    other.as_deref().unwrap_or("nothing"),
                    version
                ),
            }),
        }
    }

    fn unlink(&self, package: &PackageRef, _version: &str) -> Result<()> {
        self.reject_environment(package)?;
        self.cmd.run_checked(&["unlink", &package.name], Some(&package.name))?;
        Ok(())
    }

    fn fetch_head(&self, package: &PackageRef) -> Result<()> {
        self.reject_environment(package)?;
        let head_installed = self
            .info(package)?
            .is_some_and(|i| i.installed_versions.iter().any(|v| is_head_version(v)));

        if head_installed {
            let mut args = vec!["upgrade", "--fetch-HEAD"];
            args.extend(self.install_flags.iter().map(String::as_str));
            args.push(&package.name);
            self.cmd.run_checked(&args, Some(&package.name))?;
        } else {
            let args = self.install_args(&["--HEAD", &package.name]);
            self.cmd.run_checked(&args, Some(&package.name))?;
        }
        Ok(())
    }

    fn upgrade(&self, package: &PackageRef) -> Result<()> {
        self.reject_environment(package)?;
        let mut args = vec!["upgrade", "--formula"];
        args.extend(self.install_flags.iter().map(String::as_str));
        args.push(&package.name);
        self.cmd.run_checked(&args, Some(&package.name))?;
        Ok(())
    }

    fn update(&self) -> Result<UpdateOutcome> {
        let out = self.cmd.run_checked(&["update"], None)?;
        Ok(parse_update_output(&out))
    }

    fn upgrade_all(&self) -> Result<UpdateOutcome> {
        let mut args = vec!["upgrade"];
        args.extend(self.install_flags.iter().map(String::as_str));
        let out = self.cmd.run_checked(&args, None)?;
        Ok(parse_upgrade_output(&out))
    }
}

/// Parse `brew info --json=v2 --formula <name>` output.
fn parse_formula_info(json: &serde_json::Value) -> Option<PackageInfo> {
    let formula = json["formulae"].as_array()?.first()?;
    let name = formula["name"].as_str()?.to_string();

    let installed_versions = formula["installed"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|i| i["version"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(PackageInfo {
        name,
        installed_versions,
        linked_version: formula["linked_keg"].as_str().map(str::to_string),
        latest_version: formula["versions"]["stable"].as_str().map(str::to_string),
    })
}

fn parse_update_output(stdout: &str) -> UpdateOutcome {
    let already = stdout
        .lines()
        .any(|l| l.trim().to_lowercase().contains("already up-to-date"));
    if already {
        UpdateOutcome::AlreadyUpToDate
    } else {
        UpdateOutcome::Updated
    }
}

/// `brew upgrade` prints nothing on stdout when every formula is current.
fn parse_upgrade_output(stdout: &str) -> UpdateOutcome {
    if stdout.trim().is_empty() {
        UpdateOutcome::AlreadyUpToDate
    } else {
        UpdateOutcome::Updated
    }
}

fn is_head_version(version: &str) -> bool {
    version == "HEAD" || version.starts_with("HEAD-")
}

/// Keg directory names under a formula's cellar.
fn list_kegs(cellar: &Path) -> Result<Vec<String>> {
    if !cellar.exists() {
        return Ok(Vec::new());
    }
    let mut kegs = Vec::new();
    for entry in fs::read_dir(cellar)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            kegs.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    kegs.sort();
    Ok(kegs)
}

fn remove_keg(cellar: &Path, version: &str) -> Result<()> {
    let keg = cellar.join(version);
    log::debug!("removing keg {}", keg.display());
    fs::remove_dir_all(&keg)?;
    Ok(())
}
