//! Conda backend using `conda` commands.

use crate::backend::Backend;
use crate::command::{ToolCommand, diagnostic, locate};
use crate::error::{Error, Result};
use crate::types::{PackageInfo, PackageRef, Tool, ToolOptions, UpdateOutcome};
use std::path::Path;

/// Backend that executes real `conda` commands.
///
/// A conda environment holds exactly one version of each package and every
/// installed package is on the environment's search path, so the installed
/// version is always the active one.
pub struct CondaBackend {
    cmd: ToolCommand,
    install_flags: Vec<String>,
    channels: Vec<String>,
}

impl CondaBackend {
    /// Locate `conda` and create a backend.
    pub fn new(options: &ToolOptions) -> Result<Self> {
        let conda_path = locate(Tool::Conda, &options.search_path)?;
        log::debug!("using conda at {}", conda_path.display());
        Ok(Self {
            cmd: ToolCommand::new(Tool::Conda, conda_path, options.env.clone()),
            install_flags: options.install_flags(),
            channels: options.channels.clone(),
        })
    }

    fn channel_args<'a>(&'a self, recipe: Option<&'a str>) -> Vec<&'a str> {
        self.channels
            .iter()
            .map(String::as_str)
            .chain(recipe)
            .flat_map(|c| ["-c", c])
            .collect()
    }

    fn latest_version(&self, name: &str) -> Result<Option<String>> {
        let mut args = vec!["search", "--json"];
        args.extend(self.channel_args(None));
        args.push(name);

        let output = self.cmd.run(&args)?;
        if !output.status.success() {
            // PackagesNotFoundError: unknown to every configured channel
            return Ok(None);
        }
        let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(parse_search_latest(&json, name))
    }
}

/// `-n <env>` arguments for a package's environment.
fn env_args(package: &PackageRef) -> Vec<&str> {
    match &package.environment {
        Some(env) => vec!["-n", env.as_str()],
        None => Vec::new(),
    }
}

impl Backend for CondaBackend {
    fn tool(&self) -> Tool {
        Tool::Conda
    }

    fn is_available(&self) -> bool {
        self.cmd
            .run(&["--version"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn exclusive_versions(&self) -> bool {
        true
    }

    fn info(&self, package: &PackageRef) -> Result<Option<PackageInfo>> {
        let pattern = exact_name_pattern(&package.name);
        let mut args = vec!["list", "--json"];
        args.extend(env_args(package));
        args.push(&pattern);

        let output = self.cmd.run(&args)?;
        let installed = if output.status.success() {
            let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
            parse_list_versions(&json, &package.name)
        } else {
            let message = diagnostic(&output);
            if !is_missing_environment(&message) {
                return Err(Error::from_tool_output(
                    Tool::Conda,
                    &message,
                    Some(&package.name),
                ));
            }
            log::debug!("environment of {package} does not exist, nothing installed");
            Vec::new()
        };

        let latest = self.latest_version(&package.name)?;
        if installed.is_empty() && latest.is_none() {
            return Ok(None);
        }

        Ok(Some(PackageInfo {
            name: package.name.clone(),
            linked_version: installed.first().cloned(),
            installed_versions: installed,
            latest_version: latest,
        }))
    }

    fn install(
        &self,
        package: &PackageRef,
        version: Option<&str>,
        recipe: Option<&str>,
    ) -> Result<()> {
        let spec = match version {
            Some(v) => format!("{}={}", package.name, v),
            None => package.name.clone(),
        };
        let mut args = vec!["install", "-y"];
        args.extend(env_args(package));
        args.extend(self.channel_args(recipe));
        args.extend(self.install_flags.iter().map(String::as_str));
        args.push(&spec);

        self.cmd.run_checked(&args, Some(&package.name))?;
        Ok(())
    }

    fn uninstall(&self, package: &PackageRef, _version: &str) -> Result<()> {
        let mut args = vec!["remove", "-y"];
        args.extend(env_args(package));
        args.push(&package.name);
        self.cmd.run_checked(&args, Some(&package.name))?;
        Ok(())
    }

    fn link(&self, _package: &PackageRef, _version: &str) -> Result<()> {
        Err(self.unsupported("link"))
    }

    fn unlink(&self, _package: &PackageRef, _version: &str) -> Result<()> {
        Err(self.unsupported("unlink"))
    }

    fn fetch_head(&self, _package: &PackageRef) -> Result<()> {
        Err(self.unsupported("head installs"))
    }

    fn upgrade(&self, package: &PackageRef) -> Result<()> {
        let mut args = vec!["update", "-y"];
        args.extend(env_args(package));
        args.extend(self.channel_args(None));
        args.push(&package.name);
        self.cmd.run_checked(&args, Some(&package.name))?;
        Ok(())
    }

    fn update(&self) -> Result<UpdateOutcome> {
        let out = self
            .cmd
            .run_checked(&["update", "-y", "-n", "base", "conda"], Some("conda"))?;
        Ok(parse_update_output(&out))
    }

    fn upgrade_all(&self) -> Result<UpdateOutcome> {
        let out = self.cmd.run_checked(&["update", "-y", "--all"], None)?;
        Ok(parse_update_output(&out))
    }

    fn list_environments(&self) -> Result<Vec<String>> {
        let out = self.cmd.run_checked(&["env", "list", "--json"], None)?;
        let json: serde_json::Value = serde_json::from_str(&out)?;
        Ok(parse_env_list(&json))
    }

    fn environment_packages(&self, name: &str) -> Result<Vec<String>> {
        let out = self
            .cmd
            .run_checked(&["list", "--json", "-n", name], None)?;
        let json: serde_json::Value = serde_json::from_str(&out)?;
        Ok(json
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|p| p["name"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_environment(&self, name: &str) -> Result<()> {
        let mut args = vec!["create", "-y", "-n", name];
        args.extend(self.channel_args(None));
        self.cmd.run_checked(&args, None)?;
        Ok(())
    }

    fn remove_environment(&self, name: &str) -> Result<()> {
        self.cmd
            .run_checked(&["env", "remove", "-y", "-n", name], None)?;
        Ok(())
    }
}

/// `conda list` takes a regex; match exactly `name`.
fn exact_name_pattern(name: &str) -> String {
    format!("^{}$", regex::escape(name))
}

/// Whether a failed conda run only reports that the `-n` environment is absent.
fn is_missing_environment(diagnostic: &str) -> bool {
    let lower = diagnostic.to_lowercase();
    lower.contains("environmentlocationnotfound")
        || lower.contains("could not find conda environment")
}

/// Versions of `name` in `conda list --json` output.
fn parse_list_versions(json: &serde_json::Value, name: &str) -> Vec<String> {
    json.as_array()
        .map(|arr| {
            arr.iter()
                .filter(|p| p["name"].as_str() == Some(name))
                .filter_map(|p| p["version"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Newest version in `conda search --json` output.
///
/// Conda lists matches oldest first, so the last entry is the newest.
fn parse_search_latest(json: &serde_json::Value, name: &str) -> Option<String> {
    json[name]
        .as_array()?
        .last()?
        .get("version")?
        .as_str()
        .map(str::to_string)
}

/// Environment names from `conda env list --json`.
///
/// Named environments live under `<root>/envs/<name>`; the root prefix
/// itself is the `base` environment.
fn parse_env_list(json: &serde_json::Value) -> Vec<String> {
    json["envs"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|p| p.as_str())
                .map(|p| {
                    let path = Path::new(p);
                    let in_envs_dir = path
                        .parent()
                        .and_then(|d| d.file_name())
                        .is_some_and(|d| d == "envs");
                    match path.file_name() {
                        Some(name) if in_envs_dir => name.to_string_lossy().to_string(),
                        _ => "base".to_string(),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_update_output(stdout: &str) -> UpdateOutcome {
    if stdout.contains("All requested packages already installed") {
        UpdateOutcome::AlreadyUpToDate
    } else {
        UpdateOutcome::Updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_versions_exact_name() {
        let json: serde_json::Value = serde_json::from_str(
            r#"[
                {"name": "samtools", "version": "1.17", "channel": "bioconda"},
                {"name": "samtools-extra", "version": "0.2", "channel": "bioconda"}
            ]"#,
        )
        .unwrap();

        assert_eq!(parse_list_versions(&json, "samtools"), vec!["1.17"]);
        assert!(parse_list_versions(&json, "bcftools").is_empty());
    }

    #[test]
    fn test_exact_name_pattern_escapes_regex() {
        assert_eq!(exact_name_pattern("samtools"), "^samtools$");
        assert_eq!(exact_name_pattern("libstdc++"), r"^libstdc\+\+$");
        assert_eq!(exact_name_pattern("python.app"), r"^python\.app$");

        let pattern = regex::Regex::new(&exact_name_pattern("libstdc++")).unwrap();
        assert!(pattern.is_match("libstdc++"));
        assert!(!pattern.is_match("libstdcc"));
    }

    #[test]
    fn test_missing_environment_is_recognized() {
        assert!(is_missing_environment(
            "EnvironmentLocationNotFound: Not a conda environment: /opt/conda/envs/bio"
        ));
        assert!(is_missing_environment("Could not find conda environment: bio"));
        assert!(!is_missing_environment(
            "CondaHTTPError: HTTP 000 CONNECTION FAILED for url <https://conda.anaconda.org>"
        ));
        assert!(!is_missing_environment("PermissionError: [Errno 13] Permission denied"));
    }

    /// A `conda` script whose `list` fails with `list_error`; every other
    /// subcommand fails silently. Arguments are appended to `<dir>/args`.
    #[cfg(unix)]
    fn failing_conda(dir: &Path, list_error: &str) -> CondaBackend {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("conda");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\n\
                 if [ \"$1\" = list ]; then echo '{list_error}' >&2; fi\nexit 1\n",
                dir.join("args").display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        CondaBackend::new(&ToolOptions {
            search_path: vec![dir.to_path_buf()],
            ..Default::default()
        })
        .unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_info_surfaces_list_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let conda = failing_conda(
            temp.path(),
            "CondaHTTPError: HTTP 000 CONNECTION FAILED for url <https://conda.anaconda.org>",
        );

        let pkg = PackageRef::new("libstdc++").in_environment(Some("bio"));
        let err = conda.info(&pkg).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Network);

        let args = std::fs::read_to_string(temp.path().join("args")).unwrap();
        assert_eq!(args.lines().next(), Some(r"list --json -n bio ^libstdc\+\+$"));
    }

    #[cfg(unix)]
    #[test]
    fn test_info_missing_environment_is_unknown_package() {
        let temp = tempfile::TempDir::new().unwrap();
        let conda = failing_conda(temp.path(), "Could not find conda environment: bio");

        let pkg = PackageRef::new("samtools").in_environment(Some("bio"));
        assert!(conda.info(&pkg).unwrap().is_none());
    }

    #[test]
    fn test_parse_search_latest() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"samtools": [{"version": "1.16"}, {"version": "1.17"}, {"version": "1.19"}]}"#,
        )
        .unwrap();

        assert_eq!(parse_search_latest(&json, "samtools").as_deref(), Some("1.19"));
        assert_eq!(parse_search_latest(&json, "bcftools"), None);
    }

    #[test]
    fn test_parse_env_list() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"envs": ["/opt/conda", "/opt/conda/envs/bio", "/opt/conda/envs/qc-2024"]}"#,
        )
        .unwrap();

        assert_eq!(parse_env_list(&json), vec!["base", "bio", "qc-2024"]);
    }

    #[test]
    fn test_parse_update_output() {
        assert_eq!(
            parse_update_output("# All requested packages already installed.\n"),
            UpdateOutcome::AlreadyUpToDate
        );
        assert_eq!(parse_update_output("Preparing transaction: done"), UpdateOutcome::Updated);
    }
}
