//! Process invocation and executable discovery for wrapped tools.

use crate::error::{Error, Result};
use crate::types::Tool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// A located package manager executable plus the environment it runs with.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: Tool,
    program: PathBuf,
    env: BTreeMap<String, String>,
}

impl ToolCommand {
    /// Wrap an executable path.
    pub fn new(tool: Tool, program: PathBuf, env: BTreeMap<String, String>) -> Self {
        Self { tool, program, env }
    }

    /// Path of the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool and return raw output.
    pub fn run(&self, args: &[&str]) -> Result<Output> {
        log::debug!("running {} {}", self.program.display(), args.join(" "));
        Command::new(&self.program)
            .args(args)
            .envs(&self.env)
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {}: {}", self.tool, e),
                stderr: String::new(),
            })
    }

    /// Run the tool and check for success, returning stdout.
    pub fn run_checked(&self, args: &[&str], package_name: Option<&str>) -> Result<String> {
        let output = self.run(args)?;

        if !output.status.success() {
            return Err(Error::from_tool_output(
                self.tool,
                &diagnostic(&output),
                package_name,
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Error text of a failed run.
pub fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    // conda reports some failures on stdout only
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).to_string()
    } else {
        stderr.to_string()
    }
}

/// Find a tool's executable.
///
/// Checks the caller-supplied search path first, then the tool's well-known
/// locations, then `PATH`.
pub fn locate(tool: Tool, search_path: &[PathBuf]) -> Result<PathBuf> {
    let well_known = tool.well_known_dirs().iter().map(PathBuf::from);
    let from_env = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
        .unwrap_or_default();

    search_path
        .iter()
        .cloned()
        .chain(well_known)
        .chain(from_env)
        .map(|dir| dir.join(tool.executable()))
        .find(|candidate| is_executable(candidate))
        .ok_or(Error::ToolNotFound { tool })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_prefers_search_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let brew = temp.path().join("brew");
        make_executable(&brew);

        let found = locate(Tool::Brew, &[temp.path().to_path_buf()]).unwrap();
        assert_eq!(found, brew);
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_skips_non_executable() {
        let temp = tempfile::TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("conda"), "not executable").unwrap();
        make_executable(&second.join("conda"));

        let found = locate(Tool::Conda, &[first, second.clone()]).unwrap();
        assert_eq!(found, second.join("conda"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_checked_reports_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("brew");
        fs::write(&script, "#!/bin/sh\necho 'Error: No available formula' >&2\nexit 1\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let cmd = ToolCommand::new(Tool::Brew, script, BTreeMap::new());
        let err = cmd.run_checked(&["info", "nope"], Some("nope")).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::NotFound);
    }
}
