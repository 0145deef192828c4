//! Error types for wrapped package manager operations.
//!
//! Errors are categorized from the tool's own diagnostic output so callers
//! can show appropriate advice. The raw diagnostic text is always kept.

use crate::types::Tool;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categories of package manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network-related errors (download, DNS, TLS)
    Network,
    /// Package, keg or environment not found
    NotFound,
    /// Version or dependency conflict
    Conflict,
    /// Permission denied
    Permission,
    /// Package is already installed
    AlreadyInstalled,
    /// The package manager executable could not be located
    ToolNotFound,
    /// The package manager has no equivalent for the requested operation
    Unsupported,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Package not found",
            Self::Conflict => "Package conflict",
            Self::Permission => "Permission denied",
            Self::AlreadyInstalled => "Already installed",
            Self::ToolNotFound => "Package manager not installed",
            Self::Unsupported => "Operation not supported",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::NotFound => "Verify the package name, version or recipe location",
            Self::Conflict => "Resolve the conflict by unlinking or removing conflicting packages",
            Self::Permission => "Check prefix permissions or run as the owning user",
            Self::AlreadyInstalled => "No action needed - package is already installed",
            Self::ToolNotFound => "Install the package manager or pass its location with --path",
            Self::Unsupported => "Use a lifecycle state the package manager can express",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while querying or driving a package manager.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error: {message}")]
    Network {
        /// Diagnostic text from the failed operation
        message: String,
    },

    /// Package not found
    #[error("package not found: {name}")]
    NotFound {
        /// Name of the package that could not be found
        name: String,
        /// Diagnostic text from the tool
        stderr: String,
    },

    /// Version or dependency conflict
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// Package is already installed
    #[error("already installed: {name}")]
    AlreadyInstalled {
        /// Name of the already-installed package
        name: String,
    },

    /// The package manager executable was not found
    #[error("unable to locate {tool} executable")]
    ToolNotFound {
        /// Which package manager was looked for
        tool: Tool,
    },

    /// The package manager cannot express this operation
    #[error("{tool} does not support {operation}")]
    Unsupported {
        /// Which package manager rejected the operation
        tool: Tool,
        /// The operation that was requested
        operation: String,
    },

    /// Command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::AlreadyInstalled { .. } => ErrorCategory::AlreadyInstalled,
            Error::ToolNotFound { .. } => ErrorCategory::ToolNotFound,
            Error::Unsupported { .. } => ErrorCategory::Unsupported,
            _ => ErrorCategory::Other,
        }
    }

    /// The wrapped tool's raw diagnostic text, or the error message when the
    /// tool produced none.
    pub fn diagnostic(&self) -> String {
        match self {
            Error::Network { message }
            | Error::Conflict { message }
            | Error::Permission { message } => message.clone(),
            Error::NotFound { stderr, .. } | Error::CommandFailed { stderr, .. }
                if !stderr.is_empty() =>
            {
                stderr.clone()
            }
            other => other.to_string(),
        }
    }

    /// Create an error from package manager output.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_tool_output(tool: Tool, stderr: &str, package_name: Option<&str>) -> Self {
        let stderr_lower = stderr.to_lowercase();
        let name = || package_name.unwrap_or("unknown").to_string();

        if stderr_lower.contains("curl")
            || stderr_lower.contains("could not resolve")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("timed out")
            || stderr_lower.contains("condahttperror")
            || stderr_lower.contains("ssl")
            || stderr_lower.contains("certificate")
            || stderr_lower.contains("failed to download")
            || stderr_lower.contains("sha256 mismatch")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("no available formula")
            || stderr_lower.contains("no formulae found")
            || stderr_lower.contains("no such keg")
            || stderr_lower.contains("packagesnotfounderror")
            || stderr_lower.contains("packagenotfounderror")
            || stderr_lower.contains("environmentlocationnotfound")
            || stderr_lower.contains("couldn't find")
        {
            return Error::NotFound {
                name: name(),
                stderr: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("already installed")
            || stderr_lower.contains("is already an installed")
        {
            return Error::AlreadyInstalled { name: name() };
        }

        if stderr_lower.contains("conflict")
            || stderr_lower.contains("unsatisfiableerror")
            || stderr_lower.contains("is a dependency")
            || stderr_lower.contains("already linked")
        {
            return Error::Conflict {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("operation not permitted")
            || stderr_lower.contains("cannot write")
            || stderr_lower.contains("not writable")
        {
            return Error::Permission {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "{tool} command failed{}",
                package_name
                    .map(|n| format!(" for {n}"))
                    .unwrap_or_default()
            ),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Result type for package manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tool_output_network() {
        let err = Error::from_tool_output(Tool::Brew, "curl: (6) Could not resolve host", Some("wget"));
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_from_tool_output_not_found() {
        let err = Error::from_tool_output(
            Tool::Brew,
            "Error: No available formula with the name \"foo\"",
            Some("foo"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.diagnostic().contains("No available formula"));
    }

    #[test]
    fn test_from_tool_output_conda_not_found() {
        let err = Error::from_tool_output(
            Tool::Conda,
            "PackagesNotFoundError: The following packages are not available",
            Some("samtools"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_tool_output_already_installed() {
        let err = Error::from_tool_output(Tool::Brew, "Warning: git is already installed", Some("git"));
        assert_eq!(err.category(), ErrorCategory::AlreadyInstalled);
    }

    #[test]
    fn test_from_tool_output_permission() {
        let err = Error::from_tool_output(Tool::Brew, "Permission denied @ dir_s_mkdir", Some("foo"));
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_from_tool_output_conflict() {
        let err = Error::from_tool_output(Tool::Brew, "Error: foo conflicts with bar", Some("foo"));
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_unclassified_output_keeps_raw_diagnostic() {
        let err = Error::from_tool_output(Tool::Conda, "  something odd happened \n", Some("foo"));
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.diagnostic(), "something odd happened");
        assert_eq!(err.to_string(), "command failed: conda command failed for foo");
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::Unsupported {
            tool: Tool::Conda,
            operation: "link".to_string(),
        };
        assert_eq!(err.to_string(), "conda does not support link");
        assert_eq!(err.diagnostic(), "conda does not support link");
    }
}
