//! Error types for reconciliation
//!
//! Validation and planning errors are raised before anything touches the
//! host. Execution failures carry the prefix of actions that did succeed.

use crate::types::{Action, LifecycleState};
use pkgkit::ErrorCategory;
use serde::Serialize;
use thiserror::Error;

/// A declaration that is malformed or contradicts itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("package name must not be empty")]
    EmptyName,

    #[error("invalid package name '{0}'")]
    InvalidName(String),

    #[error("state '{state}' does not take a version (got '{version}')")]
    ConflictingVersion {
        state: LifecycleState,
        version: String,
    },

    #[error("version must not be empty")]
    EmptyVersion,

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("invalid recipe '{0}'")]
    InvalidRecipe(String),

    #[error("'{field}' has {found} entries but 'names' has {expected}")]
    ArityMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(
        "unknown state '{0}' (expected present, absent, linked, unlinked, head or latest)"
    )]
    UnknownState(String),
}

/// A valid declaration that cannot be reconciled against what is installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("{name} is unknown to the registry and no recipe was given")]
    MissingRecipe { name: String },

    #[error("{name} {version} is not installed")]
    NotInstalled { name: String, version: String },

    #[error("state '{state}' for {name} needs an explicit version")]
    AmbiguousVersion {
        name: String,
        state: LifecycleState,
    },

    #[error(
        "{name} has several installed versions ({}) and none is active",
        .installed.join(", ")
    )]
    IndeterminateActiveVersion { name: String, installed: Vec<String> },
}

/// An action the wrapped tool failed to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("action {} ({action}) failed: {diagnostic}", .index + 1)]
pub struct ExecutionFailure {
    /// Zero-based position of the failed action in the plan
    pub index: usize,
    pub action: Action,
    /// The wrapped tool's raw diagnostic text
    pub diagnostic: String,
    pub category: ErrorCategory,
    /// Actions that succeeded before the failure
    pub applied: Vec<Action>,
}

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("environment {name} still has packages installed: {}", .packages.join(", "))]
    EnvironmentInUse { name: String, packages: Vec<String> },

    #[error(transparent)]
    Execution(#[from] ExecutionFailure),

    #[error(transparent)]
    Tool(#[from] pkgkit::Error),

    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Short machine-readable kind, used in structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Planning(_) => "planning",
            Error::EnvironmentInUse { .. } => "environment_in_use",
            Error::Execution(_) => "execution",
            Error::Tool(_) => "tool",
            Error::ThreadPool(_) => "internal",
        }
    }

    /// Category of the underlying tool failure, if any.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Error::Execution(failure) => Some(failure.category),
            Error::Tool(e) => Some(e.category()),
            _ => None,
        }
    }

    /// Whether the error was raised before anything touched the host.
    pub fn is_side_effect_free(&self) -> bool {
        !matches!(self, Error::Execution(_))
    }
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, Error>;
