//! # Converge
//!
//! Package-state reconciliation for command-line package managers.
//!
//! Given a declaration of how a package should be (present at a version,
//! absent, linked, unlinked, built from head, or latest), this crate
//! observes what is installed, computes the minimal actions that close the
//! gap, and applies them one at a time.
//!
//! ## Pipeline
//!
//! - **Validation** ([`spec::validate`]): raw [`Declaration`] -> [`DesiredStateSpec`]
//! - **Inspector** ([`Inspector`]): read-only [`ObservedState`] from a backend
//! - **Planner** ([`plan`]): pure function of spec + observation -> [`ActionPlan`]
//! - **Executor** ([`execute`]): applies actions, halting at the first failure
//! - **Environments** ([`EnvironmentManager`]): named environments that scope packages
//!
//! [`Reconciler`] wires these together and drives batches in parallel.
//!
//! ## Example
//!
//! ```
//! use converge::{Declaration, ExecuteOptions, NoProgress, Reconciler};
//! use pkgkit::{MockBackend, Tool};
//!
//! let backend = MockBackend::new(Tool::Brew).with_available("jq", "1.7");
//! let reconciler = Reconciler::new(&backend, ExecuteOptions::default());
//!
//! let outcome = reconciler.reconcile_declaration(&Declaration::new("jq"), &mut NoProgress);
//! assert!(outcome.changed);
//! assert_eq!(outcome.version_installed.as_deref(), Some("1.7"));
//!
//! // Running again changes nothing
//! let again = reconciler.reconcile_declaration(&Declaration::new("jq"), &mut NoProgress);
//! assert!(!again.changed);
//! ```
//!
//! ## Limitations
//!
//! Dependencies are resolved by the wrapped package manager; their versions
//! are never pinned. Every outcome that changed the host carries
//! [`DEPENDENCY_NOTE`] as a warning.

pub mod context;
pub mod environment;
pub mod error;
pub mod executor;
pub mod inspector;
pub mod planner;
pub mod reconciler;
pub mod spec;
pub mod types;

// Re-export main types at crate root
pub use context::{ExecuteOptions, LogProgress, NoProgress, ProgressCallback};
pub use environment::EnvironmentManager;
pub use error::{Error, ExecutionFailure, PlanningError, Result, ValidationError};
pub use executor::execute;
pub use inspector::Inspector;
pub use planner::{HEAD_WARNING, plan};
pub use reconciler::{DEPENDENCY_NOTE, FileOutcome, Reconciler, ToolOutcome};
pub use spec::{BatchDeclaration, Declaration, DeclarationFile, validate, validate_batch};
pub use types::{
    Action, ActionPlan, BatchOutcome, DesiredStateSpec, EnvironmentOutcome, EnvironmentSpec,
    EnvironmentState, ExecutionResult, LifecycleState, ObservedState, PackageIdentity,
    ReconcileOutcome,
};
