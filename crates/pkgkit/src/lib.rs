//! # pkgkit
//!
//! Pure Rust wrappers around the command-line package managers that
//! `pkgstate` reconciles: Homebrew/Linuxbrew and conda.
//!
//! This crate provides:
//! - Locating the package manager executable on a search path
//! - Querying installed, linked and available versions of a package
//! - Driving installs, removals, links and upgrades one package at a time
//! - Classifying tool failures into actionable categories
//!
//! ## Example
//!
//! ```no_run
//! use pkgkit::{PackageRef, Tool, ToolOptions, backend};
//!
//! let options = ToolOptions::default().with_search_path("/home/linuxbrew/.linuxbrew/bin");
//! let brew = backend::for_tool(Tool::Brew, &options).expect("brew not available");
//!
//! if let Some(info) = brew.info(&PackageRef::new("samtools")).expect("query failed") {
//!     println!("installed: {:?}", info.installed_versions);
//! }
//! ```
//!
//! ## Testing
//!
//! [`MockBackend`] keeps package state in memory and can inject failures,
//! so callers can be tested without a package manager on the host.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod command;
pub mod error;
pub mod types;

pub use backend::Backend;
pub use backend::mock::MockBackend;
pub use error::{Error, ErrorCategory, Result};
pub use types::{PackageInfo, PackageRef, Tool, ToolOptions, UpdateOutcome};
