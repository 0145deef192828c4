// Reconciliation
pub mod apply;
pub mod env;
pub mod observe;

// Package manager and settings
pub mod config;
pub mod tool;
