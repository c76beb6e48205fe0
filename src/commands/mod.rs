//! CLI command implementations for sysload-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Counter source validation and topology discovery
//! - `config`: Configuration file generation
//! - `test`: Sampling loop dry run

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use test::command_test;
