//! CLI module for the fixtree tools
//!
//! This module provides the command-line interface to the module bundler.
//!
//! ## Commands
//!
//! - `combine <root>` - Bundle a module and its imports into one script
//! - `modules <root>` - List the module graph and any missing modules
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    /// The module graph is incomplete
    pub const MISSING: ExitCode = ExitCode(2);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Render a diagnostic through miette's report handler.
    pub fn diagnostic(err: impl miette::Diagnostic + Send + Sync + 'static, exit_code: ExitCode) -> Self {
        Self::new(format!("{:?}", miette::Report::new(err)), exit_code)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Tools for fixtree test suites
#[derive(Parser, Debug)]
#[command(name = "fixtree")]
#[command(version = VERSION)]
#[command(about = "Bundle test modules for fixtree suites", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bundle a module and everything it imports into one script
    Combine {
        /// Root module
        #[arg(value_name = "ROOT")]
        root: PathBuf,
        /// Write the bundle here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List the modules reachable from a root
    Modules {
        /// Root module
        #[arg(value_name = "ROOT")]
        root: PathBuf,
        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
pub fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Combine { root, output } => commands::combine(&root, output.as_deref()),
        Command::Modules { root, json } => commands::list_modules(&root, json),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_combine() {
        let cli = Cli::try_parse_from(["fixtree", "combine", "tests/d.js"]).unwrap();
        if let Command::Combine { root, output } = cli.command {
            assert_eq!(root, PathBuf::from("tests/d.js"));
            assert!(output.is_none());
        } else {
            panic!("Expected Combine command");
        }
    }

    #[test]
    fn test_cli_parse_combine_with_output() {
        let cli = Cli::try_parse_from(["fixtree", "combine", "d.js", "-o", "out.js"]).unwrap();
        if let Command::Combine { output, .. } = cli.command {
            assert_eq!(output, Some(PathBuf::from("out.js")));
        } else {
            panic!("Expected Combine command");
        }
    }

    #[test]
    fn test_cli_parse_modules() {
        let cli = Cli::try_parse_from(["fixtree", "modules", "d.js", "--json"]).unwrap();
        if let Command::Modules { json, .. } = cli.command {
            assert!(json);
        } else {
            panic!("Expected Modules command");
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["fixtree"]).is_err());
        assert!(Cli::try_parse_from(["fixtree", "combine"]).is_err());
    }

    #[test]
    fn test_cli_error_carries_exit_code() {
        let err = CliError::new("boom", ExitCode::MISSING);
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.exit_code, ExitCode(2));
        assert_eq!(CliError::failure("x").exit_code, ExitCode::FAILURE);
    }
}
