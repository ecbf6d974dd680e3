//! Error handling utilities
//!
//! This module provides centralized error handling for the application.

use tracing::error;

use crate::error::DeployError;

/// Exit status for an error that reached the top of the application
///
/// Configuration and validation problems exit with 2, everything else with 1.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<DeployError>()
        .map(DeployError::exit_code)
        .unwrap_or(1)
}

/// Handle fatal errors and exit with appropriate status code
///
/// # Verbose Mode Behavior
/// - `verbose = 0`: error message only
/// - `verbose >= 1`: includes the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    eprintln!("Error: {error}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code_for(&error))
}
