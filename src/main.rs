//! captionq: priority job queue for caption generation.
//!
//! This is the main entry point for the `captionq` CLI. It parses arguments,
//! sets up logging, dispatches to the appropriate command handler, and handles
//! errors with proper exit codes.

use captionq::cli::Cli;
use captionq::{commands, exit_codes, logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(err) = logging::init_logging(cli.verbose, cli.quiet) {
        eprintln!("Warning: {}", err);
    }

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            ExitCode::from(err.exit_code() as u8)
        }
    }
}
