//! Main entry point for the zlite CLI app

use zlite::cli_runner::{self, RunStatus};

fn main() -> std::process::ExitCode {
    match cli_runner::run_cli_app() {
        Ok(RunStatus::Success) => std::process::ExitCode::SUCCESS,
        Ok(RunStatus::Partial) => std::process::ExitCode::from(2),
        Err(e) => {
            if e.downcast_ref::<clap::Error>().is_none() {
                eprintln!("Error: {}", e);
            }
            std::process::ExitCode::FAILURE
        }
    }
}
