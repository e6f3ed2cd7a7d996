//! launch-node — provision one cloud node and bootstrap it with Ansible.

use std::process::ExitCode;

use clap::Parser;

use launch_cli::cli::LaunchArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let args = LaunchArgs::parse();
    match args.run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
