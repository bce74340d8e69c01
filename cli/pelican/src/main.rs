//! pelican CLI
//!
//! A fast and efficient stream file uploader: watches directory trees for
//! marker files, replicates each marker's group to the configured storage
//! backends, and removes the local copies once every backend succeeded.

use clap::Parser;

mod args;
mod logging;
mod profiling;
mod run;

use args::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Upload(upload_args) => {
            let exit_code = run::execute(upload_args).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
