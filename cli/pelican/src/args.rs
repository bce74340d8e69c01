//! CLI argument definitions for pelican.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// A fast and efficient stream file uploader.
#[derive(Parser, Debug)]
#[command(name = "pelican")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload files to remote storage
    Upload(UploadArgs),
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "PELICAN_CONFIG")]
    pub config: PathBuf,

    /// Poll for marker files; pass `--poll=false` for a single scan pass
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub poll: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_defaults_to_true() {
        let cli = Cli::parse_from(["pelican", "upload", "--config", "/etc/pelican.yaml"]);
        let Command::Upload(args) = cli.command;
        assert!(args.poll);
        assert_eq!(args.config, PathBuf::from("/etc/pelican.yaml"));
    }

    #[test]
    fn test_poll_can_be_disabled() {
        let cli = Cli::parse_from([
            "pelican",
            "upload",
            "--config",
            "/etc/pelican.yaml",
            "--poll=false",
        ]);
        let Command::Upload(args) = cli.command;
        assert!(!args.poll);
    }

    #[test]
    fn test_config_is_required() {
        assert!(Cli::try_parse_from(["pelican", "upload"]).is_err());
    }
}
