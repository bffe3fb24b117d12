//! Echidna CLI
//!
//! Command-line interface for submitting documents to Echidna and following
//! their publication requests.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "echidna")]
#[command(about = "Echidna publication CLI", long_about = None)]
struct Cli {
    /// Echidna service URL
    #[arg(long, env = "ECHIDNA_URL", default_value = "http://localhost:3000")]
    echidna_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        echidna_url: cli.echidna_url,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::submit::SubmitCommands;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit_url() {
        let cli = Cli::try_parse_from([
            "echidna",
            "--echidna-url",
            "http://echidna.test",
            "submit",
            "url",
            "https://example.org/doc",
            "--token",
            "abc",
            "--decision",
            "https://lists.w3.org/decision",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.echidna_url, "http://echidna.test");
        match cli.command {
            Commands::Submit {
                command: SubmitCommands::Url { url, args, .. },
            } => {
                assert_eq!(url, "https://example.org/doc");
                assert!(args.dry_run);
                assert!(!args.wait);
            }
            _ => panic!("expected submit url"),
        }
    }

    #[test]
    fn test_parse_submit_tar_requires_auth() {
        let result = Cli::try_parse_from([
            "echidna",
            "submit",
            "tar",
            "spec.tar",
            "--decision",
            "d",
        ]);
        assert!(result.is_err());

        let result = Cli::try_parse_from([
            "echidna", "submit", "tar", "spec.tar", "--decision", "d", "--token", "abc", "--user",
            "alice",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_status_rejects_bad_id() {
        assert!(Cli::try_parse_from(["echidna", "status", "not-a-uuid"]).is_err());
    }
}
