//! Submit command handlers
//!
//! Sends publication requests by URL or as a tar archive.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{ArgGroup, Args, Subcommand};
use colored::*;
use echidna_client::TarAuth;
use uuid::Uuid;

use crate::commands::status::{PollArgs, wait_for};
use crate::config::Config;

/// Options shared by every submission
#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// URL of the publication decision
    #[arg(long)]
    pub decision: String,

    /// Run every check but do not publish
    #[arg(long)]
    pub dry_run: bool,

    /// Extra recipient of the notification
    #[arg(long)]
    pub cc: Option<String>,

    /// Wait for the request to finish
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub poll: PollArgs,
}

/// Submit subcommands
#[derive(Subcommand)]
pub enum SubmitCommands {
    /// Submit a document by URL
    Url {
        /// URL of the document or its manifest
        url: String,

        /// Publication token
        #[arg(long)]
        token: String,

        #[command(flatten)]
        args: SubmitArgs,
    },
    /// Upload a tar archive
    #[command(group(ArgGroup::new("auth").required(true).args(["token", "user"])))]
    Tar {
        /// Archive to upload
        path: PathBuf,

        /// Publication token
        #[arg(long)]
        token: Option<String>,

        /// W3C account name
        #[arg(long)]
        user: Option<String>,

        /// W3C account password
        #[arg(long, env = "ECHIDNA_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[command(flatten)]
        args: SubmitArgs,
    },
}

/// Handle submit commands
pub async fn handle_submit_command(command: SubmitCommands, config: &Config) -> Result<()> {
    let client = config.client();

    let (id, args) = match command {
        SubmitCommands::Url { url, token, args } => {
            let id = client
                .submit_url(&url, &token, &args.decision, args.dry_run, args.cc.as_deref())
                .await
                .context("Failed to submit URL")?;
            (id, args)
        }
        SubmitCommands::Tar {
            path,
            token,
            user,
            password,
            args,
        } => {
            let auth = tar_auth(token, user, password)?;
            let id = client
                .submit_tar(&path, auth, &args.decision, args.dry_run, args.cc.as_deref())
                .await
                .with_context(|| format!("Failed to submit {}", path.display()))?;
            (id, args)
        }
    };

    print_accepted(id, args.dry_run);

    if args.wait {
        wait_for(config, id, &args.poll).await?;
    }

    Ok(())
}

/// Authorization of a tar upload from the command-line options
fn tar_auth(
    token: Option<String>,
    user: Option<String>,
    password: Option<String>,
) -> Result<TarAuth> {
    match (token, user) {
        (Some(token), None) => Ok(TarAuth::Token(token)),
        (None, Some(username)) => {
            let password = password
                .ok_or_else(|| anyhow!("--password (or ECHIDNA_PASSWORD) is required with --user"))?;
            Ok(TarAuth::Credentials { username, password })
        }
        _ => Err(anyhow!("Use either --token or --user")),
    }
}

fn print_accepted(id: Uuid, dry_run: bool) {
    println!("{}", "✓ Request accepted".green());
    println!("  ID: {}", id.to_string().cyan());
    if dry_run {
        println!("  {}", "Dry run: nothing will be published".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tar_auth_token() {
        let auth = tar_auth(Some("abc".to_string()), None, None).unwrap();
        assert!(matches!(auth, TarAuth::Token(token) if token == "abc"));
    }

    #[test]
    fn test_tar_auth_credentials() {
        let auth = tar_auth(None, Some("alice".to_string()), Some("secret".to_string())).unwrap();
        assert!(matches!(
            auth,
            TarAuth::Credentials { username, password } if username == "alice" && password == "secret"
        ));

        assert!(tar_auth(None, Some("alice".to_string()), None).is_err());
        assert!(tar_auth(None, None, None).is_err());
    }
}
