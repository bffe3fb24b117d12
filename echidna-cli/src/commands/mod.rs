//! Commands module
//!
//! Defines all CLI commands and their handlers.

pub mod status;
pub mod submit;
mod version;

pub use status::PollArgs;
pub use submit::SubmitCommands;

use anyhow::Result;
use clap::Subcommand;
use uuid::Uuid;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a document for publication
    Submit {
        #[command(subcommand)]
        command: SubmitCommands,
    },
    /// Show the current state of a request
    Status {
        /// Request ID
        id: Uuid,

        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },
    /// Wait until a request finishes
    Wait {
        /// Request ID
        id: Uuid,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Show the service versions
    Version,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit { command } => submit::handle_submit_command(command, config).await,
        Commands::Status { id, json } => status::show_status(config, id, json).await,
        Commands::Wait { id, poll } => status::wait_for(config, id, &poll).await,
        Commands::Version => version::show_versions(config).await,
    }
}
