//! Status command handlers
//!
//! Shows request records and waits for requests to finish.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use echidna_core::domain::job::JobStatus;
use echidna_core::domain::request::{DocumentSource, RequestRecord};
use echidna_core::domain::state::RequestStatus;
use uuid::Uuid;

use crate::config::Config;

/// Polling options
#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Seconds between two status polls
    #[arg(long, default_value_t = 2)]
    pub interval: u64,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 1800)]
    pub timeout: u64,
}

/// Get and display a request
pub async fn show_status(config: &Config, id: Uuid, json: bool) -> Result<()> {
    let record = config
        .client()
        .status(id)
        .await
        .with_context(|| format!("Failed to get status of request {}", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }

    Ok(())
}

/// Wait for a request and display its final record
///
/// Fails when the request itself failed, so scripts can test the exit code.
pub async fn wait_for(config: &Config, id: Uuid, poll: &PollArgs) -> Result<()> {
    println!("{}", format!("Waiting for request {}...", id).dimmed());

    let record = config
        .client()
        .wait(
            id,
            Duration::from_secs(poll.interval),
            Duration::from_secs(poll.timeout),
        )
        .await?;

    print_record(&record);

    if record.results.status() == RequestStatus::Failure {
        bail!("Request {} failed", id);
    }
    Ok(())
}

/// Print a request record with one line per job
pub fn print_record(record: &RequestRecord) {
    let (kind, subject) = match &record.source {
        DocumentSource::Url(url) => ("URL:", url),
        DocumentSource::Tar(name) => ("Archive:", name),
    };

    println!("{}", "Request Details:".bold());
    println!("  ID:        {}", record.id.to_string().cyan());
    println!("  {:<10} {}", kind, subject);
    println!("  Decision:  {}", record.decision.dimmed());
    println!(
        "  Versions:  echidna {}, specberus {}",
        record.version, record.version_specberus
    );
    println!(
        "  Status:    {}",
        colorize_request_status(record.results.status())
    );

    println!("\n{}", "Jobs:".bold());
    for (name, job) in record.results.jobs() {
        println!("  {:<22} {}", name.as_str(), colorize_job_status(job.status));
        for error in &job.errors {
            println!("      {}", error.red());
        }
    }
}

fn colorize_request_status(status: RequestStatus) -> ColoredString {
    let status_str = status.to_string().to_uppercase();
    match status {
        RequestStatus::Running => status_str.cyan(),
        RequestStatus::Success => status_str.green(),
        RequestStatus::Failure => status_str.red(),
    }
}

/// Colorize job status for display
fn colorize_job_status(status: JobStatus) -> ColoredString {
    let status_str = status.as_str();
    match status {
        JobStatus::Pending => status_str.dimmed(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Success => status_str.green(),
        JobStatus::Failure => status_str.red(),
        JobStatus::Warning => status_str.yellow(),
    }
}
