use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backporter::cleanup;
use backporter::event::EventPayload;
use backporter::pipeline::{self, PipelineOutcome};
use backporter::promote;
use backporter::reconcile;
use backporter::{Config, GitHubClient};

/// Backporter: replays pull requests across maintained release branches
#[derive(Parser, Debug)]
#[command(name = "backporter")]
#[command(about = "Backports pull requests onto release branches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Handle a GitHub Actions event (pull_request or workflow_run)
    Event(EventArgs),
    /// Delete backport refs belonging to closed pull requests
    Cleanup,
    /// Merge a pull request's latest backport sequence into the real branches
    Promote(PromoteArgs),
}

#[derive(Parser, Debug)]
struct EventArgs {
    /// Path to the event payload (defaults to GITHUB_EVENT_PATH)
    #[arg(long)]
    event_path: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PromoteArgs {
    /// Pull request number to promote
    #[arg(long)]
    pr: u64,
}

async fn handle_event(config: &Config, client: &GitHubClient, args: EventArgs) -> Result<()> {
    let path = match args.event_path {
        Some(path) => path,
        None => std::env::var("GITHUB_EVENT_PATH")
            .map(PathBuf::from)
            .context("GITHUB_EVENT_PATH is not set and --event-path was not given")?,
    };
    let payload = EventPayload::from_file(&path)?;

    if let Some(run) = &payload.workflow_run {
        return reconcile::handle_workflow_run(config, client, run).await;
    }

    if let Some(pr) = &payload.pull_request {
        info!(
            "Handling pull request #{} ({})",
            pr.number,
            payload.action.as_deref().unwrap_or("unknown action")
        );
        match pipeline::handle_pull_request(config, client, pr).await? {
            PipelineOutcome::UpToDate => info!("Nothing to do"),
            PipelineOutcome::Completed { pushed } => {
                info!("Backported to {} branches", pushed.len());
            }
            PipelineOutcome::PushRejected => {
                warn!("Backport refs could not be pushed (no write access); giving up cleanly");
            }
            PipelineOutcome::NothingApplied => {
                bail!("patch for PR #{} did not apply to any branch", pr.number);
            }
        }
        return Ok(());
    }

    Err(anyhow!("event payload has neither pull_request nor workflow_run"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let client = GitHubClient::new(config.github_token.clone())?;

    match cli.command {
        Commands::Event(args) => handle_event(&config, &client, args).await,
        Commands::Cleanup => cleanup::cleanup_closed_pull_requests(&config, &client).await,
        Commands::Promote(args) => promote::promote_pull_request(&config, &client, args.pr).await,
    }
}
