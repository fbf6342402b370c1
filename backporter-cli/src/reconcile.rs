//! Mirror check runs from a backport branch back onto the pull
//! request's head commit, keyed by external id so re-delivery of the
//! same event updates in place.

use anyhow::Result;
use tracing::info;

use backporter_core::{checks, refname, BackportRef, ReconcileAction};

use crate::config::Config;
use crate::event::WorkflowRun;
use crate::github::GitHubClient;

pub async fn handle_workflow_run(
    config: &Config,
    client: &GitHubClient,
    run: &WorkflowRun,
) -> Result<()> {
    if !run
        .head_branch
        .starts_with(&format!("{}/", refname::NAMESPACE))
    {
        info!(
            "Workflow run on '{}' is not a backport branch, nothing to do",
            run.head_branch
        );
        return Ok(());
    }

    let origin = BackportRef::decode(&run.head_branch)?;
    info!(
        "Workflow run comes from backport of pull request #{} run #{} (with git hash {}) to {}",
        origin.pr_id, origin.sequence_id, origin.short_hash, origin.target_branch
    );

    let dest_checks = client
        .list_commit_check_runs(&config.repo_slug, &origin.short_hash)
        .await?;
    let head_sha = checks::verify_single_head_sha(&dest_checks, &origin.short_hash)?;

    let source_checks = client.list_check_suite_runs(&run.check_suite_url).await?;
    let actions =
        checks::plan_check_updates(&source_checks, &dest_checks, &run.name, &origin, &head_sha);

    for action in actions {
        match action {
            ReconcileAction::Update(id, payload) => {
                info!("Updating check run {} ({})", payload.name, id);
                client
                    .update_check_run(&config.repo_slug, id, &payload)
                    .await?;
            }
            ReconcileAction::Create(payload) => {
                info!("Creating check run {}", payload.name);
                client.create_check_run(&config.repo_slug, &payload).await?;
            }
        }
    }
    Ok(())
}
