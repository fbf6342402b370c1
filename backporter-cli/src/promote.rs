//! Promote a pull request's latest backport sequence: fast-forward every
//! real branch to its published backport ref, drop the namespace, and
//! close the pull request.

use anyhow::{anyhow, Result};
use tracing::info;

use backporter_core::BackportRef;

use crate::config::Config;
use crate::git::{self, GitRepo};
use crate::github::GitHubClient;
use crate::pipeline;

const CLOSE_COMMENT: &str = "Thank you for your pull request. This pull request will be closed, \
because the Pull-Request Merger has successfully applied it internally to all branches.\n";

pub async fn promote_pull_request(
    config: &Config,
    client: &GitHubClient,
    pr_id: u64,
) -> Result<()> {
    let history = pipeline::fetch_history(&config.remote_url(), pr_id)?;
    let entry = history
        .entries()
        .iter()
        .rev()
        .find(|e| !e.is_placeholder())
        .ok_or_else(|| anyhow!("pull request #{} has no published backports", pr_id))?;
    let short_hash = entry
        .short_hash
        .as_deref()
        .ok_or_else(|| anyhow!("sequence {} has no hash", entry.sequence_id))?;
    let branches = entry
        .branches
        .as_ref()
        .ok_or_else(|| anyhow!("sequence {} has no branches", entry.sequence_id))?;
    info!(
        "Promoting sequence v{}-{} of pull request #{}",
        entry.sequence_id, short_hash, pr_id
    );

    let repo = GitRepo::clone_blobless(&config.remote_url(), &config.clone_dir())?;
    repo.configure_auth(&config.github_token)?;
    repo.fetch()?;

    for branch in branches.keys() {
        let source = BackportRef {
            pr_id,
            sequence_id: entry.sequence_id,
            short_hash: short_hash.to_string(),
            target_branch: branch.clone(),
        }
        .encode();
        info!("Resetting {} to {}", branch, source);
        repo.clean()?;
        repo.checkout(branch)?;
        repo.reset_hard(&format!("origin/{}", source))?;
        repo.push_force(branch, branch)?;
    }

    // The namespace for this PR is now fully merged; drop it.
    let pattern = format!("{}/*", BackportRef::pr_namespace(pr_id));
    for (_, name) in git::ls_remote(&config.remote_url(), &pattern)? {
        info!("Deleting {}", name);
        repo.push_delete(&name)?;
    }

    client.close_issue(&config.repo_slug, pr_id).await?;
    client
        .create_issue_comment(&config.repo_slug, pr_id, CLOSE_COMMENT)
        .await?;
    Ok(())
}
