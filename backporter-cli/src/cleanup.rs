//! Garbage-collect the `backport/` namespace: refs belonging to pull
//! requests that are no longer open get deleted from the remote.

use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use backporter_core::{refname, BackportRef};

use crate::config::Config;
use crate::git::{self, GitRepo};
use crate::github::GitHubClient;

pub async fn cleanup_closed_pull_requests(config: &Config, client: &GitHubClient) -> Result<()> {
    let pattern = format!("{}/*", refname::NAMESPACE);
    let refs = git::ls_remote(&config.remote_url(), &pattern)?;
    if refs.is_empty() {
        info!("No backport refs on the remote, nothing to clean");
        return Ok(());
    }

    let open: HashSet<u64> = client
        .list_open_pull_requests(&config.repo_slug)
        .await?
        .into_iter()
        .map(|pr| pr.number)
        .collect();
    info!("Open pull requests: {:?}", open);

    let repo = GitRepo::clone_blobless(&config.remote_url(), &config.clone_dir())?;
    repo.configure_auth(&config.github_token)?;

    for (_, name) in refs {
        // A ref in the namespace that does not decode means the
        // namespace is corrupted; deleting it blindly could destroy
        // state we do not understand.
        let decoded = BackportRef::decode(&name)?;
        if open.contains(&decoded.pr_id) {
            info!("Keeping {} (pull request #{} still open)", name, decoded.pr_id);
            continue;
        }
        info!("Deleting {}", name);
        repo.push_delete(&name)?;
    }
    Ok(())
}
