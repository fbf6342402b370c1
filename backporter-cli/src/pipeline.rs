//! The backport pipeline: replay a pull request's patch across every
//! maintained release branch and publish the results into the
//! `backport/` ref namespace.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use backporter_core::{BackportRef, SequenceHistory, VersionGraph, SHORT_HASH_LEN};

use crate::config::Config;
use crate::event::PullRequest;
use crate::git::{self, ApplyOutcome, GitRepo};
use crate::github::GitHubClient;

/// One branch the patch landed on, with the commit we created there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchResult {
    pub branch: String,
    pub head: String,
}

/// A published backport ref, plus the base it diverged from (used for
/// the compare links in the PR comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedRef {
    pub branch: String,
    pub base: String,
    pub ref_name: String,
}

#[derive(Debug)]
pub enum PublishResult {
    Pushed(Vec<PushedRef>),
    /// The remote refused the pushes even after retrying. This is the
    /// normal state when the workflow runs against a fork without write
    /// access, so it is not an error.
    Rejected,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    UpToDate,
    Completed { pushed: Vec<PushedRef> },
    NothingApplied,
    PushRejected,
}

/// Read the PR's published sequence history off the remote.
pub fn fetch_history(remote_url: &str, pr_id: u64) -> Result<SequenceHistory> {
    let pattern = format!("{}/*", BackportRef::pr_namespace(pr_id));
    let refs = git::ls_remote(remote_url, &pattern)?;
    let mut decoded = Vec::with_capacity(refs.len());
    for (commit, name) in refs {
        decoded.push((BackportRef::decode(&name)?, commit));
    }
    Ok(SequenceHistory::build(decoded)?)
}

/// Message used for every commit the pipeline creates, mirroring what
/// GitHub would write for a merge of this PR.
pub fn commit_message(pr_id: u64, label: &str, title: &str, body: Option<&str>) -> String {
    let mut msg = format!("Merge pull request #{} from {}\n\n{}\n\n", pr_id, label, title);
    if let Some(body) = body {
        if !body.trim().is_empty() {
            msg.push_str(body);
        }
    }
    msg
}

/// Walk the release branches oldest-first, applying the patch on the
/// first branch it fits and merging each patched branch forward into the
/// next. Returns one result per branch that received a commit; empty
/// means the patch fit nowhere.
pub fn apply_patch_across_branches(
    repo: &GitRepo,
    graph: &VersionGraph,
    patch: &Path,
    msg_file: &Path,
) -> Result<Vec<BranchResult>> {
    let mut results: Vec<BranchResult> = Vec::new();

    for (i, version) in graph.versions().iter().enumerate() {
        let branch = graph.branch_name(*version);
        info!("Patching {}", branch);

        repo.checkout(&branch)?;
        repo.reset_hard(&format!("origin/{}", branch))?;
        repo.clean()?;

        // The raw patch is only applied until it lands somewhere; later
        // branches pick the change up through the forward merge.
        if results.is_empty() {
            if repo.apply_mailbox(patch)? == ApplyOutcome::Failed {
                info!("Patch does not apply on {}, skipping", branch);
                continue;
            }
        }

        if i > 0 {
            let prev = graph.previous_version(*version)?;
            repo.merge_no_commit(&format!("branch-{}", prev))?;
        }
        repo.commit_allow_empty(msg_file)?;

        results.push(BranchResult {
            head: repo.head()?,
            branch,
        });
    }

    if results.is_empty() {
        return Ok(results);
    }

    // The development branch gets the fully merged state of the newest
    // release branch.
    repo.recreate_branch("main")?;
    results.push(BranchResult {
        branch: "main".to_string(),
        head: repo.head()?,
    });
    Ok(results)
}

/// Push every patched branch to its hash-qualified ref under the PR's
/// namespace.
pub fn publish_backports(
    repo: &GitRepo,
    pr_id: u64,
    sequence_id: u32,
    short_hash: &str,
    results: &[BranchResult],
) -> Result<PublishResult> {
    let mut pushed = Vec::with_capacity(results.len());
    for result in results {
        let base = repo.rev_parse(&format!("origin/{}", result.branch))?;
        let target = BackportRef {
            pr_id,
            sequence_id,
            short_hash: short_hash.to_string(),
            target_branch: result.branch.clone(),
        }
        .encode();
        if let Err(e) = repo.push_ref(&result.branch, &target) {
            let message = format!("{:#}", e);
            if git::is_permission_denied(&message) {
                warn!("No permission to publish backport refs: {}", message);
                return Ok(PublishResult::Rejected);
            }
            return Err(e);
        }
        pushed.push(PushedRef {
            branch: result.branch.clone(),
            base,
            ref_name: target,
        });
    }
    Ok(PublishResult::Pushed(pushed))
}

/// PR comment announcing the published refs, with compare links for the
/// release branches. The development branch is omitted from the links.
pub fn comment_body(
    repo_slug: &str,
    sequence_id: u32,
    short_hash: &str,
    pushed: &[PushedRef],
) -> String {
    let mut body = format!(
        "The commits from this PR have been backported (version {} - {}) onto:\n",
        sequence_id, short_hash
    );
    for p in pushed {
        if p.branch == "main" {
            continue;
        }
        body.push_str(&format!(
            " - [{}](https://github.com/{}/compare/{}...{})\n",
            p.branch, repo_slug, p.base, p.ref_name
        ));
    }
    body
}

pub async fn handle_pull_request(
    config: &Config,
    client: &GitHubClient,
    pr: &PullRequest,
) -> Result<PipelineOutcome> {
    let short_hash = pr
        .head
        .sha
        .get(..SHORT_HASH_LEN)
        .ok_or_else(|| anyhow!("head sha '{}' is too short", pr.head.sha))?;
    info!("Source branch hash: {}", short_hash);

    let history = fetch_history(&config.remote_url(), pr.number)?;
    if history.is_up_to_date(short_hash) {
        info!("Existing backport branches up to date");
        for entry in history.entries() {
            let hash = entry.short_hash.as_deref().unwrap_or("<missing>");
            info!(" - Sequence: v{}-{}", entry.sequence_id, hash);
            for (name, commit) in entry.branches.iter().flatten() {
                info!("   * {} @ {}", name, &commit[..SHORT_HASH_LEN.min(commit.len())]);
            }
        }
        return Ok(PipelineOutcome::UpToDate);
    }

    let msg_path = config.work_dir.join(format!("commit-{}.msg", pr.number));
    std::fs::write(
        &msg_path,
        commit_message(pr.number, &pr.head.label, &pr.title, pr.body.as_deref()),
    )
    .with_context(|| format!("Failed to write {}", msg_path.display()))?;

    let patch = client
        .get_pull_request_patch(&config.repo_slug, pr.number)
        .await?;
    let patch_path = config.work_dir.join(format!("pr-{}.patch", pr.number));
    std::fs::write(&patch_path, &patch)
        .with_context(|| format!("Failed to write {}", patch_path.display()))?;

    let date = git::extract_patch_date(&patch)
        .ok_or_else(|| anyhow!("patch for PR #{} carries no Date header", pr.number))?;
    info!("Patch date is: {}", date);

    let mut repo = GitRepo::clone_blobless(&config.remote_url(), &config.clone_dir())?;
    repo.configure_auth(&config.github_token)?;
    repo.set_commit_date(Some(date));
    repo.fetch()?;

    let tags = repo.tags()?;
    let graph = VersionGraph::from_tags(tags.iter().map(|s| s.as_str()));
    info!("Will backport to: {:?}", graph.versions());

    let results = apply_patch_across_branches(&repo, &graph, &patch_path, &msg_path)?;
    if results.is_empty() {
        warn!("Patch was unable to be backported to any branch");
        return Ok(PipelineOutcome::NothingApplied);
    }

    let sequence_id = history.next_sequence_id();
    match publish_backports(&repo, pr.number, sequence_id, short_hash, &results)? {
        PublishResult::Rejected => Ok(PipelineOutcome::PushRejected),
        PublishResult::Pushed(pushed) => {
            let body = comment_body(&config.repo_slug, sequence_id, short_hash, &pushed);
            client
                .create_issue_comment(&config.repo_slug, pr.number, &body)
                .await?;
            Ok(PipelineOutcome::Completed { pushed })
        }
    }
}
