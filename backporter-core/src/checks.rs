//! GitHub check-run data model and the mapping that mirrors a backport
//! branch's CI results onto the pull request's head commit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::refname::BackportRef;
use crate::Error;

/// Marker prefix identifying check runs that this tool created on a pull
/// request's head commit. Anything without it is left untouched.
pub const BACKPORT_MARKER: &str = "BACKPORT";

const IDENTITY_SEPARATOR: char = '$';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    ActionRequired,
    Cancelled,
    Failure,
    Neutral,
    Success,
    Skipped,
    Stale,
    TimedOut,
}

/// Output block as returned by the check-runs API. All three text fields
/// are nullable on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckRunOutput {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub annotations_count: u32,
}

/// An existing check run, as listed on a commit or a check suite.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub head_sha: String,
    pub details_url: Option<String>,
    #[serde(default)]
    pub external_id: String,
    pub status: Option<CheckStatus>,
    pub conclusion: Option<CheckConclusion>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output: CheckRunOutput,
}

impl CheckRun {
    /// Whether this run was previously created by the backporter.
    pub fn is_backport_check(&self) -> bool {
        CheckRunIdentity::parse(&self.external_id).is_some()
    }
}

/// The idempotency key for check runs mirrored onto a pull request:
/// serialized into the check run's `external_id` field as
/// `BACKPORT$branch$workflow$check`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckRunIdentity {
    pub target_branch: String,
    pub workflow_name: String,
    pub check_name: String,
}

impl CheckRunIdentity {
    pub fn external_id(&self) -> String {
        let mut out = String::from(BACKPORT_MARKER);
        for part in [&self.target_branch, &self.workflow_name, &self.check_name] {
            out.push(IDENTITY_SEPARATOR);
            out.push_str(part);
        }
        out
    }

    /// Parse a marker-prefixed external id. Returns `None` for external
    /// ids belonging to other tools, which is not an error: foreign check
    /// runs simply aren't ours to manage.
    pub fn parse(external_id: &str) -> Option<CheckRunIdentity> {
        let mut parts = external_id.splitn(4, IDENTITY_SEPARATOR);
        if parts.next() != Some(BACKPORT_MARKER) {
            return None;
        }
        let target_branch = parts.next()?.to_string();
        let workflow_name = parts.next()?.to_string();
        let check_name = parts.next()?.to_string();
        Some(CheckRunIdentity {
            target_branch,
            workflow_name,
            check_name,
        })
    }
}

/// Output block for check-run create/update requests. Unlike the read
/// side these fields are mandatory: the API rejects null strings here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRunPayloadOutput {
    pub title: String,
    pub summary: String,
    pub text: String,
}

/// Body of a check-run create (POST) or update (PATCH) request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckRunPayload {
    pub name: String,
    pub head_sha: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<CheckConclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub output: CheckRunPayloadOutput,
}

impl CheckRunPayload {
    /// Build the pull-request-side copy of a check run observed on a
    /// backport branch: renamed to carry the branch and workflow, keyed
    /// by its [`CheckRunIdentity`], and attached to the pull request's
    /// head commit instead of the backport branch's.
    ///
    /// Every field of the source is either carried over or deliberately
    /// replaced here; the struct literal keeps that decision exhaustive.
    pub fn for_pull_request(
        source: &CheckRun,
        workflow_name: &str,
        origin: &BackportRef,
        head_sha: &str,
    ) -> CheckRunPayload {
        let name = format!(
            "{}: {} - {}",
            origin.target_branch, workflow_name, source.name
        );
        let identity = CheckRunIdentity {
            target_branch: origin.target_branch.clone(),
            workflow_name: workflow_name.to_string(),
            check_name: source.name.clone(),
        };

        let default_summary = format!(
            "Run of {} - {} on Pull Request #{} (run #{} with git hash {}) backported to {}.\n",
            workflow_name,
            source.name,
            origin.pr_id,
            origin.sequence_id,
            origin.short_hash,
            origin.target_branch
        );
        let summary = source
            .output
            .summary
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_summary.clone());
        let title = source
            .output
            .title
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| name.clone());
        let text = source
            .output
            .text
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| summary.clone());

        CheckRunPayload {
            name,
            head_sha: head_sha.to_string(),
            external_id: identity.external_id(),
            details_url: source.details_url.clone(),
            status: source.status,
            conclusion: source.conclusion,
            started_at: source.started_at,
            completed_at: source.completed_at,
            output: CheckRunPayloadOutput {
                title,
                summary,
                text,
            },
        }
    }
}

/// One API call the reconciler must make for a source check run.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    Create(CheckRunPayload),
    Update(u64, CheckRunPayload),
}

/// Decide, for every check run observed on the backport branch, whether
/// its pull-request-side copy must be created or updated in place.
///
/// Destination checks carrying the backport marker are indexed by their
/// external id; a source check whose identity is already present becomes
/// an update of that run, so replaying the same workflow-run event never
/// duplicates a check. Destination checks without the marker are never
/// touched.
pub fn plan_check_updates(
    source_checks: &[CheckRun],
    dest_checks: &[CheckRun],
    workflow_name: &str,
    origin: &BackportRef,
    head_sha: &str,
) -> Vec<ReconcileAction> {
    let existing: HashMap<&str, u64> = dest_checks
        .iter()
        .filter(|c| c.is_backport_check())
        .map(|c| (c.external_id.as_str(), c.id))
        .collect();

    source_checks
        .iter()
        .map(|check| {
            let payload = CheckRunPayload::for_pull_request(check, workflow_name, origin, head_sha);
            match existing.get(payload.external_id.as_str()) {
                Some(&id) => ReconcileAction::Update(id, payload),
                None => ReconcileAction::Create(payload),
            }
        })
        .collect()
}

/// Check that every check run attached to the pull request's head commit
/// reports one and the same sha, and that it extends the abbreviation we
/// looked the commit up by. Multiple head shas mean the head moved
/// without the sequence being re-run, which is unrecoverable.
pub fn verify_single_head_sha(checks: &[CheckRun], short_hash: &str) -> Result<String, Error> {
    let mut head_sha: Option<&str> = None;
    for check in checks {
        match head_sha {
            None => head_sha = Some(&check.head_sha),
            Some(seen) if seen == check.head_sha => {}
            Some(seen) => {
                return Err(Error::invariant(format!(
                    "pull request checks report multiple head shas: {} and {}",
                    seen, check.head_sha
                )));
            }
        }
    }
    let head_sha =
        head_sha.ok_or_else(|| Error::invariant("no check runs on pull request head commit"))?;
    if !head_sha.starts_with(short_hash) {
        return Err(Error::invariant(format!(
            "head sha {} does not extend short hash {}",
            head_sha, short_hash
        )));
    }
    Ok(head_sha.to_string())
}
