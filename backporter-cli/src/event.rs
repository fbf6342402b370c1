//! GitHub Actions event payloads. The runner hands us the raw webhook
//! JSON via a file path in `GITHUB_EVENT_PATH`; we only model the fields
//! the pipeline and the reconciler actually read.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct EventPayload {
    pub action: Option<String>,
    pub pull_request: Option<PullRequest>,
    pub workflow_run: Option<WorkflowRun>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub head: PullRequestRef,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestRef {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// `owner:branch`, as rendered in merge commit subjects.
    pub label: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowRun {
    pub name: String,
    pub head_branch: String,
    pub check_suite_url: String,
}

impl EventPayload {
    pub fn from_file(path: &Path) -> Result<EventPayload> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event payload from {}", path.display()))?;
        serde_json::from_str(&raw).context("Failed to parse event payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pull_request_event() {
        let raw = r#"{
            "action": "synchronize",
            "pull_request": {
                "number": 17,
                "title": "Fix widget",
                "body": null,
                "head": {
                    "sha": "c618a60a9f06d047b5d9434c7e28a80f667706f5",
                    "ref": "fix-widget",
                    "label": "octo:fix-widget"
                }
            },
            "repository": { "name": "widgets", "full_name": "octo/widgets" }
        }"#;
        let payload: EventPayload = serde_json::from_str(raw).unwrap();
        let pr = payload.pull_request.unwrap();
        assert_eq!(pr.number, 17);
        assert_eq!(pr.body, None);
        assert_eq!(pr.head.ref_name, "fix-widget");
        assert_eq!(pr.head.label, "octo:fix-widget");
        assert!(payload.workflow_run.is_none());
    }

    #[test]
    fn test_parse_workflow_run_event() {
        let raw = r#"{
            "action": "completed",
            "workflow_run": {
                "name": "CI",
                "head_branch": "backport/pr17/v0-c618a/branch-1.0.1",
                "check_suite_url": "https://api.github.com/repos/octo/widgets/check-suites/99"
            },
            "repository": { "name": "widgets", "full_name": "octo/widgets" }
        }"#;
        let payload: EventPayload = serde_json::from_str(raw).unwrap();
        let run = payload.workflow_run.unwrap();
        assert_eq!(run.name, "CI");
        assert!(run.head_branch.starts_with("backport/"));
    }
}
