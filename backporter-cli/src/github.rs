//! GitHub REST API client for the handful of endpoints the backporter
//! needs: pull request metadata and patches, issue comments, and check
//! runs.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use backporter_core::{CheckRun, CheckRunPayload};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "backporter";

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest {
    body: String,
}

#[derive(Debug, Serialize)]
struct UpdateIssueRequest {
    state: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub head: PullRequestHead,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
    pub label: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunsResponse {
    check_runs: Vec<CheckRun>,
}

impl GitHubClient {
    pub fn new(token: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GitHubClient { client, token })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn check_response(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("GitHub API error ({}): {} - {}", what, status, error_text);
            return Err(anyhow!(
                "GitHub API error ({}): {} - {}",
                what,
                status,
                error_text
            ));
        }
        Ok(response)
    }

    pub async fn get_pull_request(&self, repo: &str, number: u64) -> Result<PullRequestSummary> {
        let url = format!("{}/repos/{}/pulls/{}", API_BASE, repo, number);
        let response = self.get(&url).send().await.context("Failed to fetch PR")?;
        let response = Self::check_response(response, "get pull request").await?;
        response.json().await.context("Failed to parse PR response")
    }

    pub async fn list_open_pull_requests(&self, repo: &str) -> Result<Vec<PullRequestSummary>> {
        let url = format!(
            "{}/repos/{}/pulls?state=open&per_page=100",
            API_BASE, repo
        );
        let response = self
            .get(&url)
            .send()
            .await
            .context("Failed to list pull requests")?;
        let response = Self::check_response(response, "list pull requests").await?;
        response
            .json()
            .await
            .context("Failed to parse pull request list")
    }

    /// Fetch the PR as a mailbox-format patch, served from the web
    /// frontend rather than the REST API.
    pub async fn get_pull_request_patch(&self, repo: &str, number: u64) -> Result<String> {
        let url = format!("https://github.com/{}/pull/{}.patch", repo, number);
        info!("Fetching patch from {}", url);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .context("Failed to fetch PR patch")?;
        let response = Self::check_response(response, "get patch").await?;
        response.text().await.context("Failed to read patch body")
    }

    pub async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> Result<()> {
        let url = format!("{}/repos/{}/issues/{}/comments", API_BASE, repo, number);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&CreateCommentRequest {
                body: body.to_string(),
            })
            .send()
            .await
            .context("Failed to post comment")?;
        Self::check_response(response, "create comment").await?;
        Ok(())
    }

    pub async fn close_issue(&self, repo: &str, number: u64) -> Result<()> {
        let url = format!("{}/repos/{}/issues/{}", API_BASE, repo, number);
        let response = self
            .client
            .patch(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&UpdateIssueRequest {
                state: "closed".to_string(),
            })
            .send()
            .await
            .context("Failed to close issue")?;
        Self::check_response(response, "close issue").await?;
        Ok(())
    }

    /// Check runs recorded against a commit, addressed by any unique
    /// prefix of its sha.
    pub async fn list_commit_check_runs(&self, repo: &str, committish: &str) -> Result<Vec<CheckRun>> {
        let url = format!(
            "{}/repos/{}/commits/{}/check-runs?per_page=100",
            API_BASE, repo, committish
        );
        let response = self
            .get(&url)
            .send()
            .await
            .context("Failed to list commit check runs")?;
        let response = Self::check_response(response, "list commit check runs").await?;
        let parsed: CheckRunsResponse = response
            .json()
            .await
            .context("Failed to parse check runs")?;
        Ok(parsed.check_runs)
    }

    /// Check runs belonging to a check suite, addressed by the suite URL
    /// the workflow_run event carries.
    pub async fn list_check_suite_runs(&self, check_suite_url: &str) -> Result<Vec<CheckRun>> {
        let url = format!("{}/check-runs?per_page=100", check_suite_url);
        let response = self
            .get(&url)
            .send()
            .await
            .context("Failed to list check suite runs")?;
        let response = Self::check_response(response, "list check suite runs").await?;
        let parsed: CheckRunsResponse = response
            .json()
            .await
            .context("Failed to parse check runs")?;
        Ok(parsed.check_runs)
    }

    pub async fn create_check_run(&self, repo: &str, payload: &CheckRunPayload) -> Result<()> {
        let url = format!("{}/repos/{}/check-runs", API_BASE, repo);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(payload)
            .send()
            .await
            .context("Failed to create check run")?;
        Self::check_response(response, "create check run").await?;
        Ok(())
    }

    pub async fn update_check_run(
        &self,
        repo: &str,
        check_run_id: u64,
        payload: &CheckRunPayload,
    ) -> Result<()> {
        let url = format!("{}/repos/{}/check-runs/{}", API_BASE, repo, check_run_id);
        let response = self
            .client
            .patch(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(payload)
            .send()
            .await
            .context("Failed to update check run")?;
        Self::check_response(response, "update check run").await?;
        Ok(())
    }
}
