//! Thin wrapper over git porcelain. All operations are synchronous and
//! run against one local clone; pushes get a bounded retry, everything
//! else fails fast.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

const COMMITTER_NAME: &str = "GitHub Actions Bot";
const COMMITTER_EMAIL: &str = "actions_bot@github.com";

/// Bounded retry for transient git failures. Only pushes go through
/// this; local operations are deterministic and retrying them would just
/// repeat the same failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn run<T>(&self, what: &str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying: {:#}",
                        what, attempt, self.max_attempts, e
                    );
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "{} failed after {} attempts",
                        what, self.max_attempts
                    )))
                }
            }
        }
    }
}

/// Result of `git am`: the patch either applied or it did not. A failed
/// apply is an expected per-branch condition, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Failed,
}

pub struct GitRepo {
    dir: PathBuf,
    /// When set, author and committer dates of every commit we create are
    /// pinned to this value, so re-running a backport is byte-stable.
    commit_date: Option<String>,
    retry: RetryPolicy,
}

impl GitRepo {
    /// Clone `url` in blobless mode into `dir`, or reuse an existing
    /// clone left by a previous invocation.
    pub fn clone_blobless(url: &str, dir: &Path) -> Result<GitRepo> {
        if dir.exists() {
            info!("Reusing existing clone at {}", dir.display());
            return Ok(GitRepo::open(dir));
        }
        info!("Cloning {} into {}", url, dir.display());
        let output = Command::new("git")
            .args(["clone", "--filter=blob:none", url])
            .arg(dir)
            .output()
            .context("Failed to execute git clone")?;
        if !output.status.success() {
            return Err(anyhow!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(GitRepo::open(dir))
    }

    pub fn open(dir: &Path) -> GitRepo {
        GitRepo {
            dir: dir.to_path_buf(),
            commit_date: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn set_commit_date(&mut self, date: Option<String>) {
        self.commit_date = date;
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Inject the access token for https pushes via the extraheader
    /// mechanism, matching what actions/checkout does.
    pub fn configure_auth(&self, token: &str) -> Result<()> {
        let encoded = general_purpose::STANDARD.encode(format!("x-access-token:{}", token));
        self.run(&[
            "config",
            "http.https://github.com/.extraheader",
            &format!("AUTHORIZATION: basic {}", encoded),
        ])
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.dir)
            .env("GIT_COMMITTER_NAME", COMMITTER_NAME)
            .env("GIT_COMMITTER_EMAIL", COMMITTER_EMAIL)
            .env("GIT_AUTHOR_NAME", COMMITTER_NAME)
            .env("GIT_AUTHOR_EMAIL", COMMITTER_EMAIL);
        if let Some(date) = &self.commit_date {
            cmd.env("GIT_AUTHOR_DATE", date).env("GIT_COMMITTER_DATE", date);
        }
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        // Don't echo config values: the auth header lands there.
        if args.first() == Some(&"config") {
            info!("git config ...");
        } else {
            info!("git {}", args.join(" "));
        }
        let output = self
            .command(args)
            .output()
            .with_context(|| format!("Failed to execute git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }

    fn run_captured(&self, args: &[&str]) -> Result<String> {
        let output = self
            .command(args)
            .output()
            .with_context(|| format!("Failed to execute git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        String::from_utf8(output.stdout).context("git output is not valid UTF-8")
    }

    pub fn fetch(&self) -> Result<()> {
        self.run(&["fetch", "origin"])?;
        self.run(&["fetch", "origin", "--tags"])
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", branch])
    }

    /// `reset --hard` to an arbitrary committish, e.g. `origin/main`.
    pub fn reset_hard(&self, target: &str) -> Result<()> {
        self.run(&["reset", "--hard", target])
    }

    /// Remove tracked-then-modified and untracked/ignored drift.
    pub fn clean(&self) -> Result<()> {
        self.run(&["clean", "-f"])?;
        self.run(&["clean", "-x", "-f"])
    }

    /// Apply a mailbox-format patch. Failure leaves the branch untouched
    /// (the in-progress apply is aborted).
    pub fn apply_mailbox(&self, patch: &Path) -> Result<ApplyOutcome> {
        let patch = patch
            .to_str()
            .ok_or_else(|| anyhow!("patch path is not valid UTF-8"))?;
        match self.run(&["am", patch]) {
            Ok(()) => Ok(ApplyOutcome::Applied),
            Err(e) => {
                warn!("git am failed, aborting apply: {:#}", e);
                self.run(&["am", "--abort"])?;
                Ok(ApplyOutcome::Failed)
            }
        }
    }

    /// Merge another branch into the current one without committing, so
    /// the follow-up commit carries the supplied message.
    pub fn merge_no_commit(&self, branch: &str) -> Result<()> {
        self.run(&[
            "merge",
            branch,
            "--no-ff",
            "--no-commit",
            "--strategy=recursive",
        ])
    }

    /// Commit whatever is staged, empty or not, with the message file.
    pub fn commit_allow_empty(&self, msg_file: &Path) -> Result<()> {
        let msg_file = msg_file
            .to_str()
            .ok_or_else(|| anyhow!("message path is not valid UTF-8"))?;
        self.run(&["commit", "--allow-empty", "-F", msg_file])
    }

    pub fn head(&self) -> Result<String> {
        self.rev_parse("HEAD")
    }

    pub fn rev_parse(&self, committish: &str) -> Result<String> {
        Ok(self
            .run_captured(&["rev-parse", "--verify", committish])?
            .trim()
            .to_string())
    }

    /// Force-recreate a local branch at the current HEAD.
    pub fn recreate_branch(&self, name: &str) -> Result<()> {
        // The branch may not exist yet; that's fine.
        let _ = self.run(&["branch", "-D", name]);
        self.run(&["branch", name])
    }

    pub fn tags(&self) -> Result<Vec<String>> {
        Ok(self
            .run_captured(&["tag", "-l"])?
            .split_whitespace()
            .map(|s| s.to_string())
            .collect())
    }

    /// Push a local committish to a remote branch ref, with retry.
    pub fn push_ref(&self, local: &str, remote_ref: &str) -> Result<()> {
        let refspec = format!("{}:refs/heads/{}", local, remote_ref);
        self.retry
            .run("git push", || self.run(&["push", "origin", &refspec]))
    }

    pub fn push_force(&self, local: &str, remote_branch: &str) -> Result<()> {
        let refspec = format!("{}:refs/heads/{}", local, remote_branch);
        self.retry
            .run("git push -f", || self.run(&["push", "-f", "origin", &refspec]))
    }

    pub fn push_delete(&self, remote_ref: &str) -> Result<()> {
        let full = format!("refs/heads/{}", remote_ref);
        self.retry
            .run("git push --delete", || {
                self.run(&["push", "origin", "--delete", &full])
            })
    }
}

/// List remote refs matching a pattern, returning `(commit sha, name)`
/// with the `refs/heads/` prefix stripped. Refs outside `refs/heads/` are
/// ignored.
pub fn ls_remote(url: &str, pattern: &str) -> Result<Vec<(String, String)>> {
    let output = Command::new("git")
        .args(["ls-remote", url, pattern])
        .output()
        .context("Failed to execute git ls-remote")?;
    if !output.status.success() {
        return Err(anyhow!(
            "git ls-remote {} failed: {}",
            url,
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    let stdout = String::from_utf8(output.stdout).context("ls-remote output is not valid UTF-8")?;
    let mut refs = Vec::new();
    for line in stdout.lines() {
        let Some((sha, ref_name)) = line.split_once('\t') else {
            continue;
        };
        if let Some(name) = ref_name.strip_prefix("refs/heads/") {
            refs.push((sha.to_string(), name.to_string()));
        }
    }
    Ok(refs)
}

/// Pull the last `Date:` header out of a mailbox patch, used to pin the
/// dates of the commits the pipeline creates.
pub fn extract_patch_date(patch: &str) -> Option<String> {
    let mut date = None;
    for line in patch.lines() {
        if let Some(rest) = line.strip_prefix("Date: ") {
            date = Some(rest.trim().to_string());
        }
    }
    date
}

/// Heuristic for push failures that mean "the source repository is a fork
/// we cannot write to" rather than a transient problem.
pub fn is_permission_denied(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("permission denied")
        || lower.contains("permission to")
        || lower.contains("403")
        || lower.contains("protected branch")
        || lower.contains("[rejected]")
}
