//! End-to-end tests for the patch pipeline against a local bare remote.

use std::path::{Path, PathBuf};
use std::process::Command;

use backporter::event::{PullRequest, PullRequestRef};
use backporter::git::{self, GitRepo};
use backporter::pipeline::{
    apply_patch_across_branches, comment_body, fetch_history, handle_pull_request,
    publish_backports, PipelineOutcome, PublishResult,
};
use backporter::{Config, GitHubClient};
use backporter_core::VersionGraph;
use tempfile::TempDir;

fn git_in(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

struct Fixture {
    tmp: TempDir,
    origin: PathBuf,
}

impl Fixture {
    fn origin_url(&self) -> String {
        self.origin.to_str().unwrap().to_string()
    }

    fn clone_dir(&self) -> PathBuf {
        self.tmp.path().join("clone")
    }
}

/// A bare remote with two release branches (cut at v0.0.1 and v0.0.2)
/// and a development branch `main` ahead of both.
fn setup_remote() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let origin = tmp.path().join("origin.git");

    git_in(tmp.path(), &["init", "--bare", "origin.git"]);
    git_in(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    let seed = tmp.path().join("seed");
    git_in(tmp.path(), &["init", "-b", "main", "seed"]);
    std::fs::write(seed.join("README"), "line one\nline two\n").unwrap();
    git_in(&seed, &["add", "."]);
    git_in(&seed, &["commit", "-m", "initial"]);
    git_in(&seed, &["branch", "branch-0.0.1"]);
    git_in(&seed, &["tag", "v0.0.1"]);

    std::fs::write(seed.join("CHANGES"), "0.0.2\n").unwrap();
    git_in(&seed, &["add", "."]);
    git_in(&seed, &["commit", "-m", "second release"]);
    git_in(&seed, &["branch", "branch-0.0.2"]);
    git_in(&seed, &["tag", "v0.0.2"]);

    std::fs::write(seed.join("NOTES"), "unreleased work\n").unwrap();
    git_in(&seed, &["add", "."]);
    git_in(&seed, &["commit", "-m", "dev work"]);

    git_in(&seed, &["remote", "add", "origin", origin.to_str().unwrap()]);
    git_in(&seed, &["push", "origin", "--all"]);
    git_in(&seed, &["push", "origin", "--tags"]);

    Fixture { tmp, origin }
}

/// Produce a mailbox patch. A clean patch appends to the README every
/// branch shares; a conflicting one rewrites content no branch has.
fn make_patch(fixture: &Fixture, clean: bool) -> PathBuf {
    let scratch = fixture.tmp.path().join("scratch");
    git_in(fixture.tmp.path(), &["init", "-b", "main", "scratch"]);
    let base = if clean {
        "line one\nline two\n"
    } else {
        "completely different\ncontents here\n"
    };
    std::fs::write(scratch.join("README"), base).unwrap();
    git_in(&scratch, &["add", "."]);
    git_in(&scratch, &["commit", "-m", "initial"]);

    std::fs::write(scratch.join("README"), format!("{}backported feature\n", base)).unwrap();
    git_in(&scratch, &["add", "."]);
    git_in(&scratch, &["commit", "-m", "Add feature"]);

    let out = git_in(
        &scratch,
        &[
            "format-patch",
            "-1",
            "-o",
            fixture.tmp.path().to_str().unwrap(),
        ],
    );
    PathBuf::from(out.trim())
}

fn write_commit_msg(fixture: &Fixture) -> PathBuf {
    let path = fixture.tmp.path().join("commit-1.msg");
    std::fs::write(&path, "Merge pull request #1 from octo:feature\n\nAdd feature\n\n").unwrap();
    path
}

fn open_clone(fixture: &Fixture) -> GitRepo {
    let repo = GitRepo::clone_blobless(&fixture.origin_url(), &fixture.clone_dir()).unwrap();
    repo.fetch().unwrap();
    repo
}

fn version_graph(repo: &GitRepo) -> VersionGraph {
    let tags = repo.tags().unwrap();
    VersionGraph::from_tags(tags.iter().map(|s| s.as_str()))
}

#[test]
fn test_patch_lands_on_every_branch_and_publishes_refs() {
    let fixture = setup_remote();
    let patch = make_patch(&fixture, true);
    let msg = write_commit_msg(&fixture);

    let repo = open_clone(&fixture);
    let graph = version_graph(&repo);
    assert_eq!(graph.versions().len(), 2);

    let results = apply_patch_across_branches(&repo, &graph, &patch, &msg).unwrap();
    let branches: Vec<&str> = results.iter().map(|r| r.branch.as_str()).collect();
    assert_eq!(branches, vec!["branch-0.0.1", "branch-0.0.2", "main"]);

    // The merge has carried the feature onto the second branch too.
    let readme = git_in(
        &fixture.clone_dir(),
        &["show", "branch-0.0.2:README"],
    );
    assert!(readme.contains("backported feature"));

    let published = publish_backports(&repo, 1, 0, "c618a", &results).unwrap();
    let pushed = match published {
        PublishResult::Pushed(pushed) => pushed,
        PublishResult::Rejected => panic!("local push should not be rejected"),
    };
    assert_eq!(pushed.len(), 3);

    let mut names: Vec<String> = git::ls_remote(&fixture.origin_url(), "backport/*")
        .unwrap()
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "backport/pr1/v0-c618a/branch-0.0.1",
            "backport/pr1/v0-c618a/branch-0.0.2",
            "backport/pr1/v0-c618a/main",
        ]
    );

    let body = comment_body("octo/widgets", 0, "c618a", &pushed);
    assert!(body.contains("(version 0 - c618a)"));
    assert!(body.contains("[branch-0.0.1]"));
    assert!(body.contains("[branch-0.0.2]"));
    assert!(!body.contains("[main]"));
}

#[test]
fn test_published_sequence_is_visible_and_up_to_date() {
    let fixture = setup_remote();
    let patch = make_patch(&fixture, true);
    let msg = write_commit_msg(&fixture);

    let repo = open_clone(&fixture);
    let graph = version_graph(&repo);
    let results = apply_patch_across_branches(&repo, &graph, &patch, &msg).unwrap();
    publish_backports(&repo, 1, 0, "c618a", &results).unwrap();

    let history = fetch_history(&fixture.origin_url(), 1).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history.next_sequence_id(), 1);
    assert!(history.is_up_to_date("c618a"));
    assert!(!history.is_up_to_date("aaaaa"));

    let entry = history.last().unwrap();
    let branches = entry.branches.as_ref().unwrap();
    assert_eq!(branches.len(), 3);
    assert!(branches.contains_key("main"));
}

#[tokio::test]
async fn test_unchanged_head_short_circuits_without_cloning() {
    let fixture = setup_remote();
    let patch = make_patch(&fixture, true);
    let msg = write_commit_msg(&fixture);

    let repo = open_clone(&fixture);
    let graph = version_graph(&repo);
    let results = apply_patch_across_branches(&repo, &graph, &patch, &msg).unwrap();
    publish_backports(&repo, 1, 0, "c618a", &results).unwrap();

    // Re-trigger the pipeline with the head sha the published sequence
    // was built from. The token is never used: the run must end before
    // any API call, clone, or push.
    let config = Config {
        github_token: "unused".to_string(),
        repo_slug: "octo/widgets".to_string(),
        work_dir: fixture.tmp.path().to_path_buf(),
        remote_url: Some(fixture.origin_url()),
    };
    let client = GitHubClient::new("unused".to_string()).unwrap();
    let pr = PullRequest {
        number: 1,
        title: "Add feature".to_string(),
        body: None,
        head: PullRequestRef {
            sha: "c618aa17146d00598f4617ca05c8a29917c84551".to_string(),
            ref_name: "feature".to_string(),
            label: "octo:feature".to_string(),
        },
    };

    let outcome = handle_pull_request(&config, &client, &pr).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::UpToDate));

    // No second sequence was published and no clone was made.
    let refs = git::ls_remote(&fixture.origin_url(), "backport/*").unwrap();
    assert_eq!(refs.len(), 3);
    assert!(refs.iter().all(|(_, name)| name.contains("/v0-c618a/")));
    assert!(!config.clone_dir().exists());
}

#[test]
fn test_conflicting_patch_applies_nowhere() {
    let fixture = setup_remote();
    let patch = make_patch(&fixture, false);
    let msg = write_commit_msg(&fixture);

    let repo = open_clone(&fixture);
    let graph = version_graph(&repo);
    let results = apply_patch_across_branches(&repo, &graph, &patch, &msg).unwrap();
    assert!(results.is_empty());

    let refs = git::ls_remote(&fixture.origin_url(), "backport/*").unwrap();
    assert!(refs.is_empty());
}

#[test]
fn test_history_of_unknown_pr_is_empty() {
    let fixture = setup_remote();
    let history = fetch_history(&fixture.origin_url(), 42).unwrap();
    assert!(history.is_empty());
    assert_eq!(history.next_sequence_id(), 0);
}
