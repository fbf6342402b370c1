use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    /// Token used for both the REST API and authenticated git pushes.
    pub github_token: String,
    /// `owner/name` of the repository being backported.
    pub repo_slug: String,
    /// Directory holding the clone plus scratch patch/message files.
    pub work_dir: PathBuf,
    /// Overrides the derived https remote, e.g. to point at a mirror.
    pub remote_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token = resolve_token(env::var("GH_TOKEN").ok(), env::var("GITHUB_TOKEN").ok())
            .context("an access token of GH_TOKEN or GITHUB_TOKEN is required")?;

        let repo_slug = env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is required")?;
        if repo_slug.split('/').count() != 2 {
            anyhow::bail!("GITHUB_REPOSITORY must be of the form owner/name");
        }

        let work_dir = env::var("BACKPORTER_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        Ok(Config {
            github_token,
            repo_slug,
            work_dir,
            remote_url: env::var("BACKPORTER_REMOTE_URL").ok(),
        })
    }

    /// Remote URL of the repository, defaulting to its https address.
    pub fn remote_url(&self) -> String {
        match &self.remote_url {
            Some(url) => url.clone(),
            None => format!("https://github.com/{}.git", self.repo_slug),
        }
    }

    /// Where the repository is cloned under the work directory.
    pub fn clone_dir(&self) -> PathBuf {
        self.work_dir.join(self.repo_slug.replace('/', "--"))
    }
}

/// Pick the first non-empty token, preferring `GH_TOKEN`.
pub fn resolve_token(gh_token: Option<String>, github_token: Option<String>) -> Option<String> {
    gh_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| github_token.filter(|t| !t.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_token_prefers_gh_token() {
        assert_eq!(
            resolve_token(Some("a".to_string()), Some("b".to_string())),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_resolve_token_falls_back() {
        assert_eq!(
            resolve_token(None, Some("b".to_string())),
            Some("b".to_string())
        );
        assert_eq!(
            resolve_token(Some("  ".to_string()), Some("b".to_string())),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_resolve_token_none() {
        assert_eq!(resolve_token(None, None), None);
        assert_eq!(resolve_token(Some(String::new()), None), None);
    }

    #[test]
    fn test_clone_dir_flattens_slug() {
        let config = Config {
            github_token: "t".to_string(),
            repo_slug: "octo/widgets".to_string(),
            work_dir: PathBuf::from("/tmp/work"),
            remote_url: None,
        };
        assert_eq!(config.clone_dir(), PathBuf::from("/tmp/work/octo--widgets"));
        assert_eq!(config.remote_url(), "https://github.com/octo/widgets.git");
    }

    #[test]
    fn test_remote_url_override() {
        let config = Config {
            github_token: "t".to_string(),
            repo_slug: "octo/widgets".to_string(),
            work_dir: PathBuf::from("/tmp/work"),
            remote_url: Some("/srv/mirrors/widgets.git".to_string()),
        };
        assert_eq!(config.remote_url(), "/srv/mirrors/widgets.git");
    }
}
