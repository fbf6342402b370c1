pub mod cleanup;
pub mod config;
pub mod event;
pub mod git;
pub mod github;
pub mod pipeline;
pub mod promote;
pub mod reconcile;

pub use config::Config;
pub use github::GitHubClient;
