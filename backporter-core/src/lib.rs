//! Core logic for the pull-request backporter.
//!
//! Everything in this crate is pure and synchronous: the version graph
//! derived from release tags, the `backport/...` ref namespace codec, the
//! gap-filled sequence history, and the check-run mapping used to mirror
//! CI results from backport branches onto a pull request's head commit.
//! All git and GitHub I/O lives in the `backporter-cli` crate.

pub mod checks;
pub mod refname;
pub mod sequence;
pub mod version;

pub use checks::{
    plan_check_updates, CheckRun, CheckRunIdentity, CheckRunPayload, ReconcileAction,
    BACKPORT_MARKER,
};
pub use refname::{BackportRef, SHORT_HASH_LEN};
pub use sequence::{SequenceEntry, SequenceHistory};
pub use version::{Version, VersionGraph};

/// Errors produced by the core crate.
///
/// `MalformedRef` means a string that was expected to follow the
/// `backport/pr{id}/v{seq}-{hash}/{branch}` shape did not. An
/// `InvariantViolation` indicates corrupted remote state (duplicate
/// sequence hashes, inconsistent head shas, unknown versions) and is
/// never recoverable: callers abort the run.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("malformed backport ref '{ref_name}': {reason}")]
    MalformedRef { ref_name: String, reason: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    pub(crate) fn malformed(ref_name: &str, reason: impl Into<String>) -> Self {
        Error::MalformedRef {
            ref_name: ref_name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }
}
