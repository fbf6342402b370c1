use std::fmt;

use crate::Error;

/// Top-level segment of the backport ref namespace.
pub const NAMESPACE: &str = "backport";

/// Sequence ids are capped well below this; a ref carrying a larger id is
/// malformed.
pub const MAX_SEQUENCE_ID: u32 = 100;

/// Length of the abbreviated source-commit hash carried in ref names.
pub const SHORT_HASH_LEN: usize = 5;

/// One attempt to land a pull request's patch on one target branch,
/// encoded as `backport/pr{pr_id}/v{sequence_id}-{short_hash}/{branch}`.
///
/// The ref namespace is the only state store: these refs are never
/// mutated in place (a re-run allocates a fresh sequence id) and are only
/// deleted once the owning pull request closes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackportRef {
    pub pr_id: u64,
    pub sequence_id: u32,
    pub short_hash: String,
    pub target_branch: String,
}

impl BackportRef {
    /// The listing prefix for every ref belonging to one pull request.
    pub fn pr_namespace(pr_id: u64) -> String {
        format!("{}/pr{}", NAMESPACE, pr_id)
    }

    /// Render the ref path. Inverse of [`BackportRef::decode`].
    pub fn encode(&self) -> String {
        format!(
            "{}/pr{}/v{}-{}/{}",
            NAMESPACE, self.pr_id, self.sequence_id, self.short_hash, self.target_branch
        )
    }

    /// Parse a ref path of the exact namespace shape. Total: every input
    /// either decodes or yields a [`Error::MalformedRef`] naming the
    /// offending segment.
    pub fn decode(ref_name: &str) -> Result<BackportRef, Error> {
        let mut segments = ref_name.split('/');

        match segments.next() {
            Some(NAMESPACE) => {}
            _ => return Err(Error::malformed(ref_name, "missing 'backport' namespace")),
        }

        let pr_segment = segments
            .next()
            .ok_or_else(|| Error::malformed(ref_name, "missing pr segment"))?;
        let pr_id = pr_segment
            .strip_prefix("pr")
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::malformed(ref_name, "pr segment is not 'pr{number}'"))?;

        let seq_segment = segments
            .next()
            .ok_or_else(|| Error::malformed(ref_name, "missing sequence segment"))?;
        let (seq_part, hash_part) = seq_segment
            .strip_prefix('v')
            .and_then(|s| s.split_once('-'))
            .ok_or_else(|| {
                Error::malformed(ref_name, "sequence segment is not 'v{seq}-{hash}'")
            })?;
        let sequence_id = seq_part
            .parse::<u32>()
            .map_err(|_| Error::malformed(ref_name, "sequence id is not a number"))?;
        if sequence_id >= MAX_SEQUENCE_ID {
            return Err(Error::malformed(ref_name, "sequence id out of range"));
        }
        if hash_part.len() != SHORT_HASH_LEN
            || !hash_part
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(Error::malformed(ref_name, "hash is not 5 lowercase hex chars"));
        }

        let target_branch = segments
            .next()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::malformed(ref_name, "missing branch segment"))?;
        if segments.next().is_some() {
            return Err(Error::malformed(ref_name, "trailing path segments"));
        }

        Ok(BackportRef {
            pr_id,
            sequence_id,
            short_hash: hash_part.to_string(),
            target_branch: target_branch.to_string(),
        })
    }
}

impl fmt::Display for BackportRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
