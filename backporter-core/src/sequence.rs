use std::collections::BTreeMap;

use crate::refname::BackportRef;
use crate::Error;

/// Branch name to full commit sha, for one sequence id.
pub type BranchHashes = BTreeMap<String, String>;

/// One position in a pull request's backport history. Placeholder entries
/// (both options `None`) stand in for sequence ids that were allocated on
/// a different scheme or whose refs have been lost; they keep the history
/// index-aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEntry {
    pub sequence_id: u32,
    pub short_hash: Option<String>,
    pub branches: Option<BranchHashes>,
}

impl SequenceEntry {
    fn placeholder(sequence_id: u32) -> SequenceEntry {
        SequenceEntry {
            sequence_id,
            short_hash: None,
            branches: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.short_hash.is_none()
    }
}

/// Time-ordered backport history of one pull request, rebuilt on every
/// run from the refs under its namespace. Position `i` always holds
/// `sequence_id == i`, so "no backport yet for id k" is a placeholder
/// lookup rather than a missing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceHistory {
    entries: Vec<SequenceEntry>,
}

impl SequenceHistory {
    /// Group decoded refs by sequence id, sort, and fill index gaps with
    /// placeholders. An empty input yields an empty history.
    ///
    /// Two refs with the same sequence id must carry the same short hash;
    /// anything else means the namespace has been corrupted.
    pub fn build(
        refs: impl IntoIterator<Item = (BackportRef, String)>,
    ) -> Result<SequenceHistory, Error> {
        let mut groups: BTreeMap<u32, (String, BranchHashes)> = BTreeMap::new();
        for (r, commit) in refs {
            match groups.entry(r.sequence_id) {
                std::collections::btree_map::Entry::Vacant(e) => {
                    let mut branches = BranchHashes::new();
                    branches.insert(r.target_branch, commit);
                    e.insert((r.short_hash, branches));
                }
                std::collections::btree_map::Entry::Occupied(mut e) => {
                    let (hash, branches) = e.get_mut();
                    if *hash != r.short_hash {
                        return Err(Error::invariant(format!(
                            "sequence {} of pr{} has conflicting hashes {} and {}",
                            r.sequence_id, r.pr_id, hash, r.short_hash
                        )));
                    }
                    branches.insert(r.target_branch, commit);
                }
            }
        }

        let mut entries = Vec::new();
        for (sequence_id, (short_hash, branches)) in groups {
            while (entries.len() as u32) < sequence_id {
                entries.push(SequenceEntry::placeholder(entries.len() as u32));
            }
            entries.push(SequenceEntry {
                sequence_id,
                short_hash: Some(short_hash),
                branches: Some(branches),
            });
        }
        Ok(SequenceHistory { entries })
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn last(&self) -> Option<&SequenceEntry> {
        self.entries.last()
    }

    /// The id the next successful backport run will publish under. Never
    /// reused: one past the last known entry, placeholders included.
    pub fn next_sequence_id(&self) -> u32 {
        self.entries.len() as u32
    }

    /// True when the most recent sequence was built from the given source
    /// commit, i.e. the existing backport branches are current.
    pub fn is_up_to_date(&self, short_hash: &str) -> bool {
        matches!(self.last(), Some(e) if e.short_hash.as_deref() == Some(short_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(
        sequence_id: u32,
        short_hash: &str,
        branch: &str,
        commit: &str,
    ) -> (BackportRef, String) {
        (
            BackportRef {
                pr_id: 1,
                sequence_id,
                short_hash: short_hash.to_string(),
                target_branch: branch.to_string(),
            },
            commit.to_string(),
        )
    }

    #[test]
    fn test_empty_input_yields_empty_history() {
        let history = SequenceHistory::build([]).unwrap();
        assert!(history.is_empty());
        assert_eq!(history.next_sequence_id(), 0);
        assert!(!history.is_up_to_date("54b92"));
    }

    #[test]
    fn test_leading_gap_is_filled() {
        let history = SequenceHistory::build([observed(1, "00000", "main", "aaa")]).unwrap();
        let entries = history.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_placeholder());
        assert_eq!(entries[1].short_hash.as_deref(), Some("00000"));
    }

    #[test]
    fn test_interior_gaps_are_filled() {
        let history = SequenceHistory::build([
            observed(0, "00000", "main", "aaa"),
            observed(3, "00001", "main", "bbb"),
        ])
        .unwrap();
        let entries = history.entries();
        assert_eq!(entries.len(), 4);
        assert!(!entries[0].is_placeholder());
        assert!(entries[1].is_placeholder());
        assert!(entries[2].is_placeholder());
        assert_eq!(entries[3].short_hash.as_deref(), Some("00001"));
    }

    #[test]
    fn test_no_index_gaps() {
        let history = SequenceHistory::build([
            observed(5, "00005", "main", "eee"),
            observed(2, "00002", "main", "ccc"),
            observed(9, "00009", "main", "iii"),
        ])
        .unwrap();
        for (i, entry) in history.entries().iter().enumerate() {
            assert_eq!(entry.sequence_id, i as u32);
        }
        assert_eq!(history.next_sequence_id(), 10);
    }

    #[test]
    fn test_branches_grouped_per_sequence() {
        let history = SequenceHistory::build([
            observed(0, "54b92", "branch-0.0.1", "aaa"),
            observed(0, "54b92", "branch-0.0.2", "bbb"),
            observed(0, "54b92", "main", "bbb"),
        ])
        .unwrap();
        let branches = history.entries()[0].branches.as_ref().unwrap();
        assert_eq!(branches.len(), 3);
        assert_eq!(branches["branch-0.0.1"], "aaa");
        assert_eq!(branches["main"], "bbb");
    }

    #[test]
    fn test_conflicting_hashes_for_one_sequence_are_fatal() {
        let result = SequenceHistory::build([
            observed(0, "54b92", "branch-0.0.1", "aaa"),
            observed(0, "d8e61", "branch-0.0.2", "bbb"),
        ]);
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_up_to_date_checks_latest_entry_only() {
        let history = SequenceHistory::build([
            observed(0, "00000", "main", "aaa"),
            observed(1, "54b92", "main", "bbb"),
        ])
        .unwrap();
        assert!(history.is_up_to_date("54b92"));
        assert!(!history.is_up_to_date("00000"));
        assert_eq!(history.next_sequence_id(), 2);
    }
}
