use std::fmt;

use crate::Error;

/// A release version taken from a `vMAJOR.MINOR.PATCH` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// The root of the bump chain; also used as the "there are unreleased
    /// commits past the last tag" sentinel when it appears as a tag.
    pub const ROOT: Version = Version::new(0, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `vMAJOR.MINOR.PATCH` tag name.
    pub fn parse_tag(tag: &str) -> Option<Version> {
        let rest = tag.strip_prefix('v')?;
        let mut parts = rest.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        Some(Version::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The ordered set of maintained release versions, derived from the tag
/// list of a clone. Computed fresh per run; never cached across pull
/// requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGraph {
    versions: Vec<Version>,
    /// True when the tag set contained the `v0.0.0` sentinel, meaning the
    /// branches carry unreleased commits past their last tag.
    has_unreleased: bool,
}

impl VersionGraph {
    /// Build the graph from `git tag -l` output. Tags that are not of the
    /// `vMAJOR.MINOR.PATCH` shape are ignored; the `v0.0.0` sentinel is
    /// recorded but excluded from the version list.
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> VersionGraph {
        let mut versions: Vec<Version> = tags
            .into_iter()
            .filter_map(Version::parse_tag)
            .collect();
        versions.sort();
        versions.dedup();
        let has_unreleased = versions.contains(&Version::ROOT);
        versions.retain(|v| *v != Version::ROOT);
        VersionGraph {
            versions,
            has_unreleased,
        }
    }

    /// Maintained versions in ascending order, sentinel excluded.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// The version whose integration branch carries `v`'s changes: `v`
    /// itself, or `v` with the patch level bumped when the sentinel says
    /// the branch has unreleased commits.
    pub fn out_version(&self, v: Version) -> Version {
        if self.has_unreleased {
            Version::new(v.major, v.minor, v.patch + 1)
        } else {
            v
        }
    }

    /// The version immediately preceding `v` in the bump chain, with
    /// [`Version::ROOT`] as the predecessor of the first release.
    pub fn previous_version(&self, v: Version) -> Result<Version, Error> {
        if !self.versions.contains(&v) {
            return Err(Error::invariant(format!("unknown version {}", v)));
        }
        let chain: Vec<Version> = std::iter::once(Version::ROOT)
            .chain(self.versions.iter().map(|x| self.out_version(*x)))
            .collect();
        let ov = self.out_version(v);
        let i = chain
            .iter()
            .position(|x| *x == ov)
            .ok_or_else(|| Error::invariant(format!("version {} not in bump chain", ov)))?;
        if i == 0 {
            return Err(Error::invariant(format!("version {} has no predecessor", v)));
        }
        Ok(chain[i - 1])
    }

    /// The working branch for `v`, named after its out-version.
    pub fn branch_name(&self, v: Version) -> String {
        format!("branch-{}", self.out_version(v))
    }
}
