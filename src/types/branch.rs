//! Branch metadata tracked against the working copy.

use std::collections::BTreeMap;

use super::Sha;

/// What the robot knows about one branch name.
///
/// A branch may exist only locally (`remote_hash` is `None`), only on the
/// remote (`local_hash` is `None`), or on both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branch {
    /// Commit of `refs/heads/<name>`, if the local branch exists.
    pub local_hash: Option<Sha>,

    /// Commit of `refs/remotes/origin/<name>`, if the remote branch exists.
    pub remote_hash: Option<Sha>,

    /// Whether this branch is checked out in the working copy.
    pub is_current: bool,
}

impl Branch {
    /// A local branch whose remote counterpart is gone.
    pub fn is_orphaned(&self) -> bool {
        self.local_hash.is_some() && self.remote_hash.is_none()
    }

    /// Local and remote point at the same commit (or both are absent).
    pub fn is_in_sync(&self) -> bool {
        self.local_hash == self.remote_hash
    }
}

/// Branches keyed by name. Ordered, so iteration is stable across runs.
pub type BranchMap = BTreeMap<String, Branch>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(c: char) -> Sha {
        Sha::parse(c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn orphaned_requires_local_without_remote() {
        let local_only = Branch {
            local_hash: Some(sha('a')),
            ..Branch::default()
        };
        let remote_only = Branch {
            remote_hash: Some(sha('a')),
            ..Branch::default()
        };
        let both = Branch {
            local_hash: Some(sha('a')),
            remote_hash: Some(sha('b')),
            is_current: false,
        };

        assert!(local_only.is_orphaned());
        assert!(!remote_only.is_orphaned());
        assert!(!both.is_orphaned());
    }

    #[test]
    fn in_sync_compares_hashes() {
        let mut branch = Branch {
            local_hash: Some(sha('a')),
            remote_hash: Some(sha('a')),
            is_current: true,
        };
        assert!(branch.is_in_sync());

        branch.remote_hash = Some(sha('b'));
        assert!(!branch.is_in_sync());
    }
}
