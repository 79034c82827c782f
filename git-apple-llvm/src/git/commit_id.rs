//! Commit identifiers.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A reference to a commit object.
///
/// Usually a 40-character hexadecimal hash, but any committish accepted by
/// git may be stored here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitId(String);

impl CommitId {
    /// Create a new commit reference.
    pub fn new<C>(commit: C) -> Self
    where
        C: Into<String>,
    {
        CommitId(commit.into())
    }

    /// The commit reference as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the reference is a full 40-character hexadecimal hash.
    pub fn is_full_hash(&self) -> bool {
        self.0.len() == 40 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl From<&str> for CommitId {
    fn from(commit: &str) -> Self {
        CommitId::new(commit)
    }
}

impl From<String> for CommitId {
    fn from(commit: String) -> Self {
        CommitId::new(commit)
    }
}

impl Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use crate::git::CommitId;

    #[test]
    fn test_full_hash_detection() {
        let full = CommitId::new("f0931a1b36c88157ffc25a9ed1295f3addff85b9");
        assert!(full.is_full_hash());

        assert!(!CommitId::new("HEAD").is_full_hash());
        assert!(!CommitId::new("f0931a1b").is_full_hash());
        assert!(!CommitId::new("g0931a1b36c88157ffc25a9ed1295f3addff85b9").is_full_hash());
    }
}
