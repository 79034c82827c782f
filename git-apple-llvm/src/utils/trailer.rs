//! Trailer extraction functions.
//!
//! Trailers are key/value pairs of strings at the end of commit messages.
//! The monorepo uses them to record where a commit came from: a commit
//! projected from a split repository carries an `apple-llvm-split-commit`
//! trailer naming the original commit and an `apple-llvm-split-dir` trailer
//! naming the component it belongs to.

use lazy_static::lazy_static;
use regex::Regex;

use crate::git::CommitId;

lazy_static! {
    static ref TRAILER_RE: Regex = Regex::new(
        "^\
         (?P<token>[[:alpha:]-]+)\
         :\\s+\
         (?P<value>.+?)\
         \\s*\
         $"
    )
    .unwrap();
}

/// The trailer naming the split-repository commit a monorepo commit was
/// projected from.
pub const SPLIT_COMMIT_TRAILER: &str = "apple-llvm-split-commit";

/// The trailer naming the component a projected monorepo commit belongs to.
pub const SPLIT_DIR_TRAILER: &str = "apple-llvm-split-dir";

/// A trailer from a commit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerRef<'a> {
    /// The name of the trailer.
    pub token: &'a str,
    /// The value for the trailer.
    pub value: &'a str,
}

impl<'a> TrailerRef<'a> {
    fn new(token: &'a str, value: &'a str) -> Self {
        TrailerRef {
            token,
            value,
        }
    }

    /// Extract trailers from a commit message.
    pub fn extract(content: &'a str) -> Vec<Self> {
        let mut trailers = Vec::new();

        for line in content.lines().rev().skip_while(|line| line.is_empty()) {
            let captures = match TRAILER_RE.captures(line) {
                Some(captures) => captures,
                None => break,
            };

            trailers.push(Self::new(
                captures
                    .name("token")
                    .expect("the trailer regex should have a 'token' group")
                    .as_str(),
                captures
                    .name("value")
                    .expect("the trailer regex should have a 'value' group")
                    .as_str(),
            ));
        }

        trailers.reverse();

        trailers
    }
}

/// The split-repository origin of a projected monorepo commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCommitLink {
    /// The commit in the split repository.
    pub commit: CommitId,
    /// The component directory, with its trailing `/` stripped (`-` for the
    /// monorepo root).
    pub dir: String,
}

/// Extract the split-repository link recorded in a commit message, if any.
///
/// Both trailers must be present for the link to be usable.
pub fn split_commit_link(content: &str) -> Option<SplitCommitLink> {
    let trailers = TrailerRef::extract(content);

    let commit = trailers
        .iter()
        .find(|trailer| trailer.token == SPLIT_COMMIT_TRAILER)?
        .value;
    let dir = trailers
        .iter()
        .find(|trailer| trailer.token == SPLIT_DIR_TRAILER)?
        .value;

    Some(SplitCommitLink {
        commit: CommitId::new(commit),
        dir: dir.trim_end_matches('/').into(),
    })
}
