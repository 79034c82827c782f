//! The zippered merge planner.
//!
//! A zippered merge rejoins two branches that diverged from a common
//! ancestor. Given the commit graph
//!
//! ```text
//! ancestor -> left   - > rejoin
//!          -> right  /
//! ```
//!
//! commits from left and right may be merged into the rejoin target only
//! when their merge bases against the ancestor line up:
//!
//! - A commit from left can be merged directly when its merge base is the
//!   same as the existing merge base of right.
//! - A commit from right can be merged directly when its merge base is the
//!   same as the existing merge base of left.
//! - A commit from left and a commit from right must be merged together when
//!   both of them have a matching merge base.
//!
//! The algorithm favours the left for both direct merges (left's direct
//! merges are performed before the right's) and when looking for the next
//! matching merge base between the two branches.

use log::debug;

use crate::am;
use crate::git::{CommitId, GitContext, GitResult};

/// The default bound on how many commits are considered per side.
///
/// Each considered commit costs a merge-base computation; the window keeps
/// that affordable on deep backlogs.
const DEFAULT_MERGE_WINDOW: usize = 20;

/// An iterator over the unmerged commits of one upstream branch, paired with
/// each commit's merge base against the common ancestor.
#[derive(Debug, Clone)]
pub struct BranchIterator {
    commits: Vec<CommitId>,
    merge_bases: Vec<CommitId>,
    cursor: usize,
    initial_merge_base: CommitId,
}

impl BranchIterator {
    /// Create an iterator from unmerged commits in chronological (oldest
    /// first) order and their merge bases.
    ///
    /// `initial_merge_base` is the merge base the branch had before its first
    /// unmerged commit.
    pub fn new(
        commits: Vec<CommitId>,
        merge_bases: Vec<CommitId>,
        initial_merge_base: CommitId,
    ) -> Self {
        assert_eq!(commits.len(), merge_bases.len());
        BranchIterator {
            commits,
            merge_bases,
            cursor: 0,
            initial_merge_base,
        }
    }

    /// Whether any commits remain.
    pub fn has_commits(&self) -> bool {
        self.cursor < self.commits.len()
    }

    /// The merge base established by the most recently taken commit.
    pub fn prev_merge_base(&self) -> &CommitId {
        if self.cursor == 0 {
            &self.initial_merge_base
        } else {
            &self.merge_bases[self.cursor - 1]
        }
    }

    /// The merge base of the current commit.
    ///
    /// Only meaningful while commits remain.
    pub fn current_merge_base(&self) -> &CommitId {
        &self.merge_bases[self.cursor]
    }

    fn take_commit(&mut self) -> CommitId {
        let result = self.commits[self.cursor].clone();
        self.cursor += 1;
        result
    }

    /// The position of the next remaining commit whose merge base equals the
    /// other side's current merge base.
    fn find_matching_merge_base(&self, right: &BranchIterator) -> Option<usize> {
        (self.cursor..self.commits.len())
            .find(|&i| &self.merge_bases[i] == right.current_merge_base())
    }
}

/// Advance the iterators until both sides sit on a matching merge base.
///
/// The left side is searched for a commit matching the right's current merge
/// base; when there is none, the right candidate is dropped and the search
/// restarts. Returns `false` iff either side runs out of commits first.
fn find_next_matching_merge_base(left: &mut BranchIterator, right: &mut BranchIterator) -> bool {
    while left.has_commits() && right.has_commits() {
        // Try looking through the left side, until we find a matching right
        // merge base.
        if let Some(left_match) = left.find_matching_merge_base(right) {
            left.cursor = left_match;
            return true;
        }
        // No commit merge base found, advance the right.
        right.take_commit();
    }

    false
}

/// Compute the parent lists of the merge commits that should be constructed
/// to perform the required zippered merges.
///
/// Each entry is either a single direct-merge parent or a matched pair from
/// the left and right branches.
pub fn compute_zippered_merge_commits(
    mut left: BranchIterator,
    mut right: BranchIterator,
) -> Vec<Vec<CommitId>> {
    let mut merges = Vec::new();

    while left.has_commits() || right.has_commits() {
        // Try merging commits from one branch first, while the merge base
        // allows it.
        if left.has_commits() && right.prev_merge_base() == left.current_merge_base() {
            merges.push(vec![left.take_commit()]);
            continue;
        }
        if right.has_commits() && left.prev_merge_base() == right.current_merge_base() {
            merges.push(vec![right.take_commit()]);
            continue;
        }

        if find_next_matching_merge_base(&mut left, &mut right) {
            // Both merge bases match; merge from both branches in one commit.
            assert_eq!(left.current_merge_base(), right.current_merge_base());
            merges.push(vec![left.take_commit(), right.take_commit()]);
            continue;
        }
        break;
    }

    merges
}

/// Compute the parent lists of the merges that should be constructed to
/// bring a zippered target up to date, or `None` when the target already is.
pub fn compute_zippered_merges(
    ctx: &GitContext,
    remote: &str,
    target: &str,
    left_upstream: &str,
    right_upstream: &str,
    common_ancestor: &str,
    max_commits: Option<usize>,
) -> GitResult<Option<Vec<Vec<CommitId>>>> {
    let max_commits = max_commits.unwrap_or(DEFAULT_MERGE_WINDOW);

    // The unmerged commits arrive newest first; the planner walks them
    // chronologically.
    let oldest_first = |commits: Option<Vec<CommitId>>| {
        let mut commits = commits.unwrap_or_default();
        commits.reverse();
        commits
    };
    let mut left_commits =
        oldest_first(am::compute_unmerged_commits(ctx, remote, target, left_upstream)?);
    let mut right_commits =
        oldest_first(am::compute_unmerged_commits(ctx, remote, target, right_upstream)?);
    if left_commits.is_empty() && right_commits.is_empty() {
        // The branches are up-to-date.
        return Ok(None);
    }

    left_commits.truncate(max_commits);
    right_commits.truncate(max_commits);

    let ancestor_ref = format!("{}/{}", remote, common_ancestor);
    let merge_base = |committish: &str| -> GitResult<CommitId> {
        Ok(CommitId::new(
            ctx.git()
                .arg("merge-base")
                .arg(committish)
                .arg(&ancestor_ref)
                .output()?,
        ))
    };

    let merge_bases = |commits: &[CommitId]| -> GitResult<Vec<CommitId>> {
        commits
            .iter()
            .map(|commit| merge_base(commit.as_str()))
            .collect()
    };

    let initial_merge_base = |branch: &str, commits: &[CommitId]| -> GitResult<CommitId> {
        match commits.first() {
            Some(first) => merge_base(&format!("{}^", first)),
            None => merge_base(&format!("{}/{}", remote, branch)),
        }
    };

    debug!(
        target: "apple-llvm/am",
        "setting up left branch iterator for zippered merge to {}",
        target,
    );
    let left = BranchIterator::new(
        left_commits.clone(),
        merge_bases(&left_commits)?,
        initial_merge_base(left_upstream, &left_commits)?,
    );
    debug!(
        target: "apple-llvm/am",
        "setting up right branch iterator for zippered merge to {}",
        target,
    );
    let right = BranchIterator::new(
        right_commits.clone(),
        merge_bases(&right_commits)?,
        initial_merge_base(right_upstream, &right_commits)?,
    );

    let merges = compute_zippered_merge_commits(left, right);
    debug!(
        target: "apple-llvm/am",
        "zippered merge algorithm produced {} merges",
        merges.len(),
    );
    Ok(Some(merges))
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use crate::am::zippered::{compute_zippered_merge_commits, BranchIterator};
    use crate::git::CommitId;

    fn br(commits: &[&str], merge_bases: &[&str], initial_merge_base: &str) -> BranchIterator {
        BranchIterator::new(
            commits.iter().map(|&c| CommitId::new(c)).collect(),
            merge_bases.iter().map(|&c| CommitId::new(c)).collect(),
            CommitId::new(initial_merge_base),
        )
    }

    fn ids(parents: &[&[&str]]) -> Vec<Vec<CommitId>> {
        parents
            .iter()
            .map(|merge| merge.iter().map(|&c| CommitId::new(c)).collect())
            .collect()
    }

    #[test]
    fn test_zippered_merge_alg_no_zipper() {
        assert_eq!(
            compute_zippered_merge_commits(br(&[], &[], "m/A"), br(&[], &[], "m/A")),
            ids(&[]),
        );

        // Allow direct merges when merge bases match.
        assert_eq!(
            compute_zippered_merge_commits(br(&["l/A"], &["m/A"], "m/A"), br(&[], &[], "m/A")),
            ids(&[&["l/A"]]),
        );

        assert_eq!(
            compute_zippered_merge_commits(br(&[], &[], "m/A"), br(&["r/A"], &["m/A"], "m/A")),
            ids(&[&["r/A"]]),
        );

        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A"], &["m/A"], "m/A"),
                br(&["r/A"], &["m/A"], "m/A"),
            ),
            ids(&[&["l/A"], &["r/A"]]),
        );

        // Mismatching merge bases don't allow direct merges.
        assert_eq!(
            compute_zippered_merge_commits(br(&["l/A"], &["m/A"], "m/A"), br(&[], &[], "m/B")),
            ids(&[]),
        );

        assert_eq!(
            compute_zippered_merge_commits(br(&[], &[], "m/B"), br(&["r/A"], &["m/A"], "m/A")),
            ids(&[]),
        );

        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/A", "m/B"], "m/A"),
                br(&["r/A"], &["m/A"], "m/A"),
            ),
            ids(&[&["l/A"], &["r/A"]]),
        );

        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A"], &["m/A"], "m/A"),
                br(&["r/A", "r/B"], &["m/A", "m/B"], "m/A"),
            ),
            ids(&[&["l/A"], &["r/A"]]),
        );
    }

    #[test]
    fn test_zippered_merge_alg() {
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A"], &["m/B"], "m/A"),
                br(&["r/A"], &["m/B"], "m/A"),
            ),
            ids(&[&["l/A", "r/A"]]),
        );
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/A", "m/B"], "m/A"),
                br(&["r/A"], &["m/B"], "m/B"),
            ),
            ids(&[&["l/B", "r/A"]]),
        );
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A"], &["m/B"], "m/B"),
                br(&["r/A", "r/B"], &["m/A", "m/B"], "m/A"),
            ),
            ids(&[&["l/A", "r/B"]]),
        );

        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/B", "m/C"], "m/A"),
                br(&["r/A", "r/B"], &["m/B", "m/C"], "m/A"),
            ),
            ids(&[&["l/A", "r/A"], &["l/B", "r/B"]]),
        );
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/B1", "m/C"], "m/A"),
                br(&["r/A", "r/B"], &["m/B2", "m/C"], "m/A"),
            ),
            ids(&[&["l/B", "r/B"]]),
        );

        // Zippered + direct.
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/B", "m/B"], "m/A"),
                br(&["r/A", "r/B"], &["m/B", "m/B"], "m/A"),
            ),
            ids(&[&["l/A", "r/A"], &["l/B"], &["r/B"]]),
        );
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/B", "m/B"], "m/A"),
                br(&["r/A", "r/B"], &["m/B", "m/C"], "m/A"),
            ),
            ids(&[&["l/A", "r/A"], &["l/B"]]),
        );
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/B", "m/C"], "m/A"),
                br(&["r/A", "r/B"], &["m/B", "m/B"], "m/A"),
            ),
            ids(&[&["l/A", "r/A"], &["r/B"]]),
        );

        // Direct + zippered.
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/A", "l/B"], &["m/A", "m/B"], "m/A"),
                br(&["r/B"], &["m/B"], "m/A"),
            ),
            ids(&[&["l/A"], &["l/B", "r/B"]]),
        );
        assert_eq!(
            compute_zippered_merge_commits(
                br(&["l/B"], &["m/B"], "m/A"),
                br(&["r/A", "r/B"], &["m/A", "m/B"], "m/A"),
            ),
            ids(&[&["r/A"], &["l/B", "r/B"]]),
        );
    }

    fn side(prefix: &str, bases: &[u8]) -> (Vec<CommitId>, Vec<CommitId>) {
        let commits = (0..bases.len())
            .map(|i| CommitId::new(format!("{}/{}", prefix, i)))
            .collect();
        let bases = bases
            .iter()
            .map(|b| CommitId::new(format!("m/{}", b)))
            .collect();
        (commits, bases)
    }

    proptest! {
        #[test]
        fn test_planner_totality_and_arity(
            l_bases in proptest::collection::vec(0..4u8, 0..8),
            r_bases in proptest::collection::vec(0..4u8, 0..8),
            l_init in 0..4u8,
            r_init in 0..4u8,
        ) {
            // Merge bases only move forward in history; sort to mimic that.
            let mut l_bases = l_bases;
            l_bases.sort_unstable();
            let mut r_bases = r_bases;
            r_bases.sort_unstable();
            let total = l_bases.len() + r_bases.len();

            let (l_commits, l_mb) = side("l", &l_bases);
            let (r_commits, r_mb) = side("r", &r_bases);
            let merges = compute_zippered_merge_commits(
                BranchIterator::new(l_commits, l_mb, CommitId::new(format!("m/{}", l_init))),
                BranchIterator::new(r_commits, r_mb, CommitId::new(format!("m/{}", r_init))),
            );

            // Each step consumes at least one commit, so the plan is bounded
            // by the input, and every entry has one or two parents.
            prop_assert!(merges.len() <= total);
            for merge in &merges {
                prop_assert!(merge.len() == 1 || merge.len() == 2);
            }
        }

        #[test]
        fn test_planner_left_bias(
            bases in proptest::collection::vec(0..3u8, 1..6),
        ) {
            // Identical unmerged sequences on both sides: commit k from the
            // left is always emitted no later than commit k from the right,
            // and a zippered pair lists the left parent first.
            let mut bases = bases;
            bases.sort_unstable();
            let (l_commits, l_mb) = side("l", &bases);
            let (r_commits, r_mb) = side("r", &bases);
            let init = CommitId::new("m/0");

            let merges = compute_zippered_merge_commits(
                BranchIterator::new(l_commits, l_mb, init.clone()),
                BranchIterator::new(r_commits, r_mb, init),
            );

            let position = |commit: &str| {
                merges
                    .iter()
                    .position(|merge| merge.iter().any(|c| c.as_str() == commit))
            };
            for k in 0..bases.len() {
                let l_pos = position(&format!("l/{}", k));
                let r_pos = position(&format!("r/{}", k));
                if let (Some(l_pos), Some(r_pos)) = (l_pos, r_pos) {
                    prop_assert!(l_pos <= r_pos, "l/{} emitted after r/{}", k, k);
                }
            }
            for merge in merges.iter().filter(|merge| merge.len() == 2) {
                prop_assert!(merge[0].as_str().starts_with("l/"));
                prop_assert!(merge[1].as_str().starts_with("r/"));
            }
        }
    }
}
