//! The commit graph selected for a push.

use std::collections::BTreeSet;

use crate::git::{CommitId, GitContext, GitResult};
use crate::push::SplitDir;

/// A commit graph that should be pushed.
///
/// `commits` is the list of commits to push in `rev-list` order (HEAD first);
/// `roots` are the boundary commits the graph grows from, which must be
/// remapped onto their split counterparts. Both are always non-empty.
#[derive(Debug, Clone)]
pub struct CommitGraph {
    /// The commits that should be pushed.
    pub commits: Vec<CommitId>,
    /// The monorepo root commits the graph is rooted on.
    pub roots: Vec<CommitId>,
}

/// Parse the output of `git rev-list --boundary` into a [`CommitGraph`].
///
/// Boundary lines carry a `-` prefix and become the roots. Returns `None`
/// when either list ends up empty.
pub fn compute_commit_graph(rev_list: &str) -> Option<CommitGraph> {
    let mut commits = Vec::new();
    let mut roots = Vec::new();
    for rev in rev_list.lines() {
        match rev.strip_prefix('-') {
            Some(root) => roots.push(CommitId::new(root)),
            None => commits.push(CommitId::new(rev)),
        }
    }

    if commits.is_empty() || roots.is_empty() {
        return None;
    }
    Some(CommitGraph {
        commits,
        roots,
    })
}

impl CommitGraph {
    /// The head commit of the graph.
    pub fn source_commit(&self) -> &CommitId {
        &self.commits[0]
    }

    /// Whether the graph contains any merge commits.
    pub fn has_merges(&self, ctx: &GitContext) -> GitResult<bool> {
        let output = ctx
            .git()
            .args(["rev-list", "--min-parents=2"])
            .arg(self.source_commit().as_str())
            .arg("--not")
            .args(self.roots.iter().map(CommitId::as_str))
            .output()?;
        Ok(!output.is_empty())
    }

    fn changed_filenames(&self, ctx: &GitContext) -> GitResult<Vec<String>> {
        let output = ctx
            .git()
            .args(["log", "--format=", "--name-only"])
            .arg(self.source_commit().as_str())
            .arg("--not")
            .args(self.roots.iter().map(CommitId::as_str))
            .output()?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty())
            .map(Into::into)
            .collect())
    }

    /// The set of files modified by the commit graph.
    ///
    /// With a split dir, only that component's files are returned, with the
    /// component prefix stripped (root paths are kept as-is).
    pub fn compute_changed_files(
        &self,
        ctx: &GitContext,
        split_dir: Option<&SplitDir>,
    ) -> GitResult<BTreeSet<String>> {
        let filenames = self.changed_filenames(ctx)?;
        let files = match split_dir {
            Some(split_dir) => {
                filenames
                    .into_iter()
                    .filter(|path| &SplitDir::for_path(path) == split_dir)
                    .map(|path| {
                        match split_dir {
                            SplitDir::Root => path,
                            SplitDir::Dir(dir) => path[dir.len() + 1..].into(),
                        }
                    })
                    .collect()
            },
            None => filenames.into_iter().collect(),
        };
        Ok(files)
    }

    /// The sorted list of split repositories modified by the commit graph.
    pub fn compute_changed_split_repos(&self, ctx: &GitContext) -> GitResult<Vec<SplitDir>> {
        let dirs: BTreeSet<SplitDir> = self
            .changed_filenames(ctx)?
            .iter()
            .map(|path| SplitDir::for_path(path))
            .collect();
        Ok(dirs.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use crate::push::{compute_commit_graph, SplitDir};
    use crate::tests::harness::TestRepo;

    #[test]
    fn test_boundary_parsing() {
        let graph = compute_commit_graph(
            "1111111111111111111111111111111111111111\n\
             2222222222222222222222222222222222222222\n\
             -3333333333333333333333333333333333333333\n",
        )
        .unwrap();
        assert_eq!(graph.commits.len(), 2);
        assert_eq!(
            graph.source_commit().as_str(),
            "1111111111111111111111111111111111111111",
        );
        assert_eq!(
            graph.roots[0].as_str(),
            "3333333333333333333333333333333333333333",
        );

        // Both sides have to be present.
        assert!(compute_commit_graph("").is_none());
        assert!(compute_commit_graph("1111111111111111111111111111111111111111\n").is_none());
        assert!(compute_commit_graph("-1111111111111111111111111111111111111111\n").is_none());
    }

    #[test]
    fn test_changed_files_and_split_repos() {
        let repo = TestRepo::new();
        let root = repo.commit_file("base-file", "base\n", "base");
        repo.commit_file("clang/lib/a.cpp", "a\n", "clang change");
        repo.commit_file("llvm/lib/b.cpp", "b\n", "llvm change");
        repo.commit_file("root-notes.md", "notes\n", "root change");

        let rev_list = repo
            .ctx()
            .git()
            .args(["rev-list", "--boundary", "HEAD"])
            .arg("--not")
            .arg(root.as_str())
            .output()
            .unwrap();
        let graph = compute_commit_graph(&rev_list).unwrap();
        assert_eq!(graph.commits.len(), 3);

        assert!(!graph.has_merges(repo.ctx()).unwrap());

        let all = graph.compute_changed_files(repo.ctx(), None).unwrap();
        assert_eq!(
            all.into_iter().collect::<Vec<_>>(),
            vec![
                "clang/lib/a.cpp".to_string(),
                "llvm/lib/b.cpp".to_string(),
                "root-notes.md".to_string(),
            ],
        );

        let clang = graph
            .compute_changed_files(repo.ctx(), Some(&SplitDir::Dir("clang")))
            .unwrap();
        assert_eq!(clang.into_iter().collect::<Vec<_>>(), vec!["lib/a.cpp"]);

        let root_files = graph
            .compute_changed_files(repo.ctx(), Some(&SplitDir::Root))
            .unwrap();
        assert_eq!(
            root_files.into_iter().collect::<Vec<_>>(),
            vec!["root-notes.md"],
        );

        assert_eq!(
            graph.compute_changed_split_repos(repo.ctx()).unwrap(),
            vec![
                SplitDir::Root,
                SplitDir::Dir("clang"),
                SplitDir::Dir("llvm"),
            ],
        );
    }
}
