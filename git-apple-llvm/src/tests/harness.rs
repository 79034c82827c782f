//! Scratch repositories for the integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::git::{CommitId, GitContext};

/// A scratch git repository backed by a temporary directory.
pub(crate) struct TestRepo {
    _dir: TempDir,
    path: PathBuf,
    ctx: GitContext,
}

impl TestRepo {
    /// Create a repository with git's default initial branch.
    pub(crate) fn new() -> Self {
        Self::init(None)
    }

    /// Create a repository whose initial branch has the given name.
    pub(crate) fn new_with_branch(branch: &str) -> Self {
        Self::init(Some(branch))
    }

    fn init(branch: Option<&str>) -> Self {
        let dir = TempDir::new().expect("failed to create a scratch directory");
        let path = dir.path().to_path_buf();
        let ctx = GitContext::new(&path);
        ctx.git().arg("init").output().unwrap();
        if let Some(branch) = branch {
            ctx.git()
                .args(["symbolic-ref", "HEAD"])
                .arg(format!("refs/heads/{}", branch))
                .run()
                .unwrap();
        }

        let repo = TestRepo {
            _dir: dir,
            path,
            ctx,
        };
        repo.configure_identity();
        repo
    }

    /// Create a repository cloned from another one, with `origin` pointing
    /// back at it.
    pub(crate) fn clone_of(origin: &TestRepo) -> Self {
        let repo = Self::new();
        repo.ctx
            .git()
            .args(["remote", "add", "origin"])
            .arg(origin.path())
            .run()
            .unwrap();
        repo.ctx.git().args(["fetch", "origin"]).run().unwrap();
        repo
    }

    /// Create a bare clone of another repository at a pre-chosen path.
    ///
    /// The target path has to come from [`bare_repo_path`] so the caller can
    /// refer to the repository before it exists.
    pub(crate) fn bare_clone_at(target: (TempDir, PathBuf), origin: &TestRepo) -> Self {
        let (dir, path) = target;
        let ctx = GitContext::new(dir.path());
        ctx.git()
            .args(["clone", "--bare"])
            .arg(origin.path())
            .arg(&path)
            .run()
            .unwrap();

        TestRepo {
            _dir: dir,
            ctx: GitContext::new(&path),
            path,
        }
    }

    fn configure_identity(&self) {
        self.ctx
            .git()
            .args(["config", "user.name", "Test Harness"])
            .run()
            .unwrap();
        self.ctx
            .git()
            .args(["config", "user.email", "harness@example.com"])
            .run()
            .unwrap();
    }

    /// The root of the repository.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// A context for running git commands in the repository.
    pub(crate) fn ctx(&self) -> &GitContext {
        &self.ctx
    }

    /// Resolve a committish.
    pub(crate) fn rev_parse(&self, committish: &str) -> CommitId {
        CommitId::new(
            self.ctx
                .git()
                .args(["rev-parse", committish])
                .output()
                .unwrap(),
        )
    }

    /// Create or move a branch.
    pub(crate) fn branch(&self, name: &str, at: &str) {
        self.ctx
            .git()
            .args(["branch", "-f", name, at])
            .run()
            .unwrap();
    }

    /// Check out a committish.
    pub(crate) fn checkout(&self, committish: &str) {
        self.ctx
            .git()
            .args(["checkout", committish])
            .run()
            .unwrap();
    }

    /// Create an empty commit on the current branch.
    pub(crate) fn commit_empty(&self, message: &str) -> CommitId {
        self.ctx
            .git()
            .args(["commit", "--allow-empty", "-m", message])
            .output()
            .unwrap();
        self.rev_parse("HEAD")
    }

    /// Write a set of files and commit them.
    pub(crate) fn commit_files(&self, files: &[(&str, &str)], message: &str) -> CommitId {
        for (path, contents) in files {
            let full_path = self.path.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&full_path, contents).unwrap();
            self.ctx.git().args(["add", path]).run().unwrap();
        }
        self.ctx
            .git()
            .args(["commit", "-m", message])
            .output()
            .unwrap();
        self.rev_parse("HEAD")
    }

    /// Write a single file and commit it.
    pub(crate) fn commit_file(&self, path: &str, contents: &str, message: &str) -> CommitId {
        self.commit_files(&[(path, contents)], message)
    }

    /// Commit a file on a detached head at the given start point.
    pub(crate) fn commit_file_on_branch(
        &self,
        path: &str,
        contents: &str,
        message: &str,
        start: &str,
    ) -> CommitId {
        self.ctx
            .git()
            .args(["checkout", "--detach", start])
            .run()
            .unwrap();
        self.commit_file(path, contents, message)
    }

    /// Merge a committish into the current branch.
    pub(crate) fn merge(&self, committish: &str) {
        self.ctx
            .git()
            .args(["merge", "--no-edit", committish])
            .output()
            .unwrap();
    }

    /// Point a ref at a commit.
    pub(crate) fn update_ref(&self, refname: &str, commit: &CommitId) {
        self.ctx
            .git()
            .args(["update-ref", refname])
            .arg(commit.as_str())
            .run()
            .unwrap();
    }

    /// Delete a ref.
    pub(crate) fn delete_ref(&self, refname: &str) {
        self.ctx
            .git()
            .args(["update-ref", "-d", refname])
            .run()
            .unwrap();
    }
}

/// Reserve a path for a bare repository that does not exist yet.
pub(crate) fn bare_repo_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("failed to create a scratch directory");
    let path = dir.path().join("repo.git");
    (dir, path)
}

/// A monorepo with three configured split repositories.
///
/// The monorepo's `internal/master` history imports the `clang` and `llvm`
/// components and the monorepo root, each import carrying the split-commit
/// trailers pointing at the corresponding split repository's head. Pushes
/// run from `clone`.
pub(crate) struct MonorepoFixture {
    pub upstream: TestRepo,
    pub clone: TestRepo,
    pub clang_builder: TestRepo,
    pub clang_remote: TestRepo,
    pub llvm_remote: TestRepo,
    pub root_remote: TestRepo,
    pub clang_split_tip: CommitId,
    pub llvm_split_tip: CommitId,
    pub root_split_tip: CommitId,
}

impl MonorepoFixture {
    pub(crate) fn new() -> Self {
        // The split remote paths go into the push configuration, which is
        // itself part of the monorepo-root content; reserve them up front.
        let clang_remote_path = bare_repo_path();
        let llvm_remote_path = bare_repo_path();
        let root_remote_path = bare_repo_path();

        let push_config = format!(
            r#"{{
    "branch_to_dest_branch_mapping": {{
        "internal/master:-": "internal/master",
        "internal/master:*": "master"
    }},
    "repo_mapping": {{
        "clang": "{clang}",
        "llvm": "{llvm}",
        "-": "{root}"
    }}
}}
"#,
            clang = clang_remote_path.1.display(),
            llvm = llvm_remote_path.1.display(),
            root = root_remote_path.1.display(),
        );

        // The split histories; the monorepo's imported content has to match
        // them tree-for-tree.
        let clang_builder = TestRepo::new_with_branch("master");
        let clang_split_tip = clang_builder.commit_file("clang-file", "clang\n", "clang initial");
        let llvm_builder = TestRepo::new_with_branch("master");
        let llvm_split_tip = llvm_builder.commit_file("llvm-file", "llvm\n", "llvm initial");
        let root_builder = TestRepo::new_with_branch("internal/master");
        let root_split_tip = root_builder.commit_files(
            &[
                ("root-file", "root\n"),
                (
                    "apple-llvm-config/push/internal-master.json",
                    push_config.as_str(),
                ),
            ],
            "root initial",
        );

        let clang_remote = TestRepo::bare_clone_at(clang_remote_path, &clang_builder);
        let llvm_remote = TestRepo::bare_clone_at(llvm_remote_path, &llvm_builder);
        let root_remote = TestRepo::bare_clone_at(root_remote_path, &root_builder);

        // The monorepo's internal/master imports each split history.
        let upstream = TestRepo::new_with_branch("internal/master");
        upstream.commit_file(
            "clang/clang-file",
            "clang\n",
            &format!(
                "import clang\n\napple-llvm-split-commit: {}\napple-llvm-split-dir: clang/",
                clang_split_tip,
            ),
        );
        upstream.commit_file(
            "llvm/llvm-file",
            "llvm\n",
            &format!(
                "import llvm\n\napple-llvm-split-commit: {}\napple-llvm-split-dir: llvm/",
                llvm_split_tip,
            ),
        );
        upstream.commit_files(
            &[
                ("root-file", "root\n"),
                (
                    "apple-llvm-config/push/internal-master.json",
                    push_config.as_str(),
                ),
            ],
            &format!(
                "import monorepo root\n\napple-llvm-split-commit: {}\napple-llvm-split-dir: -/",
                root_split_tip,
            ),
        );
        // A remote branch without a push configuration.
        upstream.branch("llvm/master", "HEAD");

        let clone = TestRepo::clone_of(&upstream);
        clone.checkout("internal/master");

        MonorepoFixture {
            upstream,
            clone,
            clang_builder,
            clang_remote,
            llvm_remote,
            root_remote,
            clang_split_tip,
            llvm_split_tip,
            root_split_tip,
        }
    }
}
