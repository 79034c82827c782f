//! Mapping monorepo paths to their split repositories.

use std::fmt::{self, Display};

/// The monorepo directories that do not belong to the monorepo root repo.
pub const MONOREPO_SPLIT_DIRS: &[&str] = &[
    "clang",
    "clang-tools-extra",
    "compiler-rt",
    "debuginfo-tests",
    "libclc",
    "libcxx",
    "libcxxabi",
    "libunwind",
    "lld",
    "lldb",
    "llgo",
    "llvm",
    "openmp",
    "parallel-libs",
    "polly",
    "pstl",
];

/// A split repository: either a well-known component directory or the
/// monorepo root, which holds every path outside the component set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SplitDir {
    /// The monorepo root repository, spelled `-` in configuration.
    Root,
    /// A component directory.
    Dir(&'static str),
}

impl SplitDir {
    /// The split repository a monorepo path belongs to.
    pub fn for_path(git_path: &str) -> Self {
        let dir_prefix = match git_path.split_once('/') {
            Some((prefix, _)) => prefix,
            None => git_path,
        };
        Self::from_config_key(dir_prefix).unwrap_or(SplitDir::Root)
    }

    /// Parse a configuration key (`-` or a component name).
    pub fn from_config_key(key: &str) -> Option<Self> {
        if key == "-" {
            return Some(SplitDir::Root);
        }
        MONOREPO_SPLIT_DIRS
            .iter()
            .find(|&&dir| dir == key)
            .map(|&dir| SplitDir::Dir(dir))
    }

    /// The key used for this split repository in configuration files.
    pub fn config_key(&self) -> &'static str {
        match self {
            SplitDir::Root => "-",
            SplitDir::Dir(dir) => dir,
        }
    }

    /// The name that should be printed to the user.
    pub fn user_name(&self) -> &'static str {
        match self {
            SplitDir::Root => "monorepo root",
            SplitDir::Dir(dir) => dir,
        }
    }
}

impl Display for SplitDir {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.config_key())
    }
}

#[cfg(test)]
mod test {
    use crate::push::SplitDir;

    #[test]
    fn test_classify_paths() {
        assert_eq!(
            SplitDir::for_path("clang/lib/Basic/Targets.cpp"),
            SplitDir::Dir("clang"),
        );
        assert_eq!(SplitDir::for_path("llvm"), SplitDir::Dir("llvm"));
        assert_eq!(SplitDir::for_path("README.md"), SplitDir::Root);
        assert_eq!(
            SplitDir::for_path("apple-llvm-config/am/am-config.json"),
            SplitDir::Root,
        );
        // Only the first segment decides.
        assert_eq!(SplitDir::for_path("docs/clang/notes.md"), SplitDir::Root);
    }

    #[test]
    fn test_config_keys() {
        assert_eq!(SplitDir::from_config_key("-"), Some(SplitDir::Root));
        assert_eq!(SplitDir::from_config_key("lld"), Some(SplitDir::Dir("lld")));
        assert_eq!(SplitDir::from_config_key("not-a-component"), None);
        assert_eq!(SplitDir::Root.config_key(), "-");
        assert_eq!(SplitDir::Root.user_name(), "monorepo root");
        assert_eq!(SplitDir::Dir("clang").user_name(), "clang");
    }

    #[test]
    fn test_sort_order_matches_config_keys() {
        let mut dirs = vec![
            SplitDir::Dir("llvm"),
            SplitDir::Root,
            SplitDir::Dir("clang"),
        ];
        dirs.sort();
        // `-` sorts before any component name, as with plain string keys.
        assert_eq!(
            dirs,
            vec![
                SplitDir::Root,
                SplitDir::Dir("clang"),
                SplitDir::Dir("llvm"),
            ],
        );
    }
}
