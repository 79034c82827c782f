//! The CI oracle.
//!
//! Merge results and build URLs live in a keyed string store. The production
//! deployment keeps them in Redis; that client is an external collaborator
//! behind the [`StateStore`] trait, and the store shipped here keeps the
//! values as files under the local configuration directory.

use std::fs;
use std::io;
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::am::CommitState;
use crate::config;

/// Errors which may occur when talking to a state store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store has no usable location.
    #[error("no configuration directory is available for the state store")]
    NoStoreLocation {},
    /// Failure to read or write a stored value.
    #[error("failed to access the state store for key `{}`: {}", key, source)]
    Access {
        /// The key being accessed.
        key: String,
        /// The source of the error.
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn no_store_location() -> Self {
        StoreError::NoStoreLocation {}
    }

    fn access(key: String, source: io::Error) -> Self {
        StoreError::Access {
            key,
            source,
        }
    }
}

/// A keyed string store.
pub trait StateStore {
    /// Look up the value for a key.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Store a value for a key.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Remove a key.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// A state store kept as files under the local configuration directory.
#[derive(Debug)]
pub struct FsStateStore {
    root: PathBuf,
}

impl FsStateStore {
    /// Create a store under the tool's configuration directory.
    pub fn new() -> Result<Self, StoreError> {
        let root = config::get_config_dir()
            .ok_or_else(StoreError::no_store_location)?
            .join("am-state");
        Ok(FsStateStore {
            root,
        })
    }

    /// Create a store rooted at a specific directory.
    pub fn at<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        FsStateStore {
            root: root.into(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        // Keys contain branch names; escape the path separators (and the
        // escape character itself) so every key maps to a single file name.
        let encoded: String = key
            .chars()
            .map(|c| {
                match c {
                    '/' => "%2F".into(),
                    '%' => "%25".into(),
                    c => c.to_string(),
                }
            })
            .collect();
        self.root.join(encoded)
    }
}

impl StateStore for FsStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::access(key.into(), err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|err| StoreError::access(key.into(), err))?;
        fs::write(self.key_path(key), value).map_err(|err| StoreError::access(key.into(), err))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::access(key.into(), err)),
        }
    }
}

/// Errors which may occur when consulting the CI oracle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OracleError {
    /// A stored CI state is not one of the known commit states.
    #[error("unknown CI state `{}` recorded for `{}`", value, key)]
    UnknownState {
        /// The key that was looked up.
        key: String,
        /// The offending value.
        value: String,
    },
    /// Failure to access the underlying store.
    #[error("state store error: {}", source)]
    Store {
        /// The source of the error.
        #[from]
        source: StoreError,
    },
}

impl OracleError {
    fn unknown_state(key: String, value: String) -> Self {
        OracleError::UnknownState {
            key,
            value,
        }
    }
}

/// The CI state recorded for merging a commit into a target branch.
pub fn get_ci_status(
    store: &dyn StateStore,
    commit: &str,
    target_branch: &str,
) -> Result<Option<CommitState>, OracleError> {
    let key = format!("{}_{}", commit, target_branch);
    let value = match store.get(&key)? {
        Some(value) => value,
        None => return Ok(None),
    };

    debug!(target: "apple-llvm/am", "state for {}: {}", key, value);
    match CommitState::parse(&value) {
        Some(state) => Ok(Some(state)),
        None => Err(OracleError::unknown_state(key, value)),
    }
}

/// Record the build URL for a merge.
pub fn set_build_url(
    store: &dyn StateStore,
    merge_id: &str,
    url: &str,
) -> Result<(), OracleError> {
    Ok(store.set(&format!("{}.build_url", merge_id), url)?)
}

/// The build URL recorded for a merge.
pub fn get_build_url(
    store: &dyn StateStore,
    merge_id: &str,
) -> Result<Option<String>, OracleError> {
    Ok(store.get(&format!("{}.build_url", merge_id))?)
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use crate::am::oracle::{
        get_build_url, get_ci_status, set_build_url, FsStateStore, OracleError, StateStore,
    };
    use crate::am::CommitState;

    #[test]
    fn test_fs_store_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FsStateStore::at(tmp.path().join("am-state"));

        assert_eq!(store.get("missing").unwrap(), None);
        store.set("a-key", "a value").unwrap();
        assert_eq!(store.get("a-key").unwrap().as_deref(), Some("a value"));
        store.delete("a-key").unwrap();
        assert_eq!(store.get("a-key").unwrap(), None);
        // Deleting a missing key is fine.
        store.delete("a-key").unwrap();
    }

    #[test]
    fn test_keys_with_branch_separators() {
        let tmp = TempDir::new().unwrap();
        let store = FsStateStore::at(tmp.path().join("am-state"));

        let key = "f0931a1b36c88157ffc25a9ed1295f3addff85b9_swift/master-next";
        store.set(key, "PASSED").unwrap();
        assert_eq!(store.get(key).unwrap().as_deref(), Some("PASSED"));
        assert_eq!(
            get_ci_status(
                &store,
                "f0931a1b36c88157ffc25a9ed1295f3addff85b9",
                "swift/master-next",
            )
            .unwrap(),
            Some(CommitState::Passed),
        );
    }

    #[test]
    fn test_unknown_ci_state_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FsStateStore::at(tmp.path().join("am-state"));

        store.set("abc_master", "GREAT_SUCCESS").unwrap();
        let err = get_ci_status(&store, "abc", "master").unwrap_err();
        assert!(matches!(err, OracleError::UnknownState { .. }));
    }

    #[test]
    fn test_build_url_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FsStateStore::at(tmp.path().join("am-state"));

        assert_eq!(get_build_url(&store, "abc_master").unwrap(), None);
        set_build_url(&store, "abc_master", "https://ci.example.com/1").unwrap();
        assert_eq!(
            get_build_url(&store, "abc_master").unwrap().as_deref(),
            Some("https://ci.example.com/1"),
        );
    }
}
