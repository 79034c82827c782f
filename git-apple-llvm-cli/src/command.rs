//! The command implementations.

use thiserror::Error;

pub mod graph;
pub mod pr;
pub mod push;
pub mod result;
pub mod status;
pub mod url;

/// Errors which bubble up to a `fatal:` line and a non-zero exit.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// A user-facing error with its own message.
    #[error("{}", message)]
    Fatal {
        /// The message to print.
        message: String,
    },
    /// A status reporting error.
    #[error("{}", source)]
    Status {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::am::StatusError,
    },
    /// A graph rendering error.
    #[error("{}", source)]
    Graph {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::am::GraphError,
    },
    /// A push error.
    #[error("{}", source)]
    Push {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::push::PushError,
    },
    /// A CI oracle error.
    #[error("{}", source)]
    Oracle {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::am::OracleError,
    },
    /// A state store error.
    #[error("{}", source)]
    Store {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::am::StoreError,
    },
    /// A git error.
    #[error("{}", source)]
    Git {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::git::GitError,
    },
    /// A pull-request configuration error.
    #[error("{}", source)]
    PrConfig {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::pr::PrConfigError,
    },
    /// A pull-request service error.
    #[error("{}", source)]
    PrTool {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::pr::PrToolError,
    },
    /// A pull-request test dispatch error.
    #[error("{}", source)]
    PrTest {
        /// The source of the error.
        #[from]
        source: git_apple_llvm::pr::PrTestError,
    },
    /// A GitHub backend error.
    #[error("{}", source)]
    Github {
        /// The source of the error.
        #[from]
        source: git_apple_llvm_github::GithubError,
    },
}

impl CommandError {
    /// A user-facing fatal error.
    pub fn fatal<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        CommandError::Fatal {
            message: message.into(),
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
