//! Error taxonomy for DocuChat.
//!
//! Most of the crate works in `anyhow::Result` and attaches context as it
//! goes. The variants here are the ones callers need to tell apart: a bad
//! configuration stops setup, a collaborator failure aborts the current
//! batch or query, and a query against a store that does not exist yet is
//! recoverable by indexing first.
//!
//! Use [`is_not_initialized`] to test an `anyhow::Error` without caring how
//! much context was layered on top of it.

use std::path::PathBuf;

/// Errors with a failure policy attached.
#[derive(Debug, thiserror::Error)]
pub enum DocuChatError {
    /// Invalid or missing configuration, including unusable source directories.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The embedding service, chat model, or vector store failed.
    #[error("{service} request failed: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    /// A query was issued before any vector store exists.
    #[error("vector store not initialized at {}: run `docuchat index` first", path.display())]
    NotInitialized { path: PathBuf },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl DocuChatError {
    pub fn config(message: impl Into<String>) -> Self {
        DocuChatError::Configuration {
            message: message.into(),
        }
    }

    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        DocuChatError::Collaborator {
            service,
            message: message.into(),
        }
    }
}

/// True if `err` (or anything in its chain) is [`DocuChatError::NotInitialized`].
pub fn is_not_initialized(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<DocuChatError>(),
            Some(DocuChatError::NotInitialized { .. })
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn not_initialized_survives_context() {
        let err: anyhow::Result<()> = Err(DocuChatError::NotInitialized {
            path: PathBuf::from("/tmp/store"),
        }
        .into());
        let err = err.context("search failed").unwrap_err();
        assert!(is_not_initialized(&err));
    }

    #[test]
    fn other_errors_are_not_not_initialized() {
        let err = anyhow::Error::from(DocuChatError::config("no sources"));
        assert!(!is_not_initialized(&err));
        assert_eq!(err.to_string(), "configuration error: no sources");
    }
}
