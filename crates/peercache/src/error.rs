// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use thiserror::Error;

/// A boxed error returned by collaborators plugged into a [`Group`](crate::Group).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A shared error source. Errors are cloned to every caller waiting on the same load.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for cache operations that return a cache [`Error`][enum@Error] on
/// failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error returned by a cache [`Group`](crate::Group).
///
/// Errors are cheap to clone: when many callers wait on the same load, each of them receives an
/// equal copy of the one error that load produced.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller asked for the empty key.
    #[error("key is required")]
    EmptyKey,

    /// The origin accessor failed to produce a value. Nothing was cached.
    #[error("loading {key:?} from origin failed")]
    Origin {
        /// The key being loaded.
        key: String,
        /// The error returned by the origin accessor.
        #[source]
        source: SharedError,
    },

    /// A peer failed to serve a key it owns.
    ///
    /// [`Group::get`](crate::Group::get) never returns this variant: a peer failure is logged and
    /// the key is loaded from the local origin instead.
    #[error("loading {key:?} from peer failed")]
    Peer {
        /// The key being loaded.
        key: String,
        /// The error returned by the peer.
        #[source]
        source: SharedError,
    },

    /// The load panicked before producing a value.
    #[error("loading {key:?} was aborted: {message}")]
    Aborted {
        /// The key being loaded.
        key: String,
        /// The panic message.
        message: String,
    },
}

impl Error {
    pub(crate) fn origin(key: &str, source: BoxError) -> Self {
        Self::Origin {
            key: key.to_string(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn peer(key: &str, source: BoxError) -> Self {
        Self::Peer {
            key: key.to_string(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn aborted(key: &str, panicked: &flightgroup::Panicked) -> Self {
        Self::Aborted {
            key: key.to_string(),
            message: panicked.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn empty_key_display() {
        assert_eq!(Error::EmptyKey.to_string(), "key is required");
    }

    #[test]
    fn origin_keeps_source() {
        let error = Error::origin("k", "database unreachable".into());
        assert_eq!(error.to_string(), "loading \"k\" from origin failed");
        let source = error.source().expect("origin error has a source");
        assert_eq!(source.to_string(), "database unreachable");
    }

    #[test]
    fn peer_keeps_source() {
        let error = Error::peer("k", "connection refused".into());
        assert!(matches!(&error, Error::Peer { key, .. } if key == "k"));
        assert_eq!(error.source().map(ToString::to_string).as_deref(), Some("connection refused"));
    }

    #[test]
    fn clones_share_the_source() {
        let error = Error::origin("k", "boom".into());
        let clone = error.clone();
        match (error, clone) {
            (Error::Origin { source: a, .. }, Error::Origin { source: b, .. }) => assert!(Arc::ptr_eq(&a, &b)),
            _ => unreachable!(),
        }
    }
}
