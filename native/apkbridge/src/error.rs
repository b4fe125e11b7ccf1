use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the manifest and install pipelines.
///
/// Every variant is fatal to the current invocation. Transient conditions, such as the
/// destination file not existing yet while the progress poller runs, never become an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("archive entry not found: {0}")]
    EntryNotFound(String),

    #[error("malformed archive")]
    MalformedArchive(#[source] zip::result::ZipError),

    #[error("failed to read archive entry {name}")]
    ReadFailure {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("failed to open package source {location}")]
    SourceFetchFailure {
        location: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write {path} on device")]
    RemoteWriteFailure {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("remote command `{command}` failed")]
    RemoteCommandFailure {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0}")]
    ArgumentError(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn malformed_manifest(msg: impl Into<String>) -> Self {
        Error::MalformedManifest(msg.into())
    }

    pub(crate) fn source_fetch(location: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::SourceFetchFailure { location: location.into(), source: source.into() }
    }
}
