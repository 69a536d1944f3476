use std::fmt;
use std::io;

use thiserror::Error;

use crate::binary_cache::ParseNarInfoError;
use crate::compression::Compression;
use crate::extract::NarPath;
use crate::store_path::ParseStorePathError;

/// Marker carried inside an [`io::Error`] when a read was aborted through a
/// [`CancelToken`](crate::io::CancelToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("read was cancelled")
    }
}

impl std::error::Error for Cancelled {}

impl Cancelled {
    pub fn into_io_error(self) -> io::Error {
        io::Error::other(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Directory => f.write_str("directory"),
            EntryKind::Symlink => f.write_str("symlink"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported compression '{0}'")]
    UnsupportedCodec(Compression),
    #[error("input doesn't look like a Nix archive")]
    NotANarArchive,
    #[error("NAR stream ended unexpectedly")]
    Truncated,
    #[error("malformed NAR: {0}")]
    MalformedArchive(String),
    #[error("'{path}' is a {kind} and can't be extracted as a regular file")]
    UnsupportedEntryType { path: NarPath, kind: EntryKind },
    #[error("{0} not found")]
    NotFound(String),
    #[error("operation was cancelled")]
    Cancelled,
    #[error("{0}")]
    BadStorePath(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error(".narinfo file is corrupt: {0}")]
    BadNarInfo(
        #[from]
        #[source]
        ParseNarInfoError,
    ),
    #[error("URL error: {0}")]
    URLError(
        #[from]
        #[source]
        url::ParseError,
    ),
    #[error("HTTP error: {0}")]
    ReqwestError(
        #[from]
        #[source]
        reqwest::Error,
    ),
    #[error("JSON error: {0}")]
    JSONError(
        #[from]
        #[source]
        serde_json::Error,
    ),
    #[error("I/O error: {0}")]
    IOError(#[source] io::Error),
}

impl Error {
    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Error {
        Error::MalformedArchive(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound(_) => 2,
            Error::Cancelled => 3,
            _ => 1,
        }
    }
}

fn is_cancelled(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<Cancelled>())
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if is_cancelled(&err) {
            Error::Cancelled
        } else if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::IOError(err)
        }
    }
}
