use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to scan folder {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start folder watch: {0}")]
    Watch(#[from] notify::Error),
    #[error("No Tokio runtime to run the folder watch on")]
    NoRuntime,
    #[error("Folder is already being watched")]
    AlreadyWatching,
    #[error("Folder reader is closed")]
    Closed,
    #[error(transparent)]
    Close(#[from] CloseError),
}

/// A single file that could not be released on close.
#[derive(Debug)]
pub struct CloseFailure {
    pub path: PathBuf,
    pub error: io::Error,
}

impl fmt::Display for CloseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// Every close failure of a [`FolderReader`](crate::FolderReader), collected
/// rather than stopping at the first one.
#[derive(Debug)]
pub struct CloseError {
    failures: Vec<CloseFailure>,
}

impl CloseError {
    pub(crate) fn new(failures: Vec<CloseFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(CloseError { failures })
        }
    }

    pub fn failures(&self) -> &[CloseFailure] {
        self.failures.as_slice()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always `false`; an empty set of failures is not an error.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} file(s) failed to close: [", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", failure)?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for CloseError {}
