//! Error taxonomy shared by the sorter and the content generator.

use std::error;
use std::fmt;
use std::io;

use bytesize::ByteSize;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Sorting or generation error.
///
/// Every variant aborts the whole invocation. By the time an error reaches the caller all temporary
/// artifacts created by that invocation have been removed.
#[derive(Debug)]
pub enum Error {
    /// Invalid caller supplied parameter.
    Configuration(String),
    /// The operation would consume more than a safe fraction of the scratch space.
    ResourceExhaustion {
        /// Bytes the operation needs to be considered safe.
        required: u64,
        /// Bytes usable on the scratch filesystem.
        available: u64,
    },
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Read, write, create or delete failure on the source, a chunk or the output.
    IO(io::Error),
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self {
            Error::Configuration(_) | Error::ResourceExhaustion { .. } => None,
            Error::TempDir(err) => Some(err),
            Error::ThreadPoolBuildError(err) => Some(err),
            Error::IO(err) => Some(err),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            Error::Configuration(message) => write!(f, "invalid configuration: {}", message),
            Error::ResourceExhaustion { required, available } => write!(
                f,
                "not enough scratch space: {} required, {} usable",
                ByteSize(*required),
                ByteSize(*available)
            ),
            Error::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            Error::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            Error::IO(err) => write!(f, "I/O operation failed: {}", err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IO(err)
    }
}
