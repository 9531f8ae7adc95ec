use std::io;

use thiserror::Error;

/// Error returned by [`crate::Handle::append`].
#[derive(Debug, Error)]
pub enum Append {
    /// The log was opened read-only; writability is bound at open time.
    #[error("append to a log opened read-only")]
    WriteNotPermitted,
    #[error(transparent)]
    Io(#[from] io::Error),
}
