//! Error kinds surfaced by FS-CORE.
//!
//! Invariant violations that indicate on-disk corruption or an
//! out-of-range bitmap index (bugs, not user errors) panic instead of
//! appearing here — see `Bitset`'s bounds checks and
//! [`crate::layout::SuperBlock::from_bytes`]'s magic-number assertion.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    #[error("no space left on device")]
    NoSpace,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Maps a [`Error`] to the `libc` errno `fuser` expects a failed
    /// operation to reply with.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::NotFound => libc::ENOENT,
            Error::AlreadyExists => libc::EEXIST,
            Error::NoSpace => libc::ENOSPC,
            Error::Io(_) => libc::EIO,
        }
    }
}
