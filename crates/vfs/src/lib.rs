use std::io;
use std::path::{Path, PathBuf};

mod any;
mod native;
mod opfs;
mod unseekable;

pub use any::{AnyFile, AnyVfs};
pub use native::Native;
pub use opfs::{HandleLocked, Opfs, OpfsFile, ACQUIRE_RETRY_BUDGET, ACQUIRE_RETRY_INTERVAL};
pub use unseekable::{Unseekable, UnseekableFile};

/// File-level operations beyond the `std::io` traits.
///
/// Split out so that wrappers (buffered writers, test shims) can forward them
/// to the underlying file object.
pub trait FileLike {
    /// Flush file contents to stable storage.
    ///
    /// Calls the platform's durability primitive: `fdatasync(2)` for host
    /// files, the access handle's flush for the sandbox backend.
    fn fsync(&mut self) -> io::Result<()>;

    /// Set the file length to `len` bytes.
    ///
    /// A `len` greater than the current length extends the file with
    /// implementation-defined bytes. The file position is not changed, as per
    /// `ftruncate(2)`.
    fn ftruncate(&mut self, len: u64) -> io::Result<()>;
}

/// One entry of a directory listing, as returned by [`Vfs::read_dir`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    /// The entry's name, without any leading path.
    pub name: String,
    pub is_file: bool,
    pub is_dir: bool,
}

/// A platform file backend.
///
/// The log format above this trait requires only positional byte I/O plus a
/// handful of path-level operations, so this is the whole portability
/// contract: the same log files work on a host filesystem and inside the
/// browser's origin-private sandbox.
///
/// Contracts all implementations uphold:
///
/// - `read` returning `Ok(0)` with a non-empty buffer is the EOF sentinel.
/// - Partial writes are looped internally; callers use `write_all` and only
///   see non-recoverable errors.
/// - `seek(SeekFrom::End(0))` is the canonical way to obtain the current
///   file length.
///
/// None of the operations are required to be thread-safe across file objects
/// obtained from the same backend.
pub trait Vfs: Clone {
    /// The type of open files produced by this backend.
    type File: io::Read + io::Write + io::Seek + FileLike;

    /// Open the file at `path`, creating it iff `write` is `true`.
    ///
    /// Returns [`io::ErrorKind::NotFound`] if the file (or, when creating,
    /// its parent directory) does not exist.
    fn open(&self, path: &Path, write: bool) -> io::Result<Self::File>;

    /// Remove the file at `path`.
    ///
    /// Returns `true` if the file was removed, `false` if it was absent or
    /// inaccessible. Never fails.
    fn remove(&self, path: &Path) -> bool;

    /// Create the directory at `path`, including all missing ancestors.
    ///
    /// Returns `false` on failure. Never fails.
    fn mkdir(&self, path: &Path) -> bool;

    /// `true` if `path` names an existing file or directory. Never fails.
    fn exists(&self, path: &Path) -> bool;

    /// Copy the file at `src` to `dst`, overwriting `dst` if present.
    ///
    /// The parent directory of `dst` must exist.
    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// List the entries of the directory at `path`.
    ///
    /// Fails only if `path` does not name a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// The current working directory.
    fn cwd(&self) -> io::Result<PathBuf>;

    /// A directory suitable for temporary files.
    fn temp_dir(&self) -> PathBuf;
}
