use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use log::debug;
use thiserror::Error;

use crate::{DirEntry, FileLike, Vfs};

type SharedLock<T> = Arc<RwLock<T>>;
type SharedBytes = SharedLock<Vec<u8>>;

/// Interval between attempts to acquire a contended access handle.
pub const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(10);
/// Total budget for acquiring a contended access handle before giving up.
pub const ACQUIRE_RETRY_BUDGET: Duration = Duration::from_millis(100);

/// The file's synchronous access handle is held elsewhere.
///
/// Wrapped in an [`io::Error`] of kind [`io::ErrorKind::WouldBlock`].
/// [`Opfs::open`] absorbs this within its retry budget; it surfaces only
/// after the budget is exhausted.
#[derive(Debug, Error)]
#[error("file is locked by another access handle: {path}")]
pub struct HandleLocked {
    pub path: PathBuf,
}

fn is_lock_contention(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

#[derive(Debug, Default)]
struct Slot {
    data: SharedBytes,
    /// Set while a synchronous access handle to this file is live.
    handle_taken: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct Namespace {
    files: BTreeMap<PathBuf, Slot>,
    dirs: BTreeSet<PathBuf>,
}

impl Namespace {
    fn has_dir(&self, path: &Path) -> bool {
        path.as_os_str().is_empty() || path == Path::new("/") || self.dirs.contains(path)
    }
}

/// Backend shaped like the browser's Origin Private File System.
///
/// A sandboxed per-origin namespace in which each file is accessed through an
/// *exclusive* synchronous access handle: opening a file whose handle is
/// still live fails with a lock condition. A just-closed handle may remain
/// locked for a brief moment, so [`Opfs::open`] retries lock contention at
/// [`ACQUIRE_RETRY_INTERVAL`] for up to [`ACQUIRE_RETRY_BUDGET`]. Any other
/// error bypasses the retry and propagates immediately.
///
/// Clones share the namespace.
#[derive(Clone, Debug)]
pub struct Opfs {
    inner: SharedLock<Namespace>,
    retry_interval: Duration,
    retry_budget: Duration,
}

impl Default for Opfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Opfs {
    pub fn new() -> Self {
        Self::with_retry(ACQUIRE_RETRY_INTERVAL, ACQUIRE_RETRY_BUDGET)
    }

    /// Create a sandbox with a custom retry policy for handle acquisition.
    pub fn with_retry(retry_interval: Duration, retry_budget: Duration) -> Self {
        let this = Self {
            inner: Default::default(),
            retry_interval,
            retry_budget,
        };
        this.inner.write().unwrap().dirs.insert("/tmp".into());
        this
    }

    fn try_open(&self, path: &Path, write: bool) -> io::Result<OpfsFile> {
        let mut inner = self.inner.write().unwrap();

        if write {
            let parent = path.parent().unwrap_or(Path::new("/"));
            if !inner.has_dir(parent) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("parent directory does not exist: {}", parent.display()),
                ));
            }
        } else if !inner.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file does not exist: {}", path.display()),
            ));
        }

        let slot = inner.files.entry(path.to_owned()).or_default();
        if slot.handle_taken.swap(true, Ordering::AcqRel) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                HandleLocked { path: path.to_owned() },
            ));
        }

        Ok(OpfsFile {
            pos: 0,
            data: Arc::clone(&slot.data),
            handle: Arc::clone(&slot.handle_taken),
        })
    }
}

impl Vfs for Opfs {
    type File = OpfsFile;

    fn open(&self, path: &Path, write: bool) -> io::Result<Self::File> {
        let deadline = Instant::now() + self.retry_budget;
        loop {
            match self.try_open(path, write) {
                Err(e) if is_lock_contention(&e) && Instant::now() < deadline => {
                    debug!("{}: locked, retrying", path.display());
                    std::thread::sleep(self.retry_interval);
                }
                res => return res,
            }
        }
    }

    fn remove(&self, path: &Path) -> bool {
        let mut inner = self.inner.write().unwrap();
        // A live access handle blocks removal.
        let locked = inner
            .files
            .get(path)
            .map(|slot| slot.handle_taken.load(Ordering::Acquire));
        match locked {
            Some(false) => inner.files.remove(path).is_some(),
            Some(true) | None => false,
        }
    }

    fn mkdir(&self, path: &Path) -> bool {
        let mut inner = self.inner.write().unwrap();
        let mut dir = path;
        loop {
            inner.dirs.insert(dir.to_owned());
            match dir.parent() {
                Some(parent) if !parent.as_os_str().is_empty() && parent != Path::new("/") => {
                    dir = parent
                }
                _ => break,
            }
        }
        true
    }

    fn exists(&self, path: &Path) -> bool {
        let inner = self.inner.read().unwrap();
        inner.files.contains_key(path) || inner.has_dir(path)
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let mut inner = self.inner.write().unwrap();

        let bytes = inner
            .files
            .get(src)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("file does not exist: {}", src.display()),
                )
            })
            .map(|slot| slot.data.read().unwrap().clone())?;

        let parent = dst.parent().unwrap_or(Path::new("/"));
        if !inner.has_dir(parent) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("parent directory does not exist: {}", parent.display()),
            ));
        }
        let slot = inner.files.entry(dst.to_owned()).or_default();
        if slot.handle_taken.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                HandleLocked { path: dst.to_owned() },
            ));
        }
        *slot.data.write().unwrap() = bytes;

        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let inner = self.inner.read().unwrap();
        if !inner.has_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory does not exist: {}", path.display()),
            ));
        }

        let name_under = |candidate: &Path| {
            candidate
                .parent()
                .filter(|parent| *parent == path || (path == Path::new("/") && parent.as_os_str().is_empty()))
                .and_then(|_| candidate.file_name())
                .map(|name| name.to_string_lossy().into_owned())
        };

        let files = inner.files.keys().filter_map(|p| {
            name_under(p.as_path()).map(|name| DirEntry {
                name,
                is_file: true,
                is_dir: false,
            })
        });
        let dirs = inner.dirs.iter().filter_map(|p| {
            name_under(p.as_path()).map(|name| DirEntry {
                name,
                is_file: false,
                is_dir: true,
            })
        });

        Ok(files.chain(dirs).collect())
    }

    fn cwd(&self) -> io::Result<PathBuf> {
        Ok(PathBuf::from("/"))
    }

    fn temp_dir(&self) -> PathBuf {
        PathBuf::from("/tmp")
    }
}

/// An open sandbox file holding its exclusive access handle.
///
/// The handle is released when the file is dropped.
#[derive(Debug)]
pub struct OpfsFile {
    pos: u64,
    data: SharedBytes,
    handle: Arc<AtomicBool>,
}

impl Drop for OpfsFile {
    fn drop(&mut self) {
        self.handle.store(false, Ordering::Release);
    }
}

impl io::Read for OpfsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.read().unwrap();
        let pos = (self.pos as usize).min(data.len());
        let n = io::Read::read(&mut &data[pos..], buf)?;
        self.pos += n as u64;

        Ok(n)
    }
}

impl io::Write for OpfsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.write().unwrap();
        let pos = self.pos as usize;
        if data.len() < pos + buf.len() {
            data.resize(pos + buf.len(), 0);
        }
        data[pos..pos + buf.len()].copy_from_slice(buf);
        self.pos += buf.len() as u64;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for OpfsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.data.read().unwrap().len() as u64, n),
            SeekFrom::Current(n) => (self.pos, n),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl FileLike for OpfsFile {
    fn fsync(&mut self) -> io::Result<()> {
        // The access handle's flush; the sandbox holds everything in memory.
        Ok(())
    }

    fn ftruncate(&mut self, len: u64) -> io::Result<()> {
        let mut data = self.data.write().unwrap();
        data.resize(len as usize, 0);
        // The offset is not changed, as per `ftruncate(2)`.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, Write};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn access_handles_are_exclusive() {
        let fs = Opfs::with_retry(Duration::from_millis(1), Duration::from_millis(5));
        let path = Path::new("/db/items.jsonlog");
        assert!(fs.mkdir(Path::new("/db")));

        let held = fs.open(path, true).unwrap();
        let res = fs.open(path, true);
        assert!(is_lock_contention(&res.unwrap_err()));

        // Releasing the handle makes the file openable again.
        drop(held);
        fs.open(path, false).unwrap();
    }

    #[test]
    fn open_retries_until_handle_released() {
        let fs = Opfs::new();
        let path = Path::new("/items.jsonlog");

        let held = fs.open(path, true).unwrap();
        let fs2 = fs.clone();
        let t = std::thread::spawn(move || fs2.open(path, true).map(drop));
        std::thread::sleep(Duration::from_millis(30));
        drop(held);

        t.join().unwrap().unwrap();
    }

    #[test]
    fn open_read_only_requires_existing_file() {
        let fs = Opfs::new();
        let res = fs.open(Path::new("/absent"), false);
        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::NotFound);
        // And the failed open did not create the file.
        assert!(!fs.exists(Path::new("/absent")));
    }

    #[test]
    fn write_requires_parent_directory() {
        let fs = Opfs::new();
        let res = fs.open(Path::new("/db/items.jsonlog"), true);
        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::NotFound);

        assert!(fs.mkdir(Path::new("/db")));
        fs.open(Path::new("/db/items.jsonlog"), true).unwrap();
    }

    #[test]
    fn positional_read_write() {
        let fs = Opfs::new();
        let path = Path::new("/log");

        let mut file = fs.open(path, true).unwrap();
        file.write_all(b"abcdef").unwrap();
        file.seek(SeekFrom::Start(2)).unwrap();
        file.write_all(b"YY").unwrap();

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(&buf, b"abYYef");

        assert_eq!(file.seek(SeekFrom::End(0)).unwrap(), 6);
        assert_eq!(file.read(&mut [0; 4]).unwrap(), 0);
    }

    #[test]
    fn truncate_extends_with_zeroes() {
        let fs = Opfs::new();
        let mut file = fs.open(Path::new("/log"), true).unwrap();
        file.write_all(b"ab").unwrap();
        file.ftruncate(4).unwrap();

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(&buf, b"ab\0\0");
    }

    #[test]
    fn remove_respects_live_handles() {
        let fs = Opfs::new();
        let path = Path::new("/log");

        let held = fs.open(path, true).unwrap();
        assert!(!fs.remove(path));
        drop(held);
        assert!(fs.remove(path));
        assert!(!fs.remove(path));
    }

    #[test]
    fn read_dir_lists_direct_children() {
        let fs = Opfs::new();
        assert!(fs.mkdir(Path::new("/db/nested")));
        drop(fs.open(Path::new("/db/items.jsonlog"), true).unwrap());
        drop(fs.open(Path::new("/db/nested/deep.jsonlog"), true).unwrap());

        let mut entries = fs.read_dir(Path::new("/db")).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "items.jsonlog".into(),
                    is_file: true,
                    is_dir: false
                },
                DirEntry {
                    name: "nested".into(),
                    is_file: false,
                    is_dir: true
                },
            ]
        );
    }
}
