use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use crate::{DirEntry, FileLike, Vfs};

/// Backend for host filesystems with positional I/O.
///
/// Thin wrapper around `std::fs`: the kernel owns the file position, and
/// durability is `fdatasync(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Native;

impl FileLike for File {
    fn fsync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn ftruncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl Vfs for Native {
    type File = File;

    fn open(&self, path: &Path, write: bool) -> io::Result<Self::File> {
        File::options()
            .read(true)
            .write(write)
            .create(write)
            .open(path)
    }

    fn remove(&self, path: &Path) -> bool {
        fs::remove_file(path)
            .inspect_err(|e| {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("failed to remove {}: {e}", path.display());
                }
            })
            .is_ok()
    }

    fn mkdir(&self, path: &Path) -> bool {
        fs::create_dir_all(path)
            .inspect_err(|e| warn!("failed to create {}: {e}", path.display()))
            .is_ok()
    }

    fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok()
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::copy(src, dst).map(drop)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_file: file_type.is_file(),
                is_dir: file_type.is_dir(),
            });
        }

        Ok(entries)
    }

    fn cwd(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }
}
