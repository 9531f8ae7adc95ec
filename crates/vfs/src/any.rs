use std::fs::File;
use std::io::{self, Read as _, Seek as _, SeekFrom, Write as _};
use std::path::{Path, PathBuf};

use crate::{DirEntry, FileLike, Native, Opfs, OpfsFile, Unseekable, UnseekableFile, Vfs};

/// Any of the concrete backends behind one type.
///
/// Processes that pick their backend from a runtime descriptor at startup
/// hold one of these; code generic over [`Vfs`] never needs it.
#[derive(Clone, Debug)]
pub enum AnyVfs {
    Native(Native),
    Unseekable(Unseekable),
    Opfs(Opfs),
}

impl From<Native> for AnyVfs {
    fn from(fs: Native) -> Self {
        Self::Native(fs)
    }
}

impl From<Unseekable> for AnyVfs {
    fn from(fs: Unseekable) -> Self {
        Self::Unseekable(fs)
    }
}

impl From<Opfs> for AnyVfs {
    fn from(fs: Opfs) -> Self {
        Self::Opfs(fs)
    }
}

/// An open file of [`AnyVfs`].
#[derive(Debug)]
pub enum AnyFile {
    Native(File),
    Unseekable(UnseekableFile),
    Opfs(OpfsFile),
}

macro_rules! delegate {
    ($this:expr, $file:pat => $body:expr) => {
        match $this {
            AnyFile::Native($file) => $body,
            AnyFile::Unseekable($file) => $body,
            AnyFile::Opfs($file) => $body,
        }
    };
}

impl io::Read for AnyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        delegate!(self, file => file.read(buf))
    }
}

impl io::Write for AnyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        delegate!(self, file => file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        delegate!(self, file => file.flush())
    }
}

impl io::Seek for AnyFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        delegate!(self, file => file.seek(pos))
    }
}

impl FileLike for AnyFile {
    fn fsync(&mut self) -> io::Result<()> {
        delegate!(self, file => file.fsync())
    }

    fn ftruncate(&mut self, len: u64) -> io::Result<()> {
        delegate!(self, file => file.ftruncate(len))
    }
}

macro_rules! delegate_fs {
    ($this:expr, $fs:pat => $body:expr) => {
        match $this {
            AnyVfs::Native($fs) => $body,
            AnyVfs::Unseekable($fs) => $body,
            AnyVfs::Opfs($fs) => $body,
        }
    };
}

impl Vfs for AnyVfs {
    type File = AnyFile;

    fn open(&self, path: &Path, write: bool) -> io::Result<Self::File> {
        match self {
            Self::Native(fs) => fs.open(path, write).map(AnyFile::Native),
            Self::Unseekable(fs) => fs.open(path, write).map(AnyFile::Unseekable),
            Self::Opfs(fs) => fs.open(path, write).map(AnyFile::Opfs),
        }
    }

    fn remove(&self, path: &Path) -> bool {
        delegate_fs!(self, fs => fs.remove(path))
    }

    fn mkdir(&self, path: &Path) -> bool {
        delegate_fs!(self, fs => fs.mkdir(path))
    }

    fn exists(&self, path: &Path) -> bool {
        delegate_fs!(self, fs => fs.exists(path))
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> io::Result<()> {
        delegate_fs!(self, fs => fs.copy_file(src, dst))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        delegate_fs!(self, fs => fs.read_dir(path))
    }

    fn cwd(&self) -> io::Result<PathBuf> {
        delegate_fs!(self, fs => fs.cwd())
    }

    fn temp_dir(&self) -> PathBuf {
        delegate_fs!(self, fs => fs.temp_dir())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, Write};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn dispatches_to_the_selected_backend() {
        let fs = AnyVfs::from(Opfs::new());
        assert!(fs.mkdir(Path::new("/db")));

        let mut file = fs.open(Path::new("/db/log"), true).unwrap();
        file.write_all(b"abc").unwrap();
        assert_eq!(file.seek(SeekFrom::End(0)).unwrap(), 3);
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "abc");
        drop(file);

        assert!(fs.exists(Path::new("/db/log")));
        assert!(fs.remove(Path::new("/db/log")));

        let tmp = tempfile::tempdir().unwrap();
        let fs = AnyVfs::from(Native);
        let path = tmp.path().join("log");
        drop(fs.open(&path, true).unwrap());
        assert!(fs.exists(&path));
    }
}
