use std::collections::HashSet;
use std::io::{self, Read as _, Seek as _, SeekFrom, Write as _};
use std::path::Path;

use log::{debug, trace, warn};
use memchr::memchr;

use goatdb_vfs::{FileLike as _, Vfs};

use crate::record::{encode_batch, Record};
use crate::{error, Options};

/// An open log.
///
/// Owns the backend file object, the writability decided at open time, and
/// the set of record `id`s known to be in the log. The ID set is populated
/// by scanning; [`Handle::append`] consults it to drop duplicates.
///
/// At most one writable handle may exist per log file; the sandbox backend
/// enforces this through its exclusive access handles, host filesystems rely
/// on coordination above this crate.
pub struct Handle<V: Vfs> {
    file: V::File,
    writable: bool,
    known_ids: HashSet<String>,
    /// Whether some cursor has scanned this log to the end, verifying (and,
    /// if writable, repairing) the tail.
    did_scan: bool,
    opts: Options,
}

/// A forward-only scan position within a log.
///
/// Holds the read buffer and the bytes of a partially read record carried
/// across refills. The `last_good` offset is the authoritative recovery
/// point: a crash at any moment leaves the prefix up to it intact, and a
/// writable scan discards everything beyond it.
#[derive(Debug)]
pub struct Cursor {
    /// File offset of the next refill.
    pos: u64,
    /// File length recorded when the cursor was created. The scan does not
    /// look past it; records appended later are seen by later cursors.
    len: u64,
    /// Offset just past the last successfully parsed frame.
    last_good: u64,
    read_buf: Vec<u8>,
    /// Consumed / valid bounds of `read_buf`.
    buf_pos: usize,
    filled: usize,
    /// Bytes of the record currently being accumulated.
    obj_buf: Vec<u8>,
    page: usize,
    done: bool,
}

impl Cursor {
    /// Offset just past the last successfully parsed frame.
    pub fn last_good_offset(&self) -> u64 {
        self.last_good
    }

    /// Move buffered bytes up to and including the next record separator
    /// into the object buffer. Returns `false` if the buffered region was
    /// exhausted without finding a separator.
    fn consume_to_separator(&mut self) -> bool {
        let buf = &self.read_buf[self.buf_pos..self.filled];
        let (chunk, found, advance) = match memchr(b'\n', buf) {
            None => (buf, false, buf.len()),
            Some(i) => (&buf[..i], true, i + 1),
        };

        // The object buffer grows in whole pages.
        let needed = self.obj_buf.len() + chunk.len();
        if needed > self.obj_buf.capacity() {
            let grow = needed - self.obj_buf.capacity();
            self.obj_buf.reserve(grow.next_multiple_of(self.page));
        }
        self.obj_buf.extend_from_slice(chunk);
        self.buf_pos += advance;

        found
    }
}

fn parse_record(bytes: &[u8]) -> Option<Record> {
    let text = std::str::from_utf8(bytes).ok()?;
    Record::from_json(text).ok()
}

/// Open the log at `path`.
///
/// When `write` is `true`, the parent directory is created as needed and
/// the file is created if absent. A read-only open mutates nothing: a
/// missing file (or parent) fails with [`io::ErrorKind::NotFound`].
///
/// Does *not* scan the file: the known-ID set starts empty and the tail is
/// unverified until a cursor runs to the end (or the first [`Handle::append`]
/// does so internally).
pub fn open<V: Vfs>(vfs: &V, path: &Path, write: bool, opts: Options) -> io::Result<Handle<V>> {
    if write {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            vfs.mkdir(parent);
        }
    }
    let file = vfs.open(path, write)?;
    debug!("open {} write={write}", path.display());

    Ok(Handle {
        file,
        writable: write,
        known_ids: HashSet::new(),
        did_scan: false,
        opts,
    })
}

impl<V: Vfs> Handle<V> {
    /// Start a scan from the beginning of the log.
    pub fn begin_scan(&mut self) -> io::Result<Cursor> {
        let len = self.file.seek(SeekFrom::End(0))?;
        self.file.seek(SeekFrom::Start(0))?;
        trace!("begin scan len={len}");

        Ok(Cursor {
            pos: 0,
            len,
            last_good: 0,
            read_buf: vec![0; self.opts.read_buffer_size],
            buf_pos: 0,
            filled: 0,
            obj_buf: Vec::with_capacity(self.opts.object_buffer_page),
            page: self.opts.object_buffer_page,
            done: false,
        })
    }

    /// Advance `cursor`, decoding up to [`Options::scan_batch_size`] records.
    ///
    /// Returns the batch and whether the scan is complete. Callers iterate
    /// until `done` is `true`; scanning a finished cursor yields empty
    /// batches.
    ///
    /// A JSON decode error, or EOF in the middle of a frame, ends the valid
    /// prefix: on a writable handle the file is silently truncated to the
    /// last good offset, on a read-only handle the scan just stops. Either
    /// way the `id`s of all records seen by the cursor are in the handle's
    /// known-ID set afterwards.
    pub fn scan(&mut self, cursor: &mut Cursor) -> io::Result<(Vec<Record>, bool)> {
        if cursor.done {
            return Ok((Vec::new(), true));
        }

        let mut batch = Vec::new();
        loop {
            if batch.len() >= self.opts.scan_batch_size {
                return Ok((batch, false));
            }

            if cursor.buf_pos == cursor.filled && self.refill(cursor)? == 0 {
                // A dangling partial frame at EOF is a torn write.
                if !cursor.obj_buf.is_empty() {
                    debug!(
                        "torn frame at EOF: {} bytes past offset {}",
                        cursor.obj_buf.len(),
                        cursor.last_good
                    );
                    self.truncate_to(cursor.last_good)?;
                }
                self.finish_scan(cursor);
                return Ok((batch, true));
            }

            if !cursor.consume_to_separator() {
                continue;
            }
            if cursor.obj_buf.is_empty() {
                // Empty frame, e.g. a batch resynchronization byte.
                cursor.last_good += 1;
                continue;
            }
            match parse_record(&cursor.obj_buf) {
                Some(record) => {
                    cursor.last_good += cursor.obj_buf.len() as u64 + 1;
                    if let Some(id) = record.id() {
                        self.known_ids.insert(id.to_owned());
                    }
                    cursor.obj_buf.clear();
                    batch.push(record);
                }
                None => {
                    warn!("corrupted frame at offset {}", cursor.last_good);
                    self.truncate_to(cursor.last_good)?;
                    self.finish_scan(cursor);
                    return Ok((batch, true));
                }
            }
        }
    }

    /// Append `records` to the log.
    ///
    /// Records whose `id` is already known are silently dropped, as are
    /// intra-batch duplicates after the first occurrence. If no cursor has
    /// yet run to the end of the log, an internal scan does so first, which
    /// both fills the known-ID set and repairs a damaged tail before the
    /// write.
    ///
    /// The write is buffered by the OS; call [`Handle::flush`] when
    /// durability is required.
    pub fn append(&mut self, mut records: Vec<Record>) -> Result<(), error::Append> {
        if !self.writable {
            return Err(error::Append::WriteNotPermitted);
        }
        if !self.did_scan {
            let mut cursor = self.begin_scan()?;
            while !self.scan(&mut cursor)?.1 {}
        }

        records.retain(|record| match record.id() {
            Some(id) => self.known_ids.insert(id.to_owned()),
            // Without an `id` there is nothing to deduplicate on.
            None => true,
        });
        if records.is_empty() {
            trace!("append: all duplicates");
            return Ok(());
        }

        let buf = encode_batch(&records);
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&buf)?;
        trace!("appended {} records, {} bytes", records.len(), buf.len());

        Ok(())
    }

    /// Flush file contents to stable storage.
    pub fn flush(&mut self) -> io::Result<()> {
        self.file.fsync()
    }

    /// Close the log, releasing the file object and all buffers.
    pub fn close(self) {
        debug!("close");
    }

    /// `true` if the log was opened for writing.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// `true` if some cursor has scanned this log to the end.
    pub fn did_scan(&self) -> bool {
        self.did_scan
    }

    /// `true` if a record with the given `id` is known to be in the log.
    ///
    /// Only meaningful after a full scan.
    pub fn contains(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    fn refill(&mut self, cursor: &mut Cursor) -> io::Result<usize> {
        let remaining = cursor.len.saturating_sub(cursor.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = cursor.read_buf.len().min(remaining as usize);
        // The file position is shared with appends, so position every read
        // explicitly at the cursor's offset.
        self.file.seek(SeekFrom::Start(cursor.pos))?;
        let n = self.file.read(&mut cursor.read_buf[..want])?;
        cursor.pos += n as u64;
        cursor.buf_pos = 0;
        cursor.filled = n;

        Ok(n)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        if !self.writable {
            return Ok(());
        }
        debug!("truncating to last good offset {len}");
        self.file.seek(SeekFrom::End(0))?;
        self.file.ftruncate(len)
    }

    fn finish_scan(&mut self, cursor: &mut Cursor) {
        cursor.done = true;
        self.did_scan = true;
    }
}
