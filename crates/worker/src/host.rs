use std::collections::HashMap;
use std::io::{self, Read as _, Seek as _, Write as _};
use std::path::Path;

use log::{debug, trace, warn};
use serde::Deserialize;

use goatdb_jsonlog::{error::Append, Cursor, Handle, Options, Record};
use goatdb_runtime::path::normalize;
use goatdb_vfs::{FileLike as _, Vfs};

use crate::proto::{Command, ErrorKind, Reply, Request, Response};
use crate::Transport;

/// Result of a speculative batch scan, staged until the next request.
type Staged = io::Result<(Vec<Record>, bool)>;

struct CursorState {
    file: u64,
    cursor: Cursor,
    staged: Option<Staged>,
}

/// The worker host: owns every open handle and cursor, keyed by
/// monotonically increasing integer ids, and serves requests one at a time.
///
/// Run this on a thread (or in a child process) that does not share memory
/// with its callers; everything crosses the [`Transport`] as framed JSON.
/// Requests are processed in arrival order, so operations against a single
/// handle are applied in the order the caller issued them.
pub struct Host<V: Vfs> {
    vfs: V,
    opts: Options,
    next_id: u64,
    files: HashMap<u64, Handle<V>>,
    cursors: HashMap<u64, CursorState>,
}

impl<V: Vfs> Host<V> {
    pub fn new(vfs: V, opts: Options) -> Self {
        Self {
            vfs,
            opts,
            next_id: 0,
            files: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    /// Serve requests until the peer closes the connection.
    pub fn run(mut self, transport: &mut impl Transport) {
        scopeguard::defer! {
            debug!("worker host exiting");
        }

        while let Some(msg) = transport.recv() {
            let (response, follow_up) = self.handle_message(&msg);
            let encoded = match serde_json::to_string(&response) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!("failed to encode response: {e}");
                    continue;
                }
            };
            if transport.send(&encoded).is_err() {
                break;
            }
            // Speculative work happens after the reply is on the wire, so
            // the caller's decode overlaps our next read.
            if let Some(cursor_id) = follow_up {
                self.stage_next_batch(cursor_id);
            }
        }
    }

    /// Handle one raw message. Always produces a response: malformed input
    /// answers `UnknownCommand` with whatever correlation id can be
    /// salvaged, and never perturbs the id maps.
    fn handle_message(&mut self, msg: &str) -> (Response, Option<u64>) {
        match serde_json::from_str::<Request>(msg) {
            Ok(req) => {
                trace!("request id={} {:?}", req.id, req.cmd);
                let (reply, follow_up) = self.dispatch(req.cmd);
                (Response { id: req.id, reply }, follow_up)
            }
            Err(e) => {
                warn!("malformed request: {e}");

                #[derive(Deserialize)]
                struct IdProbe {
                    #[serde(default)]
                    id: u64,
                }
                let id = serde_json::from_str::<IdProbe>(msg)
                    .map(|probe| probe.id)
                    .unwrap_or_default();
                let reply = Reply::Error {
                    error: ErrorKind::UnknownCommand,
                    message: Some(e.to_string()),
                };
                (Response { id, reply }, None)
            }
        }
    }

    fn dispatch(&mut self, cmd: Command) -> (Reply, Option<u64>) {
        match cmd {
            Command::Open { path, write } => (self.open(&path, write), None),
            Command::Close { file } => (self.close(file), None),
            Command::Cursor { file } => self.cursor(file),
            Command::Scan { cursor } => self.scan(cursor),
            Command::Flush { file } => (self.flush(file), None),
            Command::Append { file, values } => (self.append(file, values), None),
            Command::ReadTextFile { path } => (
                Reply::ReadTextFile {
                    text: self.read_text_file(&path),
                },
                None,
            ),
            Command::WriteTextFile { path, text } => (
                Reply::WriteTextFile {
                    success: self.write_text_file(&path, &text),
                },
                None,
            ),
            Command::Remove { path } => (
                Reply::Remove {
                    success: self.vfs.remove(Path::new(&normalize(&path))),
                },
                None,
            ),
        }
    }

    fn open(&mut self, path: &str, write: bool) -> Reply {
        // Callers send POSIX-style strings; bring foreign separators and
        // dot components into shape before they reach the backend.
        let path = normalize(path);
        match goatdb_jsonlog::open(&self.vfs, Path::new(&path), write, self.opts) {
            Ok(handle) => {
                let file = self.fresh_id();
                self.files.insert(file, handle);
                Reply::Open { file }
            }
            Err(e) => io_error(e),
        }
    }

    fn close(&mut self, file: u64) -> Reply {
        // Drop the map entries before touching the handle, so a racing
        // request observes `FileClosed` instead of freed state. The
        // speculative batches of the dropped cursors go with them.
        let Some(handle) = self.files.remove(&file) else {
            return file_closed();
        };
        self.cursors.retain(|_, state| state.file != file);
        handle.close();
        Reply::Close { file }
    }

    fn cursor(&mut self, file: u64) -> (Reply, Option<u64>) {
        let Some(handle) = self.files.get_mut(&file) else {
            return (file_closed(), None);
        };
        match handle.begin_scan() {
            Ok(cursor) => {
                let id = self.fresh_id();
                self.cursors.insert(
                    id,
                    CursorState {
                        file,
                        cursor,
                        staged: None,
                    },
                );
                // Eagerly read the first batch once the reply is out.
                (Reply::Cursor { cursor: id }, Some(id))
            }
            Err(e) => (io_error(e), None),
        }
    }

    fn scan(&mut self, cursor: u64) -> (Reply, Option<u64>) {
        let Some(state) = self.cursors.get_mut(&cursor) else {
            return (file_closed(), None);
        };
        let staged = match state.staged.take() {
            Some(staged) => staged,
            None => {
                let Some(handle) = self.files.get_mut(&state.file) else {
                    return (file_closed(), None);
                };
                handle.scan(&mut state.cursor)
            }
        };
        match staged {
            Ok((values, done)) => {
                let follow_up = (!done).then_some(cursor);
                (Reply::Scan { values, done }, follow_up)
            }
            Err(e) => (io_error(e), None),
        }
    }

    fn flush(&mut self, file: u64) -> Reply {
        let Some(handle) = self.files.get_mut(&file) else {
            return file_closed();
        };
        match handle.flush() {
            Ok(()) => Reply::Flush { file },
            Err(e) => io_error(e),
        }
    }

    fn append(&mut self, file: u64, values: Vec<Record>) -> Reply {
        let Some(handle) = self.files.get_mut(&file) else {
            return file_closed();
        };
        match handle.append(values) {
            Ok(()) => Reply::Append,
            Err(Append::WriteNotPermitted) => Reply::Error {
                error: ErrorKind::WriteNotPermitted,
                message: None,
            },
            Err(Append::Io(e)) => io_error(e),
        }
    }

    fn read_text_file(&mut self, path: &str) -> Option<String> {
        let mut file = self.vfs.open(Path::new(&normalize(path)), false).ok()?;
        let mut text = String::new();
        file.read_to_string(&mut text).ok()?;
        Some(text)
    }

    fn write_text_file(&mut self, path: &str, text: &str) -> bool {
        let path = normalize(path);
        let write = |vfs: &V| -> io::Result<()> {
            let path = Path::new(&path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                vfs.mkdir(parent);
            }
            let mut file = vfs.open(path, true)?;
            file.ftruncate(0)?;
            file.seek(io::SeekFrom::Start(0))?;
            file.write_all(text.as_bytes())?;
            file.fsync()
        };
        write(&self.vfs)
            .inspect_err(|e| warn!("writeTextFile {path}: {e}"))
            .is_ok()
    }

    /// Read the next batch of `cursor` so a later scan request finds it
    /// ready. Not cancelable: if the cursor or handle goes away before the
    /// request arrives, the result is discarded with it.
    fn stage_next_batch(&mut self, cursor: u64) {
        let Some(state) = self.cursors.get_mut(&cursor) else {
            return;
        };
        if state.staged.is_some() {
            return;
        }
        let Some(handle) = self.files.get_mut(&state.file) else {
            return;
        };
        state.staged = Some(handle.scan(&mut state.cursor));
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn file_closed() -> Reply {
    Reply::Error {
        error: ErrorKind::FileClosed,
        message: None,
    }
}

fn io_error(e: io::Error) -> Reply {
    Reply::Error {
        error: ErrorKind::IOError,
        message: Some(e.to_string()),
    }
}
