use std::thread::{self, JoinHandle};

use log::warn;
use thiserror::Error;

use goatdb_jsonlog::{Options, Record};
use goatdb_runtime::Platform;
use goatdb_vfs::{AnyVfs, Native, Opfs, Unseekable, Vfs};

use crate::proto::{Command, ErrorKind, Reply, Request, Response};
use crate::transport::{channel_pair, ChannelTransport};
use crate::{Host, Transport};

/// Error yielded by [`Client`] calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The worker reported a typed failure.
    #[error("worker error: {kind:?}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Worker {
        kind: ErrorKind,
        message: Option<String>,
    },
    /// The worker went away.
    #[error("worker disconnected")]
    Disconnected,
    /// A response did not decode, or did not match the request kind.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// The typed error kind, if the worker reported one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Worker { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Blocking convenience wrapper around the worker protocol.
///
/// Hides correlation-id bookkeeping: each call sends one request and waits
/// for the response with the matching id. Handles and cursors are plain
/// integers minted by the worker; see [`crate::Host`].
pub struct Client<T> {
    transport: T,
    next_request: u64,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_request: 0,
        }
    }

    pub fn open(&mut self, path: &str, write: bool) -> Result<u64, ClientError> {
        match self.request(Command::Open {
            path: path.into(),
            write,
        })? {
            Reply::Open { file } => Ok(file),
            other => Err(unexpected(other)),
        }
    }

    pub fn close(&mut self, file: u64) -> Result<(), ClientError> {
        match self.request(Command::Close { file })? {
            Reply::Close { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn cursor(&mut self, file: u64) -> Result<u64, ClientError> {
        match self.request(Command::Cursor { file })? {
            Reply::Cursor { cursor } => Ok(cursor),
            other => Err(unexpected(other)),
        }
    }

    pub fn scan(&mut self, cursor: u64) -> Result<(Vec<Record>, bool), ClientError> {
        match self.request(Command::Scan { cursor })? {
            Reply::Scan { values, done } => Ok((values, done)),
            other => Err(unexpected(other)),
        }
    }

    /// Drive `cursor` to the end, collecting every record.
    pub fn scan_all(&mut self, cursor: u64) -> Result<Vec<Record>, ClientError> {
        let mut records = Vec::new();
        loop {
            let (batch, done) = self.scan(cursor)?;
            records.extend(batch);
            if done {
                return Ok(records);
            }
        }
    }

    pub fn append(&mut self, file: u64, values: Vec<Record>) -> Result<(), ClientError> {
        match self.request(Command::Append { file, values })? {
            Reply::Append => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn flush(&mut self, file: u64) -> Result<(), ClientError> {
        match self.request(Command::Flush { file })? {
            Reply::Flush { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn read_text_file(&mut self, path: &str) -> Result<Option<String>, ClientError> {
        match self.request(Command::ReadTextFile { path: path.into() })? {
            Reply::ReadTextFile { text } => Ok(text),
            other => Err(unexpected(other)),
        }
    }

    pub fn write_text_file(&mut self, path: &str, text: &str) -> Result<bool, ClientError> {
        match self.request(Command::WriteTextFile {
            path: path.into(),
            text: text.into(),
        })? {
            Reply::WriteTextFile { success } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    pub fn remove(&mut self, path: &str) -> Result<bool, ClientError> {
        match self.request(Command::Remove { path: path.into() })? {
            Reply::Remove { success } => Ok(success),
            other => Err(unexpected(other)),
        }
    }

    fn request(&mut self, cmd: Command) -> Result<Reply, ClientError> {
        let id = self.next_request;
        self.next_request += 1;

        let msg = serde_json::to_string(&Request { id, cmd })
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        self.transport
            .send(&msg)
            .map_err(|_| ClientError::Disconnected)?;

        loop {
            let msg = self.transport.recv().ok_or(ClientError::Disconnected)?;
            let response: Response =
                serde_json::from_str(&msg).map_err(|e| ClientError::Protocol(e.to_string()))?;
            if response.id != id {
                // The host answers strictly in order; an id from the past
                // can only be a response nobody waited for.
                warn!("dropping stray response id={}", response.id);
                continue;
            }
            return match response.reply {
                Reply::Error { error, message } => Err(ClientError::Worker {
                    kind: error,
                    message,
                }),
                reply => Ok(reply),
            };
        }
    }
}

fn unexpected(reply: Reply) -> ClientError {
    ClientError::Protocol(format!("unexpected reply: {reply:?}"))
}

/// Spawn a worker host on its own thread, connected over an in-process
/// channel transport.
///
/// The worker exits when the client (and any clones of its sender side) are
/// dropped. Handles left open die with the worker.
pub fn spawn<V>(vfs: V, opts: Options) -> (Client<ChannelTransport>, JoinHandle<()>)
where
    V: Vfs + Send + 'static,
    V::File: Send,
{
    let (client_end, mut host_end) = channel_pair();
    let join = thread::Builder::new()
        .name("goatdb-worker".into())
        .spawn(move || Host::new(vfs, opts).run(&mut host_end))
        .expect("failed to spawn worker thread");

    (Client::new(client_end), join)
}

/// Like [`spawn`], with the backend selected by the process's runtime
/// descriptor.
pub fn spawn_for(platform: Platform, opts: Options) -> (Client<ChannelTransport>, JoinHandle<()>) {
    let vfs = match platform {
        Platform::Native => AnyVfs::from(Native),
        Platform::PositionLess => AnyVfs::from(Unseekable),
        Platform::Browser => AnyVfs::from(Opfs::new()),
    };

    spawn(vfs, opts)
}
