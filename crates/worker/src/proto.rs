use serde::{Deserialize, Serialize};

use goatdb_jsonlog::Record;

/// One request to the worker host.
///
/// On the wire this is a single-line UTF-8 JSON object
/// `{ "type": …, "id": …, … }`. The `id` is a caller-chosen correlation id;
/// the host answers every request with exactly one [`Response`] echoing it.
#[derive(Debug, Deserialize, Serialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub cmd: Command,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Open the log at `path`, creating it iff `write`.
    Open { path: String, write: bool },
    /// Close the log, invalidating the handle and all its cursors.
    Close { file: u64 },
    /// Start a scan, eagerly computing its first batch.
    Cursor { file: u64 },
    /// Return the current batch and start reading the next one.
    Scan { cursor: u64 },
    /// Flush the log to stable storage.
    Flush { file: u64 },
    /// Append records, deduplicated by `id`.
    Append { file: u64, values: Vec<Record> },
    ReadTextFile { path: String },
    WriteTextFile { path: String, text: String },
    Remove { path: String },
}

/// One response from the worker host.
#[derive(Debug, Deserialize, Serialize)]
pub struct Response {
    pub id: u64,
    #[serde(flatten)]
    pub reply: Reply,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reply {
    Open {
        file: u64,
    },
    Close {
        file: u64,
    },
    Cursor {
        cursor: u64,
    },
    Scan {
        values: Vec<Record>,
        done: bool,
    },
    Flush {
        file: u64,
    },
    Append,
    ReadTextFile {
        text: Option<String>,
    },
    WriteTextFile {
        success: bool,
    },
    Remove {
        success: bool,
    },
    Error {
        error: ErrorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Error kinds the host reports in [`Reply::Error`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// The targeted handle or cursor does not (or no longer) exist.
    FileClosed,
    /// The message kind was not recognized, or the message was malformed.
    UnknownCommand,
    /// Append against a log opened read-only.
    WriteNotPermitted,
    /// Non-recoverable backend failure; details in `message`.
    IOError,
}
