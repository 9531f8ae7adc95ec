use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

/// Exit code reported when a command is killed at its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of [`run_with_timeout`].
#[derive(Debug)]
pub struct CmdOutput {
    /// The process exit code, or [`TIMEOUT_EXIT_CODE`] if it was killed at
    /// the deadline. `-1` if the process died to a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `cmd` to completion, capturing its output.
///
/// With a `timeout`, the process is killed once the wall clock passes the
/// deadline and a synthetic "timed out" result is returned; output produced
/// up to that point is retained. Without one, this waits indefinitely.
pub fn run_with_timeout(cmd: &mut Command, timeout: Option<Duration>) -> io::Result<CmdOutput> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Both pipes are drained off-thread so a chatty process cannot fill one
    // and stall.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let (code, timed_out) = loop {
        if let Some(status) = child.try_wait()? {
            break (status.code().unwrap_or(-1), false);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!("deadline exceeded, killing {cmd:?}");
            kill(&mut child);
            break (TIMEOUT_EXIT_CODE, true);
        }
        thread::sleep(POLL_INTERVAL);
    };
    debug!("{cmd:?} exited with {code}");

    Ok(CmdOutput {
        code,
        stdout: join(stdout),
        stderr: join(stderr),
        timed_out,
    })
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("failed to kill child: {e}");
    }
    let _ = child.wait();
}
