use std::io::{self, BufRead, BufReader, Write};

use crossbeam_channel::{Receiver, Sender};
use log::trace;

/// A bidirectional stream of framed text messages.
///
/// Both ends of a worker connection hold one of these. The worker body is
/// identical across implementations; only the framing differs: an
/// in-process channel carries messages whole, a pipe delimits them with
/// newlines (messages are single-line JSON).
pub trait Transport {
    /// Send one message. Fails if the peer is gone.
    fn send(&mut self, msg: &str) -> io::Result<()>;

    /// Receive the next message, blocking. `None` means the peer closed the
    /// connection.
    fn recv(&mut self) -> Option<String>;
}

/// In-process transport over a pair of channels.
pub struct ChannelTransport {
    tx: Sender<String>,
    rx: Receiver<String>,
}

/// A connected pair of in-process transports.
pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (tx_a, rx_a) = crossbeam_channel::unbounded();
    let (tx_b, rx_b) = crossbeam_channel::unbounded();

    (
        ChannelTransport { tx: tx_a, rx: rx_b },
        ChannelTransport { tx: tx_b, rx: rx_a },
    )
}

impl Transport for ChannelTransport {
    fn send(&mut self, msg: &str) -> io::Result<()> {
        self.tx
            .send(msg.to_owned())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer disconnected"))
    }

    fn recv(&mut self) -> Option<String> {
        self.rx.recv().ok()
    }
}

/// Transport over a pair of byte streams, e.g. the pipes of a worker child
/// process. Messages are newline-delimited.
pub struct PipeTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R: io::Read, W: Write> PipeTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }
}

impl<R: io::Read, W: Write> Transport for PipeTransport<R, W> {
    fn send(&mut self, msg: &str) -> io::Result<()> {
        debug_assert!(!msg.contains('\n'));
        self.writer.write_all(msg.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {
                    let msg = line.trim_end_matches('\n');
                    // Blank lines are not frames.
                    if msg.is_empty() {
                        continue;
                    }
                    trace!("recv {} bytes", msg.len());
                    return Some(msg.to_owned());
                }
            }
        }
    }
}
