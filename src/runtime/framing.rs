//! Variable-length text message framing.
//!
//! The handshake messages carry no length prefix, so a message is
//! whatever the peer sent in one write. Three strategies recover it from
//! the stream, each trading complexity for assumptions about the socket:
//!
//! - `DoublingPeek`: peek into a growing buffer until a peek comes back
//!   short, then consume exactly that many bytes. Needs `MSG_PEEK`.
//! - `ReadThenDrain`: one consuming read; if it filled the buffer, ask the
//!   kernel how much is still queued (`FIONREAD`) and read that as well.
//! - `SingleShot`: one consuming read, nothing more.
//!
//! All strategies strip trailing `\r`/`\n` and never retry a failed read.

use crate::error::{WorkerError, WorkerResult};
use crate::runtime::connection::{recv_exact, Channel};
use bytes::BytesMut;
use serde::Deserialize;
use std::fmt;
use tracing::trace;

/// Which framing strategy a worker uses for text messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReadStrategy {
    #[default]
    DoublingPeek,
    ReadThenDrain,
    SingleShot,
}

impl ReadStrategy {
    /// Build a reader whose initial buffer holds `buffer_size` bytes.
    pub fn reader(self, buffer_size: usize) -> Box<dyn FrameReader> {
        let buffer_size = buffer_size.max(1);
        match self {
            ReadStrategy::DoublingPeek => Box::new(DoublingPeek { buffer_size }),
            ReadStrategy::ReadThenDrain => Box::new(ReadThenDrain { buffer_size }),
            ReadStrategy::SingleShot => Box::new(SingleShot { buffer_size }),
        }
    }
}

impl fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadStrategy::DoublingPeek => "doubling-peek",
            ReadStrategy::ReadThenDrain => "read-then-drain",
            ReadStrategy::SingleShot => "single-shot",
        };
        f.write_str(name)
    }
}

/// Reads one whole text message from a channel.
pub trait FrameReader: Send {
    /// Block until the next message arrives and return it without its
    /// trailing line ending. A closed peer yields an empty message.
    fn read_message(&mut self, channel: &mut dyn Channel) -> WorkerResult<String>;
}

/// Peek with a doubling buffer, then consume what was peeked.
pub struct DoublingPeek {
    buffer_size: usize,
}

impl FrameReader for DoublingPeek {
    fn read_message(&mut self, channel: &mut dyn Channel) -> WorkerResult<String> {
        let mut buf = BytesMut::zeroed(self.buffer_size);
        let peeked = loop {
            let n = channel
                .peek_bytes(&mut buf)
                .map_err(|e| WorkerError::connection("recv string", e))?;
            if n < buf.len() {
                break n;
            }
            let doubled = buf.len() * 2;
            trace!(buffer = doubled, "message fills peek buffer, growing");
            buf.resize(doubled, 0);
        };

        recv_exact(channel, &mut buf[..peeked])
            .map_err(|e| WorkerError::connection("clear buffer", e))?;
        buf.truncate(peeked);
        Ok(trim_message(&buf))
    }
}

/// One read, plus a second read of whatever the kernel still holds when
/// the first one filled the buffer.
pub struct ReadThenDrain {
    buffer_size: usize,
}

impl FrameReader for ReadThenDrain {
    fn read_message(&mut self, channel: &mut dyn Channel) -> WorkerResult<String> {
        let mut buf = BytesMut::zeroed(self.buffer_size);
        let n = channel
            .read(&mut buf)
            .map_err(|e| WorkerError::connection("recv string", e))?;
        buf.truncate(n);

        if n == self.buffer_size {
            let tail = channel
                .pending()
                .map_err(|e| WorkerError::connection("query pending bytes", e))?;
            if tail > 0 {
                trace!(tail, "draining message tail");
                buf.resize(n + tail, 0);
                let m = channel
                    .read(&mut buf[n..])
                    .map_err(|e| WorkerError::connection("recv string", e))?;
                buf.truncate(n + m);
            }
        }

        Ok(trim_message(&buf))
    }
}

/// One read into a fixed buffer.
///
/// The peer must send each message in a single write no longer than the
/// buffer. A longer message is cut at the buffer size and its remainder is
/// left in the stream, where it will be mistaken for the next message.
pub struct SingleShot {
    buffer_size: usize,
}

impl FrameReader for SingleShot {
    fn read_message(&mut self, channel: &mut dyn Channel) -> WorkerResult<String> {
        let mut buf = BytesMut::zeroed(self.buffer_size);
        let n = channel
            .read(&mut buf)
            .map_err(|e| WorkerError::connection("recv string", e))?;
        buf.truncate(n);
        Ok(trim_message(&buf))
    }
}

/// Strip trailing `\r` and `\n` and decode the rest as text.
fn trim_message(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |pos| pos + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
