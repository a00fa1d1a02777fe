//! One-directional byte stream between the engine thread and a worker.
//!
//! Only owned byte chunks cross; neither side ever sees the other's memory.
//! Both ends apply a bounded wait and report `TimedOut` when it expires.

use std::{
    io::{self, Read, Write},
    sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
    thread,
    time::{Duration, Instant},
};

/// Chunks in flight before the writer has to wait for the reader.
pub const CHANNEL_DEPTH: usize = 16;

/// Largest chunk a single `write` call sends.
pub const CHUNK_LEN: usize = 4096;

const SEND_RETRY: Duration = Duration::from_millis(2);

pub fn byte_channel(timeout: Duration) -> (ChannelWriter, ChannelReader) {
    let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
    (
        ChannelWriter { tx, timeout },
        ChannelReader {
            rx,
            pending: Vec::new(),
            offset: 0,
            timeout,
        },
    )
}

/// Dropping the writer is the end-of-stream signal.
pub struct ChannelWriter {
    tx: SyncSender<Vec<u8>>,
    timeout: Duration,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(CHUNK_LEN);
        let mut chunk = buf[..len].to_vec();
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.tx.try_send(chunk) {
                Ok(()) => return Ok(len),
                Err(TrySendError::Disconnected(_)) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader hung up"));
                }
                Err(TrySendError::Full(back)) => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "reader stalled"));
                    }
                    chunk = back;
                    thread::sleep(SEND_RETRY);
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
    timeout: Duration,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.pending.len() {
            match self.rx.recv_timeout(self.timeout) {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "writer stalled"));
                }
                // Writer dropped: clean end of stream.
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}
