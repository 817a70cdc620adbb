//! In-memory pipe from the assembler to a blocking stream worker.

use std::io::{self, Read};

use bytes::{Buf, Bytes};
use tokio::sync::mpsc;

use super::buffer::Chunk;
use crate::timed::CaptureClock;

/// Create a connected pipe. The reader stamps `clock` with the capture time
/// of each chunk as it starts handing out that chunk's bytes.
pub fn pipe(clock: CaptureClock) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: Bytes::new(),
            clock,
        },
    )
}

/// Sending half, owned by the assembler. Dropping it is end of stream.
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl PipeWriter {
    /// Returns `false` once the reader is gone.
    pub fn send(&self, chunk: Chunk) -> bool {
        self.tx.send(chunk).is_ok()
    }
}

/// Receiving half. Blocks in `read`, so it must live on a blocking thread.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::UnboundedReceiver<Chunk>,
    current: Bytes,
    clock: CaptureClock,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(chunk) => {
                    self.clock.set_micros(chunk.timestamp_us);
                    self.current = chunk.data;
                }
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}
