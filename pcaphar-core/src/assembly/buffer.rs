//! Per-direction TCP segment ordering.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::trace;

/// Contiguous bytes released by a [`SegmentBuffer`], stamped with the
/// capture time of the segment that carried them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    pub timestamp_us: i64,
}

/// Counters for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub segments: u64,
    pub retransmits: u64,
    pub out_of_order: u64,
    /// Bytes never captured, skipped over by [`SegmentBuffer::flush`].
    pub skipped_bytes: u64,
}

#[derive(Debug)]
struct Pending {
    data: Bytes,
    timestamp_us: i64,
}

/// Orders the segments of one TCP direction into a byte stream.
///
/// Positions are tracked as offsets from the first byte seen, so sequence
/// number wraparound is handled by comparing against the next expected
/// sequence number rather than by absolute value.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    started: bool,
    /// Sequence number of the next byte to release.
    next_seq: u32,
    /// Stream offset of the next byte to release.
    next: i64,
    pending: BTreeMap<i64, Pending>,
    stats: BufferStats,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor the stream on a SYN. Ignored once anchored.
    pub fn set_initial_seq(&mut self, syn_seq: u32) {
        if !self.started {
            self.started = true;
            self.next_seq = syn_seq.wrapping_add(1);
        }
    }

    /// Add a segment and return whatever became contiguous.
    pub fn push(&mut self, seq: u32, data: &[u8], timestamp_us: i64) -> Vec<Chunk> {
        self.stats.segments += 1;
        if data.is_empty() {
            return Vec::new();
        }
        if !self.started {
            // Mid-stream capture: the first payload anchors the stream.
            self.started = true;
            self.next_seq = seq;
        }

        let mut offset = self.offset_of(seq);
        let end = offset + data.len() as i64;
        if end <= self.next {
            self.stats.retransmits += 1;
            trace!("Dropping retransmitted segment seq={}", seq);
            return Vec::new();
        }

        let mut data = Bytes::copy_from_slice(data);
        if offset < self.next {
            // Partial overlap with bytes already released
            data = data.slice((self.next - offset) as usize..);
            offset = self.next;
        }

        let mut out = Vec::new();
        if offset == self.next {
            self.advance_to(end);
            out.push(Chunk { data, timestamp_us });
            self.release_pending(&mut out);
        } else {
            self.stats.out_of_order += 1;
            match self.pending.get(&offset) {
                Some(existing) if existing.data.len() >= data.len() => {
                    self.stats.retransmits += 1;
                }
                _ => {
                    self.pending.insert(offset, Pending { data, timestamp_us });
                }
            }
        }
        out
    }

    /// Release every pending segment, skipping gaps that were never filled.
    pub fn flush(&mut self) -> Vec<Chunk> {
        let mut out = Vec::new();
        while let Some((offset, segment)) = self.pending.pop_first() {
            if offset > self.next {
                let gap = offset - self.next;
                trace!("Skipping {}-byte gap in stream", gap);
                self.stats.skipped_bytes += gap as u64;
                self.advance_to(offset);
            }
            self.release(offset, segment, &mut out);
        }
        out
    }

    pub fn pending_segments(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    fn offset_of(&self, seq: u32) -> i64 {
        self.next + i64::from(seq.wrapping_sub(self.next_seq) as i32)
    }

    fn advance_to(&mut self, offset: i64) {
        let delta = offset - self.next;
        self.next = offset;
        self.next_seq = self.next_seq.wrapping_add(delta as u32);
    }

    fn release_pending(&mut self, out: &mut Vec<Chunk>) {
        while self
            .pending
            .first_key_value()
            .is_some_and(|(&offset, _)| offset <= self.next)
        {
            let Some((offset, segment)) = self.pending.pop_first() else {
                break;
            };
            self.release(offset, segment, out);
        }
    }

    fn release(&mut self, offset: i64, segment: Pending, out: &mut Vec<Chunk>) {
        let end = offset + segment.data.len() as i64;
        if end <= self.next {
            return;
        }
        let skip = (self.next - offset) as usize;
        self.advance_to(end);
        out.push(Chunk {
            data: segment.data.slice(skip..),
            timestamp_us: segment.timestamp_us,
        });
    }
}
