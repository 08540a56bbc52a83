//! Published chunks and adaptive chunk sizing

use std::time::Duration;

use bytes::Bytes;

use super::config::BroadcastConfig;

/// What a provider currently has published
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Chunk {
    /// Bytes from one upstream read (zero-copy via reference counting)
    Data(Bytes),
    /// Upstream reported end of stream; terminal
    End,
}

impl Chunk {
    pub(crate) fn is_end(&self) -> bool {
        matches!(self, Chunk::End)
    }

    /// The bytes, or `None` for the terminal marker
    pub(crate) fn bytes(&self) -> Option<Bytes> {
        match self {
            Chunk::Data(bytes) => Some(bytes.clone()),
            Chunk::End => None,
        }
    }
}

/// Outcome of a sizing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resize {
    Unchanged,
    Shrunk(usize),
    Grew(usize),
}

/// Self-tuning upstream read size
///
/// A slow round (one straggler holding up the group) shrinks the next read so
/// the group pays less latency per round. A read that filled the whole buffer
/// suggests a backlog upstream, so the next read grows to amortize the
/// coordination cost.
#[derive(Debug)]
pub(crate) struct ChunkSizer {
    size: usize,
    min: usize,
    max: usize,
    slow_round: Duration,
    shrink: f64,
    grow: f64,
    adaptive: bool,
}

impl ChunkSizer {
    pub(crate) fn new(config: &BroadcastConfig) -> Self {
        Self {
            size: config.starting_chunk_size(),
            min: config.min_chunk_size.min(config.max_chunk_size),
            max: config.max_chunk_size,
            slow_round: config.slow_round_threshold,
            shrink: config.shrink_factor,
            grow: config.grow_factor,
            adaptive: config.adaptive,
        }
    }

    /// Size of the next temporary buffer
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Adjust after a physical read of `read` bytes into a buffer of the
    /// current size, preceded by a round wait of `round_wait`
    pub(crate) fn adjust(&mut self, round_wait: Duration, read: usize) -> Resize {
        if !self.adaptive {
            return Resize::Unchanged;
        }

        if round_wait > self.slow_round && self.size > self.min {
            let next = ((self.size as f64 * self.shrink) as usize).max(self.min);
            if next < self.size {
                self.size = next;
                return Resize::Shrunk(next);
            }
        } else if read == self.size && self.size < self.max {
            let next = ((self.size as f64 * self.grow) as usize).clamp(self.size + 1, self.max);
            self.size = next;
            return Resize::Grew(next);
        }

        Resize::Unchanged
    }
}
