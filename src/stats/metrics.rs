//! Provider-level statistics

use std::time::{Duration, Instant};

use crate::source::SourceId;

/// Snapshot of one provider's counters
#[derive(Debug, Clone)]
pub struct ProviderStats {
    /// Physical source the provider reads
    pub source_id: SourceId,
    /// When the provider was created
    pub created_at: Instant,
    /// Upstream read calls, including the final zero-length one
    pub physical_reads: u64,
    /// Chunks published to subscribers (data-bearing reads)
    pub chunks_published: u64,
    /// Total bytes read from upstream
    pub bytes_read: u64,
    /// Size of the next upstream read
    pub chunk_size: usize,
    /// Times the chunk size shrank after a slow round
    pub shrinks: u64,
    /// Times the chunk size grew after a full read
    pub grows: u64,
    /// Subscribers counted toward rounds
    pub attached: usize,
    /// Subscribers collecting chunks privately
    pub detached: usize,
    /// Upstream reached end of stream
    pub ended: bool,
    /// Upstream failed and the provider is unusable
    pub poisoned: bool,
}

impl ProviderStats {
    pub fn new(source_id: SourceId, chunk_size: usize) -> Self {
        Self {
            source_id,
            created_at: Instant::now(),
            physical_reads: 0,
            chunks_published: 0,
            bytes_read: 0,
            chunk_size,
            shrinks: 0,
            grows: 0,
            attached: 0,
            detached: 0,
            ended: false,
            poisoned: false,
        }
    }

    /// Time since the provider was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Attached plus detached subscribers
    pub fn subscribers(&self) -> usize {
        self.attached + self.detached
    }

    /// Mean published chunk length in bytes
    pub fn average_chunk_len(&self) -> f64 {
        if self.chunks_published > 0 {
            self.bytes_read as f64 / self.chunks_published as f64
        } else {
            0.0
        }
    }

    /// Upstream throughput in bytes per second since creation
    pub fn throughput(&self) -> u64 {
        let secs = self.age().as_secs_f64();
        if secs > 0.0 {
            (self.bytes_read as f64 / secs) as u64
        } else {
            0
        }
    }
}
