//! Broadcast configuration

use std::time::Duration;

/// Smallest chunk size the adaptive sizing will shrink to
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 50;

/// Largest chunk size the adaptive sizing will grow to
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Provider tuning options
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastConfig {
    /// Size of the first upstream read
    pub initial_chunk_size: usize,

    /// Floor for shrinking
    pub min_chunk_size: usize,

    /// Ceiling for growing
    pub max_chunk_size: usize,

    /// Round wait above which the chunk size shrinks
    pub slow_round_threshold: Duration,

    /// Multiplier applied after a slow round
    pub shrink_factor: f64,

    /// Multiplier applied after a read that filled the buffer
    pub grow_factor: f64,

    /// Enable adaptive chunk sizing
    pub adaptive: bool,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            initial_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            slow_round_threshold: Duration::from_millis(100),
            shrink_factor: 0.7,
            grow_factor: 1.5,
            adaptive: true,
        }
    }
}

impl BroadcastConfig {
    /// Fixed chunk size with adaptive sizing turned off
    pub fn fixed(chunk_size: usize) -> Self {
        Self::default().fixed_chunk_size(chunk_size)
    }

    /// Set the initial chunk size
    pub fn initial_chunk_size(mut self, size: usize) -> Self {
        self.initial_chunk_size = size.max(1);
        self
    }

    /// Set the shrink floor
    pub fn min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size.max(1);
        self
    }

    /// Set the growth ceiling
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size.max(1);
        self
    }

    /// Set the slow-round threshold
    pub fn slow_round_threshold(mut self, threshold: Duration) -> Self {
        self.slow_round_threshold = threshold;
        self
    }

    /// Set the shrink multiplier (clamped into `(0, 1)`)
    pub fn shrink_factor(mut self, factor: f64) -> Self {
        self.shrink_factor = factor.clamp(0.01, 0.99);
        self
    }

    /// Set the grow multiplier (at least `1.01`)
    pub fn grow_factor(mut self, factor: f64) -> Self {
        self.grow_factor = factor.max(1.01);
        self
    }

    /// Use one chunk size for the whole stream
    pub fn fixed_chunk_size(mut self, size: usize) -> Self {
        self.initial_chunk_size = size.max(1);
        self.adaptive = false;
        self
    }

    /// Disable adaptive sizing, keeping the initial size
    pub fn disable_adaptive(mut self) -> Self {
        self.adaptive = false;
        self
    }

    /// Initial size clamped into the configured bounds
    pub(crate) fn starting_chunk_size(&self) -> usize {
        if !self.adaptive {
            return self.initial_chunk_size.max(1);
        }
        let floor = self.min_chunk_size.min(self.max_chunk_size);
        self.initial_chunk_size.clamp(floor, self.max_chunk_size)
    }
}
