//! Round-barrier broadcast coordinator
//!
//! One provider owns one physical source. It reads the source in chunks and
//! hands every chunk to all of its subscribers, reading the next chunk only
//! once every attached subscriber has asked for it.
//!
//! ```text
//!   AwaitingRequests ──(last attached request)──► Reading ──► Published
//!          ▲                                                      │
//!          └──────────────────────── epoch + 1 ◄──────────────────┘
//! ```
//!
//! All state sits behind a single mutex, paired with one condition variable
//! that is notified on every publication and every membership change.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use bytes::Bytes;

use crate::error::{BroadcastError, Result};
use crate::registry::store::ProviderTable;
use crate::source::{ByteSource, SourceId};
use crate::stats::ProviderStats;

use super::chunk::{Chunk, ChunkSizer, Resize};
use super::config::BroadcastConfig;

/// Identifies a subscriber within its provider
pub(crate) type SubscriberId = u64;

struct State {
    /// Upstream; taken out when the last subscriber leaves
    source: Option<Box<dyn ByteSource>>,

    /// Most recently published chunk
    current: Chunk,

    /// Sequence number of `current`
    epoch: u64,

    sizer: ChunkSizer,

    /// Reusable read buffer, only touched by the round leader
    scratch: Vec<u8>,

    attached: HashSet<SubscriberId>,

    /// Detached subscribers and the chunks published since they left
    detached: HashMap<SubscriberId, VecDeque<Bytes>>,

    /// Attached subscribers that asked for the next chunk this round
    requests: usize,

    /// First request of the open round
    round_started: Option<Instant>,

    /// Set once upstream fails; handed to every later request
    poisoned: Option<BroadcastError>,

    /// No subscribers remain and the source has been released
    retired: bool,

    next_subscriber: SubscriberId,

    stats: ProviderStats,
}

impl State {
    fn round_complete(&self) -> bool {
        self.requests > 0 && self.requests >= self.attached.len()
    }
}

/// Broadcast coordinator for a single physical source
pub struct Provider {
    source_id: SourceId,
    state: Mutex<State>,
    round: Condvar,
    registry: Option<Weak<ProviderTable>>,
}

impl Provider {
    pub(crate) fn new(
        source: Box<dyn ByteSource>,
        config: &BroadcastConfig,
        registry: Option<Weak<ProviderTable>>,
    ) -> Self {
        let source_id = source.source_id();
        let sizer = ChunkSizer::new(config);
        let chunk_size = sizer.size();

        tracing::info!(
            source = %source_id,
            chunk_size = chunk_size,
            adaptive = config.adaptive,
            "Provider created"
        );

        Self {
            source_id,
            state: Mutex::new(State {
                source: Some(source),
                current: Chunk::Data(Bytes::new()),
                epoch: 0,
                sizer,
                scratch: vec![0; chunk_size],
                attached: HashSet::new(),
                detached: HashMap::new(),
                requests: 0,
                round_started: None,
                poisoned: None,
                retired: false,
                next_subscriber: 0,
                stats: ProviderStats::new(source_id, chunk_size),
            }),
            round: Condvar::new(),
            registry,
        }
    }

    /// Identity of the physical source this provider reads
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| BroadcastError::lock_poisoned())
    }

    /// Snapshot of the provider's counters
    pub fn stats(&self) -> Result<ProviderStats> {
        let state = self.lock()?;
        let mut stats = state.stats.clone();
        stats.chunk_size = state.sizer.size();
        stats.attached = state.attached.len();
        stats.detached = state.detached.len();
        Ok(stats)
    }

    /// Whether the last subscriber has left
    pub fn is_retired(&self) -> Result<bool> {
        Ok(self.lock()?.retired)
    }

    /// Register a new attached subscriber
    ///
    /// Returns `None` once the provider has retired; callers must then build a
    /// fresh provider.
    pub(crate) fn try_attach(&self) -> Result<Option<SubscriberId>> {
        let mut state = self.lock()?;
        if state.retired {
            return Ok(None);
        }

        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.attached.insert(id);

        tracing::debug!(
            source = %self.source_id,
            subscriber = id,
            attached = state.attached.len(),
            epoch = state.epoch,
            "Subscriber attached"
        );

        Ok(Some(id))
    }

    /// Block until the next chunk is published and return it
    ///
    /// `None` means end of stream.
    pub(crate) fn next_chunk(&self, id: SubscriberId) -> Result<Option<Bytes>> {
        let mut state = self.lock()?;

        if let Some(err) = &state.poisoned {
            return Err(err.clone());
        }
        if state.current.is_end() {
            return Ok(None);
        }
        if !state.attached.contains(&id) {
            return Err(BroadcastError::IllegalUse(
                "requested a chunk without being attached",
            ));
        }

        let epoch = state.epoch;
        if state.requests == 0 {
            state.round_started = Some(Instant::now());
        }
        state.requests += 1;

        loop {
            if state.epoch != epoch {
                return Ok(state.current.bytes());
            }
            if let Some(err) = &state.poisoned {
                return Err(err.clone());
            }
            // Recomputed on every wakeup: a peer may have attached or left
            if state.round_complete() {
                return self.lead_round(&mut state);
            }
            state = self
                .round
                .wait(state)
                .map_err(|_| BroadcastError::lock_poisoned())?;
        }
    }

    /// Perform the round's single upstream read and publish the result
    fn lead_round(&self, state: &mut State) -> Result<Option<Bytes>> {
        let round_wait = state
            .round_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        state.requests = 0;

        let size = state.sizer.size();
        if state.scratch.len() != size {
            state.scratch.resize(size, 0);
        }

        state.stats.physical_reads += 1;
        let result = match state.source.as_mut() {
            Some(source) => source.read_block(&mut state.scratch),
            None => return Err(BroadcastError::IllegalUse("provider already closed")),
        };
        let read = match result {
            Ok(read) => read,
            Err(err) => {
                let err = BroadcastError::upstream(err);
                tracing::error!(
                    source = %self.source_id,
                    epoch = state.epoch,
                    error = %err,
                    "Upstream read failed, provider poisoned"
                );
                state.poisoned = Some(err.clone());
                state.stats.poisoned = true;
                self.round.notify_all();
                return Err(err);
            }
        };

        if read == 0 {
            state.current = Chunk::End;
            state.stats.ended = true;
            tracing::info!(
                source = %self.source_id,
                chunks = state.stats.chunks_published,
                bytes = state.stats.bytes_read,
                "Upstream reached end of stream"
            );
        } else {
            let chunk = Bytes::copy_from_slice(&state.scratch[..read]);
            for queue in state.detached.values_mut() {
                queue.push_back(chunk.clone());
            }
            state.current = Chunk::Data(chunk);
            state.stats.chunks_published += 1;
            state.stats.bytes_read += read as u64;

            match state.sizer.adjust(round_wait, read) {
                Resize::Shrunk(next) => {
                    state.stats.shrinks += 1;
                    tracing::debug!(
                        source = %self.source_id,
                        chunk_size = next,
                        round_wait_ms = round_wait.as_millis() as u64,
                        "Slow round, shrinking chunk size"
                    );
                }
                Resize::Grew(next) => {
                    state.stats.grows += 1;
                    tracing::debug!(
                        source = %self.source_id,
                        chunk_size = next,
                        "Full read, growing chunk size"
                    );
                }
                Resize::Unchanged => {}
            }
        }

        state.epoch += 1;
        tracing::trace!(
            source = %self.source_id,
            epoch = state.epoch,
            len = read,
            attached = state.attached.len(),
            detached = state.detached.len(),
            "Chunk published"
        );

        self.round.notify_all();
        Ok(state.current.bytes())
    }

    /// Pop a chunk collected while `id` was detached
    ///
    /// `None` means the stream ended and nothing is left to drain.
    pub(crate) fn next_detached(&self, id: SubscriberId) -> Result<Option<Bytes>> {
        let mut state = self.lock()?;
        let ended = state.current.is_end();
        let poisoned = state.poisoned.clone();

        let Some(queue) = state.detached.get_mut(&id) else {
            return Err(BroadcastError::IllegalUse("subscriber is not detached"));
        };
        if let Some(chunk) = queue.pop_front() {
            return Ok(Some(chunk));
        }
        if let Some(err) = poisoned {
            return Err(err);
        }
        if ended {
            return Ok(None);
        }
        Err(BroadcastError::IllegalUse(
            "read from a detached subscriber with nothing collected",
        ))
    }

    /// Excuse `id` from future rounds; chunks collect in its private queue
    pub(crate) fn detach(&self, id: SubscriberId) -> Result<()> {
        let mut state = self.lock()?;
        if !state.attached.remove(&id) {
            return Err(BroadcastError::IllegalUse("subscriber is not attached"));
        }
        state.detached.insert(id, VecDeque::new());

        tracing::debug!(
            source = %self.source_id,
            subscriber = id,
            attached = state.attached.len(),
            detached = state.detached.len(),
            pending = state.requests,
            "Subscriber detached"
        );

        // The open round may now be complete
        self.round.notify_all();
        Ok(())
    }

    /// Rejoin rounds; returns the chunks collected while detached, oldest first
    pub(crate) fn reattach(&self, id: SubscriberId) -> Result<VecDeque<Bytes>> {
        let mut state = self.lock()?;
        let Some(collected) = state.detached.remove(&id) else {
            return Err(BroadcastError::IllegalUse("subscriber is not detached"));
        };
        state.attached.insert(id);

        tracing::debug!(
            source = %self.source_id,
            subscriber = id,
            collected = collected.len(),
            attached = state.attached.len(),
            "Subscriber reattached"
        );

        self.round.notify_all();
        Ok(collected)
    }

    /// Remove `id` from both sets, closing the source if it was the last one
    ///
    /// Works even when the lock was poisoned by a panicking reader, so that
    /// resources can always be released.
    pub(crate) fn close_subscriber(&self, id: SubscriberId) -> Result<()> {
        let source = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

            let removed = state.attached.remove(&id) | state.detached.remove(&id).is_some();
            if removed {
                tracing::debug!(
                    source = %self.source_id,
                    subscriber = id,
                    attached = state.attached.len(),
                    detached = state.detached.len(),
                    "Subscriber closed"
                );
                self.round.notify_all();
            }

            if state.retired || !state.attached.is_empty() || !state.detached.is_empty() {
                return Ok(());
            }
            state.retired = true;
            state.source.take()
        };

        self.unregister();

        if let Some(mut source) = source {
            source.close().map_err(BroadcastError::close)?;
            tracing::info!(source = %self.source_id, "Provider closed upstream source");
        }
        Ok(())
    }

    fn unregister(&self) {
        let Some(table) = self.registry.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let mut providers = table.lock().unwrap_or_else(PoisonError::into_inner);
        let is_ours = providers
            .get(&self.source_id)
            .is_some_and(|entry| std::ptr::eq(entry.as_ref(), self));
        if is_ours {
            providers.remove(&self.source_id);
            tracing::debug!(
                source = %self.source_id,
                providers = providers.len(),
                "Provider unregistered"
            );
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("source_id", &self.source_id)
            .field("registered", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}
