//! Per-consumer view of a broadcast stream

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{BroadcastError, Result};
use crate::source::{ByteSource, SourceId};
use crate::stats::ProviderStats;

use super::config::BroadcastConfig;
use super::provider::{Provider, SubscriberId};

/// One consumer's independent cursor over a shared byte source
///
/// Reads are served from the chunk the subscriber already holds without any
/// locking. Only when that chunk is exhausted does the subscriber go back to
/// its provider, which may block until every other attached subscriber has
/// caught up.
///
/// # Example
/// ```
/// use std::io::Cursor;
/// use fanout::{BroadcastConfig, ReaderSource, Subscriber};
///
/// # fn main() -> fanout::Result<()> {
/// let mut first = Subscriber::new(ReaderSource::new(Cursor::new(b"hi".to_vec())), BroadcastConfig::default())?;
/// assert_eq!(first.read_byte()?, Some(b'h'));
///
/// // A fork starts at the next chunk the provider publishes
/// let mut second = first.fork()?;
/// first.close()?;
/// assert_eq!(second.read_byte()?, None);
/// # Ok(())
/// # }
/// ```
pub struct Subscriber {
    provider: Arc<Provider>,
    id: SubscriberId,

    /// Chunk being consumed and the position in it
    chunk: Bytes,
    pos: usize,

    /// Chunks handed back on reattach, drained before asking the provider
    queue: VecDeque<Bytes>,

    detached: bool,
    closed: bool,
}

impl Subscriber {
    /// Broadcast `source` through a provider of its own, outside any registry
    pub fn new<S>(source: S, config: BroadcastConfig) -> Result<Self>
    where
        S: ByteSource + 'static,
    {
        let provider = Arc::new(Provider::new(Box::new(source), &config, None));
        let id = provider
            .try_attach()?
            .ok_or(BroadcastError::IllegalUse("new provider refused attach"))?;
        Ok(Self::from_parts(provider, id))
    }

    pub(crate) fn from_parts(provider: Arc<Provider>, id: SubscriberId) -> Self {
        Self {
            provider,
            id,
            chunk: Bytes::new(),
            pos: 0,
            queue: VecDeque::new(),
            detached: false,
            closed: false,
        }
    }

    /// Attach another subscriber to the same provider
    ///
    /// The new subscriber starts with the next chunk the provider publishes.
    pub fn fork(&self) -> Result<Subscriber> {
        if self.closed {
            return Err(BroadcastError::IllegalUse("fork of a closed subscriber"));
        }
        let id = self
            .provider
            .try_attach()?
            .ok_or(BroadcastError::IllegalUse("provider already closed"))?;
        Ok(Self::from_parts(Arc::clone(&self.provider), id))
    }

    /// Identity of the physical upstream source
    pub fn source_id(&self) -> SourceId {
        self.provider.source_id()
    }

    /// Whether the subscriber is excused from rounds
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Statistics of the shared provider
    pub fn stats(&self) -> Result<ProviderStats> {
        self.provider.stats()
    }

    /// Unread bytes of the chunk in hand
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.chunk[self.pos..]
    }

    /// Mark `n` buffered bytes as read
    pub(crate) fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.chunk.len());
    }

    /// Replace the exhausted chunk with the next one; `false` at end of stream
    pub(crate) fn refill(&mut self) -> Result<bool> {
        let next = self.next_chunk()?;
        self.pos = 0;
        match next {
            Some(chunk) => {
                self.chunk = chunk;
                Ok(true)
            }
            None => {
                self.chunk = Bytes::new();
                Ok(false)
            }
        }
    }

    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.closed {
            return Err(BroadcastError::IllegalUse("read after close"));
        }
        if let Some(chunk) = self.queue.pop_front() {
            return Ok(Some(chunk));
        }
        if self.detached {
            self.provider.next_detached(self.id)
        } else {
            self.provider.next_chunk(self.id)
        }
    }

    /// Read the next byte, `None` at end of stream
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        if let Some(&byte) = self.chunk.get(self.pos) {
            self.pos += 1;
            return Ok(Some(byte));
        }
        if !self.refill()? {
            return Ok(None);
        }
        // Published chunks are never empty
        let byte = self.chunk.first().copied();
        self.pos = 1;
        Ok(byte)
    }

    /// Read up to `buf.len()` bytes; `0` at end of stream
    ///
    /// Never crosses a chunk boundary, so at most one round is waited on.
    pub fn read_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffered().is_empty() && !self.refill()? {
            return Ok(0);
        }
        let available = self.buffered();
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }

    /// Stop counting toward rounds; chunks published meanwhile are kept
    ///
    /// Calling it on an already detached subscriber does nothing.
    pub fn detach_temporarily(&mut self) -> Result<()> {
        if self.closed {
            return Err(BroadcastError::IllegalUse("detach after close"));
        }
        if self.detached {
            return Ok(());
        }
        self.provider.detach(self.id)?;
        self.detached = true;
        Ok(())
    }

    /// Rejoin rounds after [`detach_temporarily`](Self::detach_temporarily)
    ///
    /// Everything published while detached is read first, in order.
    pub fn reattach(&mut self) -> Result<()> {
        if self.closed {
            return Err(BroadcastError::IllegalUse("reattach after close"));
        }
        if !self.detached {
            return Ok(());
        }
        let collected = self.provider.reattach(self.id)?;
        self.queue.extend(collected);
        self.detached = false;
        Ok(())
    }

    /// Leave the broadcast
    ///
    /// The last subscriber to leave closes the upstream source. Closing twice
    /// is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.chunk = Bytes::new();
        self.pos = 0;
        self.queue.clear();
        self.provider.close_subscriber(self.id)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(
                source = %self.provider.source_id(),
                error = %err,
                "Closing subscriber on drop failed"
            );
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("source_id", &self.provider.source_id())
            .field("id", &self.id)
            .field("buffered", &self.buffered().len())
            .field("queued", &self.queue.len())
            .field("detached", &self.detached)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Read for Subscriber {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_block(buf)?)
    }
}

impl ByteSource for Subscriber {
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Subscriber::read_block(self, buf)?)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(Subscriber::read_byte(self)?)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(Subscriber::close(self)?)
    }

    fn source_id(&self) -> SourceId {
        Subscriber::source_id(self)
    }
}
