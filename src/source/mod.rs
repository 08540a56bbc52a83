//! Sequential byte sources
//!
//! The only boundary contract of the crate. A physical upstream implements
//! [`ByteSource`] so a provider can read it; every subscriber implements it as
//! well, so a broadcast output can feed anything that consumes the contract.

pub mod reader;

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

pub use reader::ReaderSource;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a physical byte source
///
/// Two handles with the same id are treated as the same physical source by the
/// registry, so they share a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a process-unique id
    pub fn fresh() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "src#{}", self.0)
    }
}

/// A sequential byte source
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` signals end of stream.
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read a single byte, `None` at end of stream
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_block(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Release the source. Further reads may fail.
    fn close(&mut self) -> io::Result<()>;

    /// Identity of the physical source behind this handle
    fn source_id(&self) -> SourceId;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_block(buf)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn source_id(&self) -> SourceId {
        (**self).source_id()
    }
}
