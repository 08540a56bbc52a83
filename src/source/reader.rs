//! Adapter from `std::io::Read` to [`ByteSource`]

use std::io::{self, Read};

use super::{ByteSource, SourceId};

/// Byte source backed by any `std::io::Read`
///
/// Closing drops the reader, which releases files, pipes and sockets.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: Option<R>,
    id: SourceId,
}

impl<R: Read + Send> ReaderSource<R> {
    /// Wrap a reader under a fresh identity
    pub fn new(reader: R) -> Self {
        Self::with_id(reader, SourceId::fresh())
    }

    /// Wrap a reader under an existing identity
    ///
    /// Use this when several handles refer to the same physical source and
    /// must resolve to one provider.
    pub fn with_id(reader: R, id: SourceId) -> Self {
        Self {
            reader: Some(reader),
            id,
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Take back the reader, if still open
    pub fn into_inner(self) -> Option<R> {
        self.reader
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "reader source already closed",
            )),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }

    fn source_id(&self) -> SourceId {
        self.id
    }
}
