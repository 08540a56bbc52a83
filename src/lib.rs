//! fanout-rs: broadcast one sequential byte source to many readers
//!
//! Each reader gets its own [`Subscriber`] and consumes at its own pace. The
//! upstream is read exactly once, one chunk at a time, and the next chunk is
//! only read after every attached subscriber has asked for the current one.
//!
//! # Features
//!
//! - Late attach: a subscriber created mid-stream starts at the next chunk
//! - Temporary detach: a detached subscriber stops holding up the others and
//!   catches up, in order, after it reattaches
//! - Adaptive chunk sizing: slow rounds shrink the read size, full reads grow it
//! - One provider per physical source, enforced by [`ProviderRegistry`]
//! - `std::io::Read` and `tokio::io::AsyncRead` on every subscriber
//!
//! # Example
//!
//! ```
//! use std::io::{Cursor, Read};
//! use std::thread;
//!
//! # fn main() -> std::io::Result<()> {
//! let source = fanout::ReaderSource::new(Cursor::new(vec![42u8; 1000]));
//! let mut first = fanout::wrap(source)?;
//! let mut second = first.fork()?;
//!
//! let other = thread::spawn(move || {
//!     let mut out = Vec::new();
//!     second.read_to_end(&mut out).map(|_| out)
//! });
//!
//! let mut out = Vec::new();
//! first.read_to_end(&mut out)?;
//! assert_eq!(out.len(), 1000);
//! assert_eq!(other.join().unwrap()?, out);
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod source;
pub mod stats;

pub use broadcast::{AsyncSubscriber, BroadcastConfig, Provider, Subscriber};
pub use error::{BroadcastError, Result};
pub use registry::{wrap, ProviderRegistry};
pub use source::{ByteSource, ReaderSource, SourceId};
pub use stats::ProviderStats;
