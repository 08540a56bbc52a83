//! Barrier-synchronized broadcast of one byte source to many readers
//!
//! A [`Provider`] reads its upstream one chunk at a time. Every attached
//! [`Subscriber`] must ask for the current chunk before the next one is read,
//! so the slowest attached reader paces the upstream and nothing is buffered
//! beyond one chunk (plus the private queues of detached subscribers).
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`. Every subscriber that needs a chunk holds a
//! reference-counted handle to the same allocation; nothing is copied after
//! the single copy out of the leader's read buffer.

pub mod async_read;
pub(crate) mod chunk;
pub mod config;
pub mod provider;
pub mod subscriber;

pub use async_read::AsyncSubscriber;
pub use config::BroadcastConfig;
pub use provider::Provider;
pub use subscriber::Subscriber;
