//! Provider registry
//!
//! The registry guarantees that one physical source is read by exactly one
//! provider, however many times it is wrapped.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<ProviderRegistry>
//!                ┌──────────────────────────────┐
//!                │ providers: HashMap<SourceId, │
//!                │   Arc<Provider> {            │
//!                │     source, current chunk,   │
//!                │     attached, detached,      │
//!                │   }                          │
//!                │ >                            │
//!                └──────────────┬───────────────┘
//!                               │
//!         ┌─────────────────────┼─────────────────────┐
//!         │                     │                     │
//!         ▼                     ▼                     ▼
//!   [Subscriber]          [Subscriber]          [Subscriber]
//!   read_byte()           read_block()          detached, queueing
//! ```
//!
//! # Lock order
//!
//! `wrap` takes the registry lock and then a provider's lock. A provider that
//! retires releases its own lock before it takes the registry lock to remove
//! itself, so the two never deadlock.

pub mod store;

pub use store::{wrap, ProviderRegistry};
