//! Tokio adapter for subscribers
//!
//! Waiting for a round blocks the calling thread, so chunk requests are moved
//! onto Tokio's blocking pool. Bytes already held by the subscriber are copied
//! inline without leaving the task.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::task::JoinHandle;

use crate::error::{BroadcastError, Result};

use super::subscriber::Subscriber;

type Refill = JoinHandle<(Subscriber, Result<bool>)>;

/// [`Subscriber`] usable as a `tokio::io::AsyncRead`
///
/// # Example
/// ```
/// use std::io::Cursor;
/// use fanout::{AsyncSubscriber, BroadcastConfig, ReaderSource, Subscriber};
/// use tokio::io::AsyncReadExt;
///
/// # tokio_test::block_on(async {
/// let source = ReaderSource::new(Cursor::new(b"broadcast".to_vec()));
/// let sub = Subscriber::new(source, BroadcastConfig::default()).unwrap();
///
/// let mut reader = AsyncSubscriber::new(sub);
/// let mut out = Vec::new();
/// reader.read_to_end(&mut out).await.unwrap();
/// assert_eq!(out, b"broadcast");
/// # });
/// ```
#[derive(Debug)]
pub struct AsyncSubscriber {
    /// `None` while a refill is running on the blocking pool
    inner: Option<Subscriber>,
    pending: Option<Refill>,
}

impl AsyncSubscriber {
    pub fn new(subscriber: Subscriber) -> Self {
        Self {
            inner: Some(subscriber),
            pending: None,
        }
    }

    /// The wrapped subscriber, unless a refill is in flight
    pub fn get_ref(&self) -> Option<&Subscriber> {
        self.inner.as_ref()
    }

    /// Take back the subscriber
    ///
    /// Fails while a refill is in flight; the subscriber then closes itself
    /// once that refill finishes.
    pub fn into_inner(mut self) -> Result<Subscriber> {
        self.inner.take().ok_or(BroadcastError::IllegalUse(
            "subscriber is busy waiting for a chunk",
        ))
    }
}

impl AsyncRead for AsyncSubscriber {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if let Some(pending) = self.pending.as_mut() {
                let joined = ready!(Pin::new(pending).poll(cx));
                self.pending = None;

                let (subscriber, refilled) = joined.map_err(|err| {
                    io::Error::from(BroadcastError::WaitFailed(err.to_string()))
                })?;
                self.inner = Some(subscriber);
                if !refilled? {
                    return Poll::Ready(Ok(()));
                }
            }

            let Some(subscriber) = self.inner.as_mut() else {
                return Poll::Ready(Err(BroadcastError::IllegalUse(
                    "subscriber lost by a failed refill",
                )
                .into()));
            };

            let available = subscriber.buffered();
            if !available.is_empty() {
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                subscriber.consume(n);
                return Poll::Ready(Ok(()));
            }

            let Some(mut subscriber) = self.inner.take() else {
                continue;
            };
            self.pending = Some(tokio::task::spawn_blocking(move || {
                let refilled = subscriber.refill();
                (subscriber, refilled)
            }));
        }
    }
}
