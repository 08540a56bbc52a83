//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fanout::{ByteSource, SourceId, Subscriber};

/// Counters observed from outside a [`CountingSource`]
#[derive(Debug, Default)]
pub struct Probe {
    pub reads: AtomicUsize,
    pub data_reads: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Probe {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn data_reads(&self) -> usize {
        self.data_reads.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory source that records every call made to it
pub struct CountingSource {
    data: Vec<u8>,
    pos: usize,
    id: SourceId,
    probe: Arc<Probe>,
    /// 1-based read call that fails
    fail_on_read: Option<usize>,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let source = Self {
            data,
            pos: 0,
            id: SourceId::fresh(),
            probe: Arc::clone(&probe),
            fail_on_read: None,
        };
        (source, probe)
    }

    pub fn failing_on_read(mut self, call: usize) -> Self {
        self.fail_on_read = Some(call);
        self
    }
}

impl ByteSource for CountingSource {
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let call = self.probe.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_read == Some(call) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away"));
        }

        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        if n > 0 {
            self.probe.data_reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn source_id(&self) -> SourceId {
        self.id
    }
}

pub fn sequence(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Read byte by byte until end of stream
pub fn drain(sub: &mut Subscriber) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(byte) = sub.read_byte().expect("read failed") {
        out.push(byte);
    }
    out
}

/// Drain on a separate thread, handing the subscriber back afterwards
pub fn drain_in_thread(mut sub: Subscriber) -> JoinHandle<(Subscriber, Vec<u8>)> {
    thread::spawn(move || {
        let out = drain(&mut sub);
        (sub, out)
    })
}

/// Read exactly `count` bytes
pub fn take(sub: &mut Subscriber, count: usize) -> Vec<u8> {
    (0..count)
        .map(|_| sub.read_byte().expect("read failed").expect("stream ended early"))
        .collect()
}
