//! Multi-threaded broadcast behavior

mod common;

use std::io::Read;
use std::thread;
use std::time::Duration;

use common::{drain, drain_in_thread, sequence, take, CountingSource};
use fanout::{BroadcastConfig, BroadcastError, ProviderRegistry, Subscriber};

#[test]
fn test_three_subscribers_fixed_chunks() {
    let (source, probe) = CountingSource::new((0..100).collect());
    let first = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();
    let second = first.fork().unwrap();
    let third = first.fork().unwrap();

    let handles: Vec<_> = [first, second, third]
        .into_iter()
        .map(drain_in_thread)
        .collect();

    let expected: Vec<u8> = (0..100).collect();
    for handle in handles {
        let (_, out) = handle.join().unwrap();
        assert_eq!(out, expected);
    }

    assert_eq!(probe.data_reads(), 10);
    // One more call observes end of stream
    assert_eq!(probe.reads(), 11);
}

#[test]
fn test_detach_and_reattach_catches_up() {
    let (source, probe) = CountingSource::new((0..100).collect());
    let mut a = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();
    let b = a.fork().unwrap();

    let b_thread = thread::spawn(move || {
        let mut b = b;
        let head = take(&mut b, 21);
        b.detach_temporarily().unwrap();
        (b, head)
    });

    let a_head = take(&mut a, 61);
    let (mut b, b_head) = b_thread.join().unwrap();
    assert_eq!(b_head, (0..=20).collect::<Vec<u8>>());
    assert_eq!(a_head, (0..=60).collect::<Vec<u8>>());

    // Chunks 30..70 were read while b was away
    let stats = a.stats().unwrap();
    assert_eq!(stats.chunks_published, 7);
    assert_eq!(stats.detached, 1);

    b.reattach().unwrap();
    let a_thread = drain_in_thread(a);
    let b_tail = drain(&mut b);
    let (_, a_tail) = a_thread.join().unwrap();

    assert_eq!(b_tail, (21..100).collect::<Vec<u8>>());
    assert_eq!(a_tail, (61..100).collect::<Vec<u8>>());
    assert_eq!(probe.data_reads(), 10);
}

#[test]
fn test_any_number_of_subscribers_see_identical_bytes() {
    for (n, len, chunk) in [(1, 0, 7), (1, 999, 64), (2, 1000, 1), (4, 5000, 333), (6, 4096, 50)] {
        let data = sequence(len);
        let (source, probe) = CountingSource::new(data.clone());
        let root = Subscriber::new(source, BroadcastConfig::fixed(chunk)).unwrap();

        let mut subs = vec![];
        for _ in 1..n {
            subs.push(root.fork().unwrap());
        }
        subs.push(root);

        let handles: Vec<_> = subs.into_iter().map(drain_in_thread).collect();
        for handle in handles {
            let (_, out) = handle.join().unwrap();
            assert_eq!(out, data, "n={} len={} chunk={}", n, len, chunk);
        }

        assert!(probe.data_reads() <= len.div_ceil(chunk));
        assert_eq!(probe.reads(), probe.data_reads() + 1);
        assert_eq!(probe.closes(), 1);
    }
}

#[test]
fn test_adaptive_sizing_keeps_output_identical() {
    let data = sequence(100_000);
    let (source, probe) = CountingSource::new(data.clone());
    let root = Subscriber::new(source, BroadcastConfig::default()).unwrap();
    let forks: Vec<_> = (0..3).map(|_| root.fork().unwrap()).collect();

    let mut handles = vec![];
    for (i, mut sub) in forks.into_iter().chain(std::iter::once(root)).enumerate() {
        handles.push(thread::spawn(move || {
            let mut out = Vec::new();
            let mut buf = vec![0u8; 17 + i * 100];
            loop {
                let n = sub.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            out
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), data);
    }
    // Full reads grow the chunk size, so far fewer reads than at the floor
    assert!(probe.data_reads() < 100_000 / 50);
}

#[test]
fn test_late_attach_starts_at_next_chunk() {
    let (source, _probe) = CountingSource::new((0..100).collect());
    let mut early = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();

    let head = take(&mut early, 25);
    let late = early.fork().unwrap();

    let late_thread = drain_in_thread(late);
    let tail = drain(&mut early);
    let (_, late_out) = late_thread.join().unwrap();

    let mut early_out = head;
    early_out.extend(tail);
    assert_eq!(early_out, (0..100).collect::<Vec<u8>>());
    assert_eq!(late_out, (30..100).collect::<Vec<u8>>());
}

#[test]
fn test_attach_mid_round_extends_open_round() {
    let (source, probe) = CountingSource::new((0..100).collect());
    let mut a = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();
    let mut b = a.fork().unwrap();

    // a opens the first round and waits for b
    let a_thread = thread::spawn(move || (a.read_byte().unwrap(), a));
    thread::sleep(Duration::from_millis(50));

    // c joins while the round is open, so b alone no longer completes it
    let mut c = b.fork().unwrap();
    let b_thread = thread::spawn(move || (b.read_byte().unwrap(), b));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(probe.reads(), 0);
    assert!(!a_thread.is_finished());
    assert!(!b_thread.is_finished());

    assert_eq!(c.read_byte().unwrap(), Some(0));
    let (a_first, _a) = a_thread.join().unwrap();
    let (b_first, _b) = b_thread.join().unwrap();
    assert_eq!(a_first, Some(0));
    assert_eq!(b_first, Some(0));
    assert_eq!(probe.reads(), 1);
}

#[test]
fn test_reattach_mid_round_extends_open_round() {
    let (source, probe) = CountingSource::new((0..100).collect());
    let a = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();
    let mut b = a.fork().unwrap();
    let c = a.fork().unwrap();

    // Everyone takes byte 0, then b steps away
    let a_thread = thread::spawn(move || {
        let mut a = a;
        let head = take(&mut a, 1);
        (a, head)
    });
    let c_thread = thread::spawn(move || {
        let mut c = c;
        let head = take(&mut c, 1);
        (c, head)
    });
    assert_eq!(take(&mut b, 1), vec![0]);
    let (mut a, _) = a_thread.join().unwrap();
    let (mut c, _) = c_thread.join().unwrap();
    b.detach_temporarily().unwrap();

    // a and c read chunks 10..30 without b
    let c_thread = thread::spawn(move || {
        let head = take(&mut c, 29);
        (c, head)
    });
    assert_eq!(take(&mut a, 29), (1..30).collect::<Vec<u8>>());
    let (c, _) = c_thread.join().unwrap();
    assert_eq!(probe.data_reads(), 3);

    // a opens the next round, then b rejoins before c arrives
    let a_thread = thread::spawn(move || (a.read_byte().unwrap(), a));
    thread::sleep(Duration::from_millis(50));
    b.reattach().unwrap();

    let c_thread = thread::spawn(move || {
        let mut c = c;
        (c.read_byte().unwrap(), c)
    });
    thread::sleep(Duration::from_millis(50));
    assert_eq!(probe.data_reads(), 3);
    assert!(!a_thread.is_finished());
    assert!(!c_thread.is_finished());

    // b catches up on what it missed without touching the round
    assert_eq!(take(&mut b, 29), (1..30).collect::<Vec<u8>>());
    assert_eq!(probe.data_reads(), 3);

    // Its next request is the one the round was waiting for
    assert_eq!(b.read_byte().unwrap(), Some(30));
    assert_eq!(a_thread.join().unwrap().0, Some(30));
    assert_eq!(c_thread.join().unwrap().0, Some(30));
    assert_eq!(probe.data_reads(), 4);
}

#[test]
fn test_end_of_stream_is_terminal() {
    let (source, probe) = CountingSource::new((0..20).collect());
    let mut sub = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();

    assert_eq!(drain(&mut sub), (0..20).collect::<Vec<u8>>());
    let reads = probe.reads();

    let mut late = sub.fork().unwrap();
    assert_eq!(late.read_byte().unwrap(), None);
    assert_eq!(sub.read_byte().unwrap(), None);
    assert_eq!(probe.reads(), reads);

    sub.close().unwrap();
    assert_eq!(probe.closes(), 0);
    late.close().unwrap();
    late.close().unwrap();
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_upstream_failure_reaches_every_reader() {
    let (source, probe) = CountingSource::new(sequence(100));
    let source = source.failing_on_read(3);
    let root = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();
    let mut subs: Vec<_> = (0..2).map(|_| root.fork().unwrap()).collect();
    subs.push(root);

    let handles: Vec<_> = subs
        .into_iter()
        .map(|mut sub| {
            thread::spawn(move || {
                let mut read = 0;
                let err = loop {
                    match sub.read_byte() {
                        Ok(Some(_)) => read += 1,
                        Ok(None) => panic!("unexpected end of stream"),
                        Err(err) => break err,
                    }
                };
                (sub, read, err)
            })
        })
        .collect();

    for handle in handles {
        let (mut sub, read, err) = handle.join().unwrap();
        assert_eq!(read, 20);
        assert!(matches!(err, BroadcastError::UpstreamRead(_)));
        assert!(err.is_fatal());

        // Poisoned for good, but still closable
        assert!(matches!(
            sub.read_byte(),
            Err(BroadcastError::UpstreamRead(_))
        ));
        assert!(sub.stats().unwrap().poisoned);
        sub.close().unwrap();
        sub.close().unwrap();
    }

    assert_eq!(probe.reads(), 3);
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_straggler_shrinks_chunk_size() {
    let (source, _probe) = CountingSource::new(sequence(1000));
    let config = BroadcastConfig::default()
        .initial_chunk_size(200)
        .slow_round_threshold(Duration::from_millis(20));
    let mut fast = Subscriber::new(source, config).unwrap();
    let mut slow = fast.fork().unwrap();

    let fast_thread = thread::spawn(move || {
        assert_eq!(fast.read_byte().unwrap(), Some(0));
        fast
    });

    thread::sleep(Duration::from_millis(100));
    assert_eq!(slow.read_byte().unwrap(), Some(0));
    let _fast = fast_thread.join().unwrap();

    let stats = slow.stats().unwrap();
    assert_eq!(stats.shrinks, 1);
    assert_eq!(stats.chunk_size, 140);
}

#[test]
fn test_close_mid_round_unblocks_peers() {
    let (source, _probe) = CountingSource::new(sequence(300));
    let first = Subscriber::new(source, BroadcastConfig::fixed(10)).unwrap();
    let second = first.fork().unwrap();
    let mut quitter = first.fork().unwrap();

    let handles = vec![drain_in_thread(first), drain_in_thread(second)];

    // Hold everyone up for a while, then leave
    let head = take(&mut quitter, 5);
    thread::sleep(Duration::from_millis(50));
    quitter.close().unwrap();

    assert_eq!(head, sequence(5));
    for handle in handles {
        let (_, out) = handle.join().unwrap();
        assert_eq!(out, sequence(300));
    }
}

#[test]
fn test_chained_providers_form_a_tree() {
    let data = sequence(2000);
    let (source, probe) = CountingSource::new(data.clone());
    let root = Subscriber::new(source, BroadcastConfig::fixed(64)).unwrap();
    let sibling = root.fork().unwrap();

    // A subscriber is itself a byte source for another provider
    let branch = Subscriber::new(root, BroadcastConfig::fixed(100)).unwrap();
    let leaf = branch.fork().unwrap();

    let handles = vec![
        drain_in_thread(sibling),
        drain_in_thread(branch),
        drain_in_thread(leaf),
    ];
    for handle in handles {
        let (_, out) = handle.join().unwrap();
        assert_eq!(out, data);
    }

    assert_eq!(probe.data_reads(), 2000usize.div_ceil(64));
}

#[test]
fn test_registry_teardown_closes_source_once() {
    let registry = ProviderRegistry::with_config(BroadcastConfig::fixed(8));
    let (source, probe) = CountingSource::new(sequence(64));
    let id = fanout::ByteSource::source_id(&source);

    let a = registry.wrap(source).unwrap();
    let b = registry.wrap_subscriber(&a).unwrap();
    assert_eq!(registry.stats(id).unwrap().unwrap().attached, 2);

    let handles = vec![drain_in_thread(a), drain_in_thread(b)];
    let subs: Vec<_> = handles
        .into_iter()
        .map(|h| {
            let (sub, out) = h.join().unwrap();
            assert_eq!(out, sequence(64));
            sub
        })
        .collect();

    assert!(registry.contains(id).unwrap());
    assert_eq!(probe.closes(), 0);
    drop(subs);
    assert!(!registry.contains(id).unwrap());
    assert_eq!(probe.closes(), 1);
}
