//! Fan-out demo: copy one input to several readers running at different paces
//!
//! Run with: cargo run --example fanout [FILE] [READERS]
//!
//! Examples:
//!   cargo run --example fanout                      # 4 MB of generated data, 4 readers
//!   cargo run --example fanout video.ts 6           # a file, 6 readers
//!   RUST_LOG=fanout=debug cargo run --example fanout
//!
//! One reader joins late, one pauses now and then with a temporary detach,
//! the rest read flat out. At the end every reader's output is checked
//! against the input.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::thread;
use std::time::{Duration, Instant};

use fanout::{ByteSource, ProviderRegistry, ReaderSource, Subscriber};

const GENERATED_LEN: usize = 4 * 1024 * 1024;

fn read_all(mut sub: Subscriber, pause_every: Option<usize>) -> fanout::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    let mut since_pause = 0;

    loop {
        let n = sub.read_block(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);

        if let Some(every) = pause_every {
            since_pause += n;
            if since_pause >= every {
                since_pause = 0;
                sub.detach_temporarily()?;
                thread::sleep(Duration::from_millis(10));
                sub.reattach()?;
            }
        }
    }

    sub.close()?;
    Ok(out)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fanout=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let readers: usize = args.get(2).map(|n| n.parse()).transpose()?.unwrap_or(4).max(3);

    let input = match args.get(1) {
        Some(path) => {
            let mut data = Vec::new();
            File::open(path)?.read_to_end(&mut data)?;
            data
        }
        None => (0..GENERATED_LEN).map(|i| (i * 31 % 256) as u8).collect(),
    };

    let source: Box<dyn ByteSource> = match args.get(1) {
        Some(path) => Box::new(ReaderSource::new(BufReader::new(File::open(path)?))),
        None => Box::new(ReaderSource::new(Cursor::new(input.clone()))),
    };

    let registry = ProviderRegistry::global();
    let first = registry.wrap(source)?;
    let source_id = first.source_id();
    let mut handles = Vec::new();

    let started = Instant::now();

    // Flat-out readers
    for _ in 0..readers - 2 {
        let sub = first.fork()?;
        handles.push(thread::spawn(move || read_all(sub, None)));
    }

    // Pauses every 256 KB
    handles.push(thread::spawn(move || read_all(first, Some(256 * 1024))));

    // Joins through the registry once the others are under way. The empty
    // reader only names the source; the existing provider keeps reading the
    // real one.
    let late_handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let late = registry.wrap(ReaderSource::with_id(io::empty(), source_id))?;
        read_all(late, None)
    });

    for (i, handle) in handles.into_iter().enumerate() {
        let out = handle.join().map_err(|_| "reader panicked")??;
        let verdict = if out == input { "identical" } else { "DIFFERENT" };
        println!("reader {}: {} bytes, {}", i, out.len(), verdict);
    }

    let late_out = late_handle.join().map_err(|_| "late reader panicked")??;
    let verdict = if input.ends_with(&late_out) {
        "suffix of input"
    } else {
        "NOT a suffix"
    };
    println!("late reader: {} bytes, {}", late_out.len(), verdict);

    let elapsed = started.elapsed();
    println!(
        "{} readers, {} bytes in {:?} ({:.1} MB/s per reader), provider still registered: {}",
        readers,
        input.len(),
        elapsed,
        input.len() as f64 / elapsed.as_secs_f64() / 1_000_000.0,
        registry.contains(source_id)?
    );

    Ok(())
}
