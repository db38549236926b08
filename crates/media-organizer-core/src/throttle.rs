use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const BURST_SECS: f64 = 0.25;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every hashing and copying worker of a run. Caps
/// aggregate I/O throughput at the run's `io_limit_mbps`; with no limit
/// configured, `acquire` is free.
pub struct IoThrottle {
    bytes_per_sec: Option<f64>,
    bucket: Mutex<Bucket>,
}

impl IoThrottle {
    pub fn new(io_limit_mbps: Option<u32>) -> Self {
        let bytes_per_sec = io_limit_mbps
            .filter(|&mbps| mbps > 0)
            .map(|mbps| mbps as f64 * 1024.0 * 1024.0);
        Self {
            bytes_per_sec,
            bucket: Mutex::new(Bucket {
                tokens: bytes_per_sec.map(|r| r * BURST_SECS).unwrap_or(0.0),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Block until `bytes` of budget is available. Workers call this before
    /// each read/write chunk, so the cap holds across the whole pool.
    pub fn acquire(&self, bytes: u64) {
        let Some(rate) = self.bytes_per_sec else {
            return;
        };
        let needed = bytes as f64;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * rate).min(rate * BURST_SECS + needed);
                bucket.last_refill = now;
                if bucket.tokens >= needed {
                    bucket.tokens -= needed;
                    return;
                }
                (needed - bucket.tokens) / rate
            };
            thread::sleep(Duration::from_secs_f64(wait.min(0.5)));
        }
    }
}

/// Worker-pool size from the run's CPU limit: a percentage of available
/// cores, at least one. No limit means one worker per core.
pub fn worker_count(cpu_limit_pct: Option<u32>) -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    match cpu_limit_pct {
        Some(pct) if pct > 0 && pct < 100 => {
            ((cores as u64 * pct as u64 + 99) / 100).max(1) as usize
        }
        _ => cores,
    }
}
