//! # Metrics
//!
//! Process-wide counters plus a rolling window of attempt durations. Cheap to
//! record from hot paths: counters are atomics and the window sits behind a
//! `parking_lot` mutex that is never held across an await.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use douyin_parser::StrategyKind;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Samples older than this fall out of the percentile window.
const WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Default, Clone)]
struct StrategyCounters {
    attempts: u64,
    successes: u64,
    failures: u64,
    total_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

pub struct MetricsCollector {
    started: Instant,
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    parse_successes: AtomicU64,
    parse_failures: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    download_bytes: AtomicU64,
    strategies: Mutex<FxHashMap<StrategyKind, StrategyCounters>>,
    window: Mutex<VecDeque<(Instant, u64)>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            parse_successes: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            downloads_completed: AtomicU64::new(0),
            downloads_failed: AtomicU64::new(0),
            download_bytes: AtomicU64::new(0),
            strategies: Mutex::new(FxHashMap::default()),
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_outcome(&self, success: bool) {
        if success {
            self.parse_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.parse_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Folds one download call's counters in, file-granular.
    pub fn record_downloads(&self, completed: u64, failed: u64, bytes: u64) {
        self.downloads_completed.fetch_add(completed, Ordering::Relaxed);
        self.downloads_failed.fetch_add(failed, Ordering::Relaxed);
        self.download_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// One strategy attempt, successful or not, with its wall time.
    pub fn record_attempt(&self, kind: StrategyKind, elapsed: Duration, success: bool) {
        let elapsed_ms = elapsed.as_millis() as u64;

        {
            let mut strategies = self.strategies.lock();
            let counters = strategies.entry(kind).or_default();
            counters.attempts += 1;
            if success {
                counters.successes += 1;
            } else {
                counters.failures += 1;
            }
            counters.total_ms += elapsed_ms;
            if counters.attempts == 1 || elapsed_ms < counters.min_ms {
                counters.min_ms = elapsed_ms;
            }
            if elapsed_ms > counters.max_ms {
                counters.max_ms = elapsed_ms;
            }
        }

        let now = Instant::now();
        let mut window = self.window.lock();
        window.push_back((now, elapsed_ms));
        while let Some(&(at, _)) = window.front() {
            if now.duration_since(at) > WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut strategies: Vec<StrategySnapshot> = self
            .strategies
            .lock()
            .iter()
            .map(|(kind, c)| StrategySnapshot {
                strategy: *kind,
                attempts: c.attempts,
                successes: c.successes,
                failures: c.failures,
                avg_ms: if c.attempts == 0 {
                    0
                } else {
                    c.total_ms / c.attempts
                },
                min_ms: c.min_ms,
                max_ms: c.max_ms,
            })
            .collect();
        strategies.sort_by_key(|s| s.strategy.as_str());

        let now = Instant::now();
        let samples: Vec<u64> = self
            .window
            .lock()
            .iter()
            .filter(|(at, _)| now.duration_since(*at) <= WINDOW)
            .map(|&(_, ms)| ms)
            .collect();

        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            parse_successes: self.parse_successes.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            download_bytes: self.download_bytes.load(Ordering::Relaxed),
            strategies,
            window: WindowSnapshot::from_samples(samples),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategySnapshot {
    pub strategy: StrategyKind,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Attempt-duration percentiles over the last five minutes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowSnapshot {
    pub samples: usize,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}

impl WindowSnapshot {
    fn from_samples(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        Self {
            samples: samples.len(),
            p50_ms: percentile(&samples, 0.50),
            p90_ms: percentile(&samples, 0.90),
            p99_ms: percentile(&samples, 0.99),
        }
    }
}

/// Nearest-rank percentile over an already sorted slice.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub parse_successes: u64,
    pub parse_failures: u64,
    pub downloads_completed: u64,
    pub downloads_failed: u64,
    pub download_bytes: u64,
    pub strategies: Vec<StrategySnapshot>,
    pub window: WindowSnapshot,
}

/// Renders a snapshot in the Prometheus text exposition format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::with_capacity(2048);

    let mut counter = |name: &str, help: &str, value: u64| {
        let _ = writeln!(out, "# HELP aweme_{name} {help}");
        let _ = writeln!(out, "# TYPE aweme_{name} counter");
        let _ = writeln!(out, "aweme_{name} {value}");
    };
    counter("requests_total", "Parse requests received", snapshot.requests);
    counter("cache_hits_total", "Results served from cache", snapshot.cache_hits);
    counter("cache_misses_total", "Cache lookups that missed", snapshot.cache_misses);
    counter(
        "parse_successes_total",
        "Requests resolved to a record",
        snapshot.parse_successes,
    );
    counter(
        "parse_failures_total",
        "Requests that exhausted all strategies",
        snapshot.parse_failures,
    );
    counter(
        "downloads_completed_total",
        "Media files downloaded",
        snapshot.downloads_completed,
    );
    counter(
        "downloads_failed_total",
        "Media downloads that failed",
        snapshot.downloads_failed,
    );
    counter(
        "download_bytes_total",
        "Bytes written by the downloader",
        snapshot.download_bytes,
    );

    let _ = writeln!(out, "# HELP aweme_uptime_seconds Seconds since engine start");
    let _ = writeln!(out, "# TYPE aweme_uptime_seconds gauge");
    let _ = writeln!(out, "aweme_uptime_seconds {}", snapshot.uptime_secs);

    let _ = writeln!(out, "# HELP aweme_strategy_attempts_total Attempts per strategy");
    let _ = writeln!(out, "# TYPE aweme_strategy_attempts_total counter");
    for s in &snapshot.strategies {
        let _ = writeln!(
            out,
            "aweme_strategy_attempts_total{{strategy=\"{}\"}} {}",
            s.strategy, s.attempts
        );
    }
    let _ = writeln!(out, "# HELP aweme_strategy_successes_total Successes per strategy");
    let _ = writeln!(out, "# TYPE aweme_strategy_successes_total counter");
    for s in &snapshot.strategies {
        let _ = writeln!(
            out,
            "aweme_strategy_successes_total{{strategy=\"{}\"}} {}",
            s.strategy, s.successes
        );
    }
    let _ = writeln!(out, "# HELP aweme_strategy_failures_total Failures per strategy");
    let _ = writeln!(out, "# TYPE aweme_strategy_failures_total counter");
    for s in &snapshot.strategies {
        let _ = writeln!(
            out,
            "aweme_strategy_failures_total{{strategy=\"{}\"}} {}",
            s.strategy, s.failures
        );
    }
    let _ = writeln!(out, "# HELP aweme_strategy_avg_elapsed_ms Mean attempt time per strategy");
    let _ = writeln!(out, "# TYPE aweme_strategy_avg_elapsed_ms gauge");
    for s in &snapshot.strategies {
        let _ = writeln!(
            out,
            "aweme_strategy_avg_elapsed_ms{{strategy=\"{}\"}} {}",
            s.strategy, s.avg_ms
        );
    }

    let _ = writeln!(
        out,
        "# HELP aweme_attempt_duration_ms Attempt duration over the rolling window"
    );
    let _ = writeln!(out, "# TYPE aweme_attempt_duration_ms summary");
    let _ = writeln!(
        out,
        "aweme_attempt_duration_ms{{quantile=\"0.5\"}} {}",
        snapshot.window.p50_ms
    );
    let _ = writeln!(
        out,
        "aweme_attempt_duration_ms{{quantile=\"0.9\"}} {}",
        snapshot.window.p90_ms
    );
    let _ = writeln!(
        out,
        "aweme_attempt_duration_ms{{quantile=\"0.99\"}} {}",
        snapshot.window.p99_ms
    );
    let _ = writeln!(
        out,
        "aweme_attempt_duration_ms_count {}",
        snapshot.window.samples
    );

    out
}
