//! Service Metrics
//!
//! Counters, gauges and latency histograms for queries, rebuilds and
//! persistence, exported in Prometheus text format.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Point-in-time value
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram over durations
#[derive(Debug)]
pub struct Histogram {
    /// Upper bucket bounds in microseconds, ascending
    buckets: Vec<u64>,
    /// Non-cumulative count per bucket
    counts: Vec<AtomicU64>,
    /// Observations above the last bound
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Request-scale buckets: 100us up to 5s
    pub fn new_latency() -> Self {
        Self::with_buckets(vec![
            100, 500, 1_000, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000,
            5_000_000,
        ])
    }

    /// Build-scale buckets: 10ms up to 30min
    pub fn new_build() -> Self {
        Self::with_buckets(vec![
            10_000,
            100_000,
            1_000_000,
            5_000_000,
            30_000_000,
            60_000_000,
            300_000_000,
            600_000_000,
            1_800_000_000,
        ])
    }

    pub fn observe(&self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        match self.buckets.iter().position(|&bound| micros <= bound) {
            Some(i) => self.counts[i].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    fn bucket_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    fn sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new_latency()
    }
}

/// All service metrics
#[derive(Debug)]
pub struct ServiceMetrics {
    // Query metrics
    pub queries_total: Counter,
    pub queries_failed: Counter,
    pub query_latency: Histogram,

    // Build metrics
    pub rebuilds_total: Counter,
    pub rebuilds_failed: Counter,
    pub rebuild_latency: Histogram,

    // Persistence metrics
    pub persists_total: Counter,
    pub persists_failed: Counter,
    pub restores_total: Counter,
    pub restores_failed: Counter,

    // Index state
    pub vectors_indexed: Gauge,
    pub memory_usage_bytes: Gauge,

    // HTTP metrics
    pub http_requests_total: Counter,
    pub http_request_latency: Histogram,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self {
            queries_total: Counter::new(),
            queries_failed: Counter::new(),
            query_latency: Histogram::new_latency(),
            rebuilds_total: Counter::new(),
            rebuilds_failed: Counter::new(),
            rebuild_latency: Histogram::new_build(),
            persists_total: Counter::new(),
            persists_failed: Counter::new(),
            restores_total: Counter::new(),
            restores_failed: Counter::new(),
            vectors_indexed: Gauge::new(),
            memory_usage_bytes: Gauge::new(),
            http_requests_total: Counter::new(),
            http_request_latency: Histogram::new_latency(),
        }
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_total: self.queries_total.get(),
            queries_failed: self.queries_failed.get(),
            query_latency_ms: self.query_latency.mean_ms(),
            rebuilds_total: self.rebuilds_total.get(),
            rebuilds_failed: self.rebuilds_failed.get(),
            rebuild_latency_ms: self.rebuild_latency.mean_ms(),
            persists_total: self.persists_total.get(),
            restores_total: self.restores_total.get(),
            vectors_indexed: self.vectors_indexed.get(),
            memory_usage_bytes: self.memory_usage_bytes.get(),
            http_requests_total: self.http_requests_total.get(),
        }
    }

    pub fn update_memory_usage(&self) {
        if let Some(usage) = get_memory_usage() {
            self.memory_usage_bytes.set(usage);
        }
    }

    /// Export all metrics in Prometheus exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(4096);

        write_counter(&mut out, "annserve_queries_total", "Total number of k-NN queries", self.queries_total.get());
        write_counter(&mut out, "annserve_queries_failed_total", "Total number of failed queries", self.queries_failed.get());
        write_histogram(&mut out, "annserve_query_latency_seconds", "Query latency in seconds", &self.query_latency);

        write_counter(&mut out, "annserve_rebuilds_total", "Total number of index rebuilds", self.rebuilds_total.get());
        write_counter(&mut out, "annserve_rebuilds_failed_total", "Total number of failed rebuilds", self.rebuilds_failed.get());
        write_histogram(&mut out, "annserve_rebuild_duration_seconds", "Index rebuild duration in seconds", &self.rebuild_latency);

        write_counter(&mut out, "annserve_persists_total", "Total number of index saves", self.persists_total.get());
        write_counter(&mut out, "annserve_persists_failed_total", "Total number of failed index saves", self.persists_failed.get());
        write_counter(&mut out, "annserve_restores_total", "Total number of index loads", self.restores_total.get());
        write_counter(&mut out, "annserve_restores_failed_total", "Total number of failed index loads", self.restores_failed.get());

        write_gauge(&mut out, "annserve_vectors_indexed", "Vectors in the served index", self.vectors_indexed.get());
        write_gauge(&mut out, "annserve_memory_usage_bytes", "Resident memory in bytes", self.memory_usage_bytes.get());

        write_counter(&mut out, "annserve_http_requests_total", "Total HTTP requests", self.http_requests_total.get());
        write_histogram(&mut out, "annserve_http_request_latency_seconds", "HTTP request latency in seconds", &self.http_request_latency);

        out
    }
}

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} gauge", name);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_histogram(out: &mut String, name: &str, help: &str, hist: &Histogram) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} histogram", name);

    // Prometheus buckets are cumulative
    let mut cumulative = 0u64;
    for (bound, count) in hist.buckets.iter().zip(hist.bucket_counts()) {
        cumulative += count;
        let le_seconds = *bound as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_bucket{{le=\"{:.4}\"}} {}", name, le_seconds, cumulative);
    }
    let total = hist.count();
    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, total);
    let _ = writeln!(out, "{}_sum {:.6}", name, hist.sum_micros() as f64 / 1_000_000.0);
    let _ = writeln!(out, "{}_count {}", name, total);
    let _ = writeln!(out);
}

/// Point-in-time copy of the headline metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub queries_total: u64,
    pub queries_failed: u64,
    pub query_latency_ms: f64,
    pub rebuilds_total: u64,
    pub rebuilds_failed: u64,
    pub rebuild_latency_ms: f64,
    pub persists_total: u64,
    pub restores_total: u64,
    pub vectors_indexed: u64,
    pub memory_usage_bytes: u64,
    pub http_requests_total: u64,
}

/// Measures an operation and records it into a histogram
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record to `histogram` and return the elapsed time
    pub fn record(self, histogram: &Histogram) -> Duration {
        let elapsed = self.elapsed();
        histogram.observe(elapsed);
        elapsed
    }
}

/// Resident set size of this process
#[cfg(target_os = "linux")]
fn get_memory_usage() -> Option<u64> {
    let content = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages = content.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn get_memory_usage() -> Option<u64> {
    None
}
