// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for blend-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `blend_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `tier`: memory, durable, remote
//! - `operation`: get, put, fetch_record, create_record, ...
//! - `status`: success, error, or an error kind

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a tier operation
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "blend_sync_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "blend_sync_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a remote call outcome (`success` or an error kind)
pub fn record_remote_call(operation: &str, outcome: &str) {
    record_operation("remote", operation, outcome);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(tier: &str, operation: &str, error_type: &str) {
    counter!(
        "blend_sync_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE FLOW
// ═══════════════════════════════════════════════════════════════════════════

/// Which source painted the form on a unit switch
pub fn record_render(source: &str) {
    counter!(
        "blend_sync_renders_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Background reconcile outcome: `updated`, `unchanged`, `inactive`, `empty`, `error`
pub fn record_reconcile(outcome: &str) {
    counter!(
        "blend_sync_reconcile_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Prefetch outcome per unit: `seeded`, `cached`, `unmapped`, `empty`, `error`
pub fn record_prefetch(outcome: &str) {
    counter!(
        "blend_sync_prefetch_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Explicit save outcome: `created`, `updated`, `error`
pub fn record_save(outcome: &str) {
    counter!(
        "blend_sync_saves_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Number of units held in the memory tier
pub fn set_memory_entries(count: usize) {
    gauge!("blend_sync_memory_entries").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// PERSIST FLUSH
// ═══════════════════════════════════════════════════════════════════════════

/// Record one durable flush of the payload cache.
/// `coalesced` is the number of schedule requests the flush absorbed beyond the first.
pub fn record_flush(reason: &str, units: usize, bytes: usize, coalesced: usize) {
    counter!(
        "blend_sync_flushes_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    counter!("blend_sync_persist_coalesced_total").increment(coalesced as u64);
    histogram!("blend_sync_flush_units").record(units as f64);
    histogram!("blend_sync_flush_bytes").record(bytes as f64);
}

/// Record flush duration
pub fn record_flush_duration(duration: Duration) {
    histogram!("blend_sync_flush_seconds").record(duration.as_secs_f64());
}

/// Track engine state transitions
pub fn set_engine_state(state: &str) {
    counter!(
        "blend_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}
