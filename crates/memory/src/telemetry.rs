//! Metric families for memory operations.
//!
//! Registration happens lazily against the default prometheus registry.
//! Telemetry failures are swallowed: a metric that failed to register
//! simply stops recording, and the failure is logged once per process.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Histogram, HistogramVec,
    IntCounterVec,
};
use std::sync::Once;

static REGISTRATION_WARNING: Once = Once::new();

fn warn_once(name: &str) {
    REGISTRATION_WARNING.call_once(|| {
        tracing::warn!(metric = name, "metric registration failed; memory telemetry disabled");
    });
}

static STORE_OPS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_memory_store_operations_total",
        "Memory store operations by store backend and operation",
        &["store", "op"]
    )
    .map_err(|_| warn_once("agent_memory_store_operations_total"))
    .ok()
});

static CACHE_EVENTS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_memory_cache_events_total",
        "Read-through cache hits and misses by memory kind",
        &["kind", "outcome"]
    )
    .map_err(|_| warn_once("agent_memory_cache_events_total"))
    .ok()
});

static CONVERSATION_MESSAGES: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_memory_conversation_messages_total",
        "Messages appended to conversations by role",
        &["role"]
    )
    .map_err(|_| warn_once("agent_memory_conversation_messages_total"))
    .ok()
});

static CONVERSATION_LENGTH: Lazy<Option<Histogram>> = Lazy::new(|| {
    register_histogram!(
        "agent_memory_conversation_length",
        "Message count of conversations at append time",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0]
    )
    .map_err(|_| warn_once("agent_memory_conversation_length"))
    .ok()
});

static PREFERENCE_UPDATES: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_memory_preference_updates_total",
        "User preference upserts, labeled by whether they were explicit",
        &["explicit"]
    )
    .map_err(|_| warn_once("agent_memory_preference_updates_total"))
    .ok()
});

static CONTEXT_BUILD: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    register_histogram_vec!(
        "agent_memory_context_build_duration_seconds",
        "Time spent assembling prompt context",
        &["agent_type"]
    )
    .map_err(|_| warn_once("agent_memory_context_build_duration_seconds"))
    .ok()
});

static CONTEXT_SIZE: Lazy<Option<Histogram>> = Lazy::new(|| {
    register_histogram!(
        "agent_memory_context_size_chars",
        "Character size of assembled prompt context",
        vec![256.0, 1024.0, 4096.0, 16384.0, 65536.0]
    )
    .map_err(|_| warn_once("agent_memory_context_size_chars"))
    .ok()
});

static DOMAIN_RECORDS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "agent_memory_domain_records_total",
        "Appends to domain memory sub-lists by category",
        &["category"]
    )
    .map_err(|_| warn_once("agent_memory_domain_records_total"))
    .ok()
});

pub(crate) fn record_store_op(store: &str, op: &str) {
    if let Some(counter) = STORE_OPS.as_ref() {
        counter.with_label_values(&[store, op]).inc();
    }
}

pub(crate) fn record_cache_event(kind: &str, hit: bool) {
    if let Some(counter) = CACHE_EVENTS.as_ref() {
        let outcome = if hit { "hit" } else { "miss" };
        counter.with_label_values(&[kind, outcome]).inc();
    }
}

pub(crate) fn record_conversation_message(role: &str, message_count: usize) {
    if let Some(counter) = CONVERSATION_MESSAGES.as_ref() {
        counter.with_label_values(&[role]).inc();
    }
    if let Some(histogram) = CONVERSATION_LENGTH.as_ref() {
        #[allow(clippy::cast_precision_loss)]
        histogram.observe(message_count as f64);
    }
}

pub(crate) fn record_preference_update(explicit: bool) {
    if let Some(counter) = PREFERENCE_UPDATES.as_ref() {
        counter
            .with_label_values(&[if explicit { "true" } else { "false" }])
            .inc();
    }
}

pub(crate) fn record_context_build(agent_type: &str, duration_secs: f64, size_chars: usize) {
    if let Some(histogram) = CONTEXT_BUILD.as_ref() {
        histogram.with_label_values(&[agent_type]).observe(duration_secs);
    }
    if let Some(histogram) = CONTEXT_SIZE.as_ref() {
        #[allow(clippy::cast_precision_loss)]
        histogram.observe(size_chars as f64);
    }
}

pub(crate) fn record_domain_record(category: &str) {
    if let Some(counter) = DOMAIN_RECORDS.as_ref() {
        counter.with_label_values(&[category]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_never_panics() {
        record_store_op("in_memory", "save");
        record_cache_event("conversation", true);
        record_cache_event("conversation", false);
        record_conversation_message("user", 3);
        record_preference_update(true);
        record_context_build("sre", 0.01, 512);
        record_domain_record("learning");
    }
}
