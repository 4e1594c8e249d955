//! pipeline/state.rs — C2 Shared Stream State
//!
//! The central coordination record every other component reads or mutates.
//! Single-bit flags are atomics (the teacher's `RedisGate::enabled` shape);
//! maps are `std::sync::Mutex`-guarded since no critical section here spans
//! an `.await`; the writer is late-bound exactly once via `OnceLock`, the
//! closest safe equivalent to spec.md's "callback set once before any shard
//! worker starts" rule.

use crate::dynamo::shard::EventKind;
use crate::metrics::PipelineMetrics;
use crate::spanner::client::SpannerWriter;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

const SAMPLE_RING_CAPACITY: usize = 50;

/// A record that failed column conversion in C5, kept for the report.
#[derive(Debug, Clone)]
pub struct BadRecordSample {
    pub table: String,
    pub event_kind: EventKind,
    pub bad_cols: Vec<String>,
    pub raw: String,
}

/// A mutation that C6 could not apply, kept for the report.
#[derive(Debug, Clone)]
pub struct BadWriteSample {
    pub table: String,
    pub mutation_summary: String,
    pub error: String,
}

type EventCounts = HashMap<String, HashMap<EventKind, u64>>;

#[derive(Default)]
struct Counters {
    records: EventCounts,
    bad_records: EventCounts,
    dropped_records: EventCounts,
}

/// Thread-safe coordination record shared by C3/C4/C5/C6/C7. One instance
/// per run, held behind an `Arc`.
pub struct SharedStreamState {
    shard_processed: Mutex<HashMap<String, bool>>,
    user_exit: AtomicBool,
    counters: Mutex<Counters>,
    records_processed: AtomicU64,
    sample_bad_records: Mutex<VecDeque<BadRecordSample>>,
    sample_bad_writes: Mutex<VecDeque<BadWriteSample>>,
    unexpecteds: Mutex<HashMap<String, u64>>,
    writer: OnceLock<Arc<dyn SpannerWriter>>,
    pub metrics: PipelineMetrics,
}

impl SharedStreamState {
    pub fn new(metrics: PipelineMetrics) -> Self {
        Self {
            shard_processed: Mutex::new(HashMap::new()),
            user_exit: AtomicBool::new(false),
            counters: Mutex::new(Counters::default()),
            records_processed: AtomicU64::new(0),
            sample_bad_records: Mutex::new(VecDeque::new()),
            sample_bad_writes: Mutex::new(VecDeque::new()),
            unexpecteds: Mutex::new(HashMap::new()),
            writer: OnceLock::new(),
            metrics,
        }
    }

    // ---------------------------------------------------------------
    // Writer injection — set exactly once, before any shard worker starts.
    // ---------------------------------------------------------------

    /// Installs the writer. A dry run simply never calls this, leaving
    /// `writer()` to return `None` for the whole pipeline lifetime.
    pub fn set_writer(&self, writer: Arc<dyn SpannerWriter>) {
        let _ = self.writer.set(writer);
    }

    pub fn writer(&self) -> Option<Arc<dyn SpannerWriter>> {
        self.writer.get().cloned()
    }

    // ---------------------------------------------------------------
    // Shard status — {absent -> false -> true} exactly once per shard.
    // ---------------------------------------------------------------

    pub fn set_shard_status(&self, shard_id: &str, done: bool) {
        self.shard_processed
            .lock()
            .expect("shard_processed mutex poisoned")
            .insert(shard_id.to_string(), done);
    }

    /// `false` both when the shard has never been seen and when it is still
    /// in flight — C4's parent-gate poll treats "absent" and "in progress"
    /// identically.
    pub fn shard_done(&self, shard_id: &str) -> bool {
        self.shard_processed
            .lock()
            .expect("shard_processed mutex poisoned")
            .get(shard_id)
            .copied()
            .unwrap_or(false)
    }

    // ---------------------------------------------------------------
    // User exit — single-writer (signal handler / lifecycle), many-readers.
    // ---------------------------------------------------------------

    pub fn set_user_exit(&self) {
        self.user_exit.store(true, Ordering::Relaxed);
    }

    pub fn user_exit(&self) -> bool {
        self.user_exit.load(Ordering::Relaxed)
    }

    // ---------------------------------------------------------------
    // Counters
    // ---------------------------------------------------------------

    pub fn stats_add_record(&self, table: &str, kind: EventKind) {
        bump(&mut self.counters.lock().expect("counters mutex poisoned").records, table, kind);
        self.metrics.inc_record(table, kind.as_str());
    }

    pub fn stats_add_bad_record(&self, table: &str, kind: EventKind) {
        bump(
            &mut self.counters.lock().expect("counters mutex poisoned").bad_records,
            table,
            kind,
        );
        self.metrics.inc_bad_record(table, kind.as_str());
    }

    pub fn stats_add_dropped_record(&self, table: &str, kind: EventKind) {
        bump(
            &mut self.counters.lock().expect("counters mutex poisoned").dropped_records,
            table,
            kind,
        );
        self.metrics.inc_dropped_record(table, kind.as_str());
    }

    pub fn stats_add_record_processed(&self) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_processed(&self) -> u64 {
        self.records_processed.load(Ordering::Relaxed)
    }

    pub fn record_count(&self, table: &str, kind: EventKind) -> u64 {
        count_for(&self.counters.lock().expect("counters mutex poisoned").records, table, kind)
    }

    pub fn bad_record_count(&self, table: &str, kind: EventKind) -> u64 {
        count_for(
            &self.counters.lock().expect("counters mutex poisoned").bad_records,
            table,
            kind,
        )
    }

    pub fn dropped_record_count(&self, table: &str, kind: EventKind) -> u64 {
        count_for(
            &self.counters.lock().expect("counters mutex poisoned").dropped_records,
            table,
            kind,
        )
    }

    // ---------------------------------------------------------------
    // Bounded sample ring buffers, for the shutdown report.
    // ---------------------------------------------------------------

    pub fn collect_bad_record(&self, sample: BadRecordSample) {
        push_bounded(
            &mut self
                .sample_bad_records
                .lock()
                .expect("sample_bad_records mutex poisoned"),
            sample,
        );
    }

    pub fn collect_dropped_record(&self, sample: BadWriteSample) {
        push_bounded(
            &mut self
                .sample_bad_writes
                .lock()
                .expect("sample_bad_writes mutex poisoned"),
            sample,
        );
    }

    pub fn bad_record_samples(&self) -> Vec<BadRecordSample> {
        self.sample_bad_records
            .lock()
            .expect("sample_bad_records mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn dropped_record_samples(&self) -> Vec<BadWriteSample> {
        self.sample_bad_writes
            .lock()
            .expect("sample_bad_writes mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    // ---------------------------------------------------------------
    // Anomalies
    // ---------------------------------------------------------------

    pub fn unexpected(&self, msg: impl Into<String>) {
        let mut guard = self.unexpecteds.lock().expect("unexpecteds mutex poisoned");
        *guard.entry(msg.into()).or_insert(0) += 1;
    }

    pub fn unexpecteds(&self) -> HashMap<String, u64> {
        self.unexpecteds.lock().expect("unexpecteds mutex poisoned").clone()
    }
}

fn bump(counts: &mut EventCounts, table: &str, kind: EventKind) {
    *counts
        .entry(table.to_string())
        .or_default()
        .entry(kind)
        .or_insert(0) += 1;
}

fn count_for(counts: &EventCounts, table: &str, kind: EventKind) -> u64 {
    counts
        .get(table)
        .and_then(|by_kind| by_kind.get(&kind))
        .copied()
        .unwrap_or(0)
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T) {
    if ring.len() >= SAMPLE_RING_CAPACITY {
        ring.pop_front();
    }
    ring.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamo::shard::EventKind;
    use crate::spanner::mutation::Mutation;
    use async_trait::async_trait;

    struct NoopWriter;

    #[async_trait]
    impl SpannerWriter for NoopWriter {
        async fn write(&self, _mutation: Mutation) -> crate::error::AppResult<()> {
            Ok(())
        }
    }

    fn state() -> SharedStreamState {
        SharedStreamState::new(PipelineMetrics::new().unwrap())
    }

    #[test]
    fn shard_status_transitions_absent_false_true() {
        let s = state();
        assert!(!s.shard_done("shard-1"));
        s.set_shard_status("shard-1", false);
        assert!(!s.shard_done("shard-1"));
        s.set_shard_status("shard-1", true);
        assert!(s.shard_done("shard-1"));
    }

    #[test]
    fn user_exit_latches_true() {
        let s = state();
        assert!(!s.user_exit());
        s.set_user_exit();
        assert!(s.user_exit());
    }

    #[test]
    fn counters_accumulate_per_table_and_kind() {
        let s = state();
        s.stats_add_record("Orders", EventKind::Insert);
        s.stats_add_record("Orders", EventKind::Insert);
        s.stats_add_record("Orders", EventKind::Modify);
        assert_eq!(s.record_count("Orders", EventKind::Insert), 2);
        assert_eq!(s.record_count("Orders", EventKind::Modify), 1);
        assert_eq!(s.record_count("Orders", EventKind::Remove), 0);
    }

    #[test]
    fn sample_rings_are_bounded() {
        let s = state();
        for i in 0..(SAMPLE_RING_CAPACITY + 10) {
            s.collect_bad_record(BadRecordSample {
                table: "Orders".into(),
                event_kind: EventKind::Insert,
                bad_cols: vec!["price".into()],
                raw: format!("row-{i}"),
            });
        }
        assert_eq!(s.bad_record_samples().len(), SAMPLE_RING_CAPACITY);
    }

    #[tokio::test]
    async fn writer_is_settable_exactly_once() {
        let s = state();
        assert!(s.writer().is_none());
        s.set_writer(Arc::new(NoopWriter));
        assert!(s.writer().is_some());
        // Second attempt is silently ignored rather than panicking.
        s.set_writer(Arc::new(NoopWriter));
        assert!(s.writer().is_some());
    }

    #[test]
    fn unexpected_counts_repeated_messages() {
        let s = state();
        s.unexpected("writer not configured");
        s.unexpected("writer not configured");
        assert_eq!(s.unexpecteds().get("writer not configured"), Some(&2));
    }
}
