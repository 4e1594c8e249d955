//! metrics.rs
//!
//! Prometheus counters/gauges for the streaming pipeline. Not part of any
//! spec'd component directly, but carried the way the teacher carries
//! `ingest/metrics.rs` and `redis/metrics.rs`: a feature-gated struct with a
//! `Registry`, constructed once at startup and cloned into every component
//! that needs to bump a counter.

use crate::error::AppResult;

#[cfg(feature = "metrics")]
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    #[cfg(feature = "metrics")]
    registry: Registry,

    /// Labeled by (table, event_kind): good / bad / dropped records.
    #[cfg(feature = "metrics")]
    pub records_total: IntCounterVec,
    #[cfg(feature = "metrics")]
    pub bad_records_total: IntCounterVec,
    #[cfg(feature = "metrics")]
    pub dropped_records_total: IntCounterVec,

    /// Shards currently being processed by a worker.
    #[cfg(feature = "metrics")]
    pub shards_in_flight: IntGauge,

    /// C4 trimmed-data resets and C6 parent-missing retries.
    #[cfg(feature = "metrics")]
    pub trim_resets_total: IntCounter,
    #[cfg(feature = "metrics")]
    pub parent_missing_retries_total: IntCounter,

    #[cfg(not(feature = "metrics"))]
    _noop: (),
}

impl PipelineMetrics {
    pub fn new() -> AppResult<Self> {
        #[cfg(feature = "metrics")]
        {
            let registry = Registry::new();

            let records_total = IntCounterVec::new(
                Opts::new(
                    "cdc_records_total",
                    "Stream records successfully applied to Spanner",
                ),
                &["table", "event_kind"],
            )?;

            let bad_records_total = IntCounterVec::new(
                Opts::new(
                    "cdc_bad_records_total",
                    "Stream records that failed column conversion",
                ),
                &["table", "event_kind"],
            )?;

            let dropped_records_total = IntCounterVec::new(
                Opts::new(
                    "cdc_dropped_records_total",
                    "Converted mutations that failed to apply to Spanner",
                ),
                &["table", "event_kind"],
            )?;

            let shards_in_flight = IntGauge::with_opts(Opts::new(
                "cdc_shards_in_flight",
                "Number of shard workers currently running",
            ))?;

            let trim_resets_total = IntCounter::with_opts(Opts::new(
                "cdc_trim_resets_total",
                "Total TrimmedDataAccessException recoveries across all shards",
            ))?;

            let parent_missing_retries_total = IntCounter::with_opts(Opts::new(
                "cdc_parent_missing_retries_total",
                "Total parent-row-missing retries across all mutations",
            ))?;

            registry.register(Box::new(records_total.clone()))?;
            registry.register(Box::new(bad_records_total.clone()))?;
            registry.register(Box::new(dropped_records_total.clone()))?;
            registry.register(Box::new(shards_in_flight.clone()))?;
            registry.register(Box::new(trim_resets_total.clone()))?;
            registry.register(Box::new(parent_missing_retries_total.clone()))?;

            Ok(Self {
                registry,
                records_total,
                bad_records_total,
                dropped_records_total,
                shards_in_flight,
                trim_resets_total,
                parent_missing_retries_total,
            })
        }

        #[cfg(not(feature = "metrics"))]
        {
            Ok(Self { _noop: () })
        }
    }

    #[cfg(feature = "metrics")]
    pub fn encode_text(&self) -> AppResult<String> {
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&mf, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    #[cfg(not(feature = "metrics"))]
    pub fn encode_text(&self) -> AppResult<String> {
        Ok(String::new())
    }

    #[inline]
    pub fn inc_record(&self, _table: &str, _event_kind: &str) {
        #[cfg(feature = "metrics")]
        self.records_total
            .with_label_values(&[_table, _event_kind])
            .inc();
    }

    #[inline]
    pub fn inc_bad_record(&self, _table: &str, _event_kind: &str) {
        #[cfg(feature = "metrics")]
        self.bad_records_total
            .with_label_values(&[_table, _event_kind])
            .inc();
    }

    #[inline]
    pub fn inc_dropped_record(&self, _table: &str, _event_kind: &str) {
        #[cfg(feature = "metrics")]
        self.dropped_records_total
            .with_label_values(&[_table, _event_kind])
            .inc();
    }

    #[inline]
    pub fn shard_started(&self) {
        #[cfg(feature = "metrics")]
        self.shards_in_flight.inc();
    }

    #[inline]
    pub fn shard_finished(&self) {
        #[cfg(feature = "metrics")]
        self.shards_in_flight.dec();
    }

    #[inline]
    pub fn inc_trim_reset(&self) {
        #[cfg(feature = "metrics")]
        self.trim_resets_total.inc();
    }

    #[inline]
    pub fn inc_parent_missing_retry(&self) {
        #[cfg(feature = "metrics")]
        self.parent_missing_retries_total.inc();
    }

    #[cfg(feature = "metrics")]
    pub fn parent_missing_retries(&self) -> i64 {
        self.parent_missing_retries_total.get()
    }
}
