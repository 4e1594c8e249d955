//! report.rs
//!
//! The user-visible failure surface spec.md §7 calls for: "the final
//! report, not a stack trace." `build_report` is this crate's equivalent of
//! `passStreamingStatsToConv` — it drains `SharedStreamState`'s counters,
//! anomalies, and bounded sample rings into a flat, loggable snapshot taken
//! once at shutdown.

use crate::pipeline::state::{BadRecordSample, BadWriteSample, SharedStreamState};
use std::collections::HashMap;

#[derive(Debug)]
pub struct MigrationReport {
    pub records_processed: u64,
    pub unexpecteds: HashMap<String, u64>,
    pub bad_record_samples: Vec<BadRecordSample>,
    pub dropped_record_samples: Vec<BadWriteSample>,
}

impl MigrationReport {
    pub fn log_summary(&self) {
        tracing::info!(
            records_processed = self.records_processed,
            bad_record_samples = self.bad_record_samples.len(),
            dropped_record_samples = self.dropped_record_samples.len(),
            unexpected_kinds = self.unexpecteds.len(),
            "migration report"
        );
        for (msg, count) in &self.unexpecteds {
            tracing::warn!(count, "{msg}");
        }
    }
}

/// Takes a point-in-time snapshot of `state`, equivalent to the source's
/// `passStreamingStatsToConv` call at shutdown.
pub fn build_report(state: &SharedStreamState) -> MigrationReport {
    MigrationReport {
        records_processed: state.records_processed(),
        unexpecteds: state.unexpecteds(),
        bad_record_samples: state.bad_record_samples(),
        dropped_record_samples: state.dropped_record_samples(),
    }
}
