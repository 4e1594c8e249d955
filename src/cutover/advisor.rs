//! cutover/advisor.rs — C7 Cutover Advisor
//!
//! Every minute, computes whether throughput has decayed enough to
//! recommend cutover and rewrites a two-line terminal summary in place
//! (spec.md §4.7). The tick source is a small struct wrapping a
//! `tokio::time::Interval` with a `tick()` method, the same shape as the
//! teacher's `HeartbeatDriver` (`ingest/ws/ws_client.rs`).

use crate::appconfig::CutoverConfig;
use crate::pipeline::state::SharedStreamState;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval};

struct CutoverTicker {
    interval: Interval,
}

impl CutoverTicker {
    /// First `tick()` resolves immediately for a plain `tokio::time::interval`;
    /// starting it one period in the future means the first reading lands on a
    /// real `period`-boundary instead of t≈0 (spec.md §4.7).
    fn new(period: Duration) -> Self {
        Self {
            interval: tokio::time::interval_at(Instant::now() + period, period),
        }
    }

    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Pure rolling-window state, separated from the tick loop so the decay
/// formula (spec.md §8 property 7 / scenario S6) can be unit tested without
/// driving a real timer.
#[derive(Debug, Default)]
struct CutoverTracker {
    ring: [u64; 5],
    timer: usize,
    last_five_min: u64,
    first_five_min: u64,
    last_min: u64,
    previous_total: u64,
}

impl CutoverTracker {
    /// Folds in the latest cumulative `records_processed` reading, returning
    /// the per-minute delta just observed.
    fn observe(&mut self, current_total: u64) -> u64 {
        let delta = current_total.saturating_sub(self.previous_total);
        self.previous_total = current_total;
        self.last_min = delta;

        let idx = self.timer % 5;
        self.last_five_min = self.last_five_min.saturating_sub(self.ring[idx]) + delta;
        self.ring[idx] = delta;

        if self.timer < 5 {
            self.first_five_min += delta;
        }
        self.timer += 1;

        delta
    }

    /// `(lastFiveMin * 100 ≤ decay_threshold_pct * firstFiveMin) OR (lastMin == 0)`.
    fn optimum_condition(&self, decay_threshold_pct: u64) -> bool {
        (self.last_five_min * 100 <= decay_threshold_pct * self.first_five_min) || self.last_min == 0
    }
}

/// `run_cutover_advisor`: a single long-lived task from startup until
/// `UserExit`.
pub async fn run_cutover_advisor(state: Arc<SharedStreamState>, config: CutoverConfig) {
    let mut ticker = CutoverTicker::new(Duration::from_secs(config.tick_interval_secs));
    let mut tracker = CutoverTracker::default();
    let mut first_render = true;

    loop {
        ticker.tick().await;

        let total = state.records_processed();
        tracker.observe(total);
        let optimum = tracker.optimum_condition(config.decay_threshold_pct);

        render(optimum, total, first_render);
        first_render = false;

        if state.user_exit() {
            break;
        }
    }
}

/// Rewrites two stdout lines in place after the first render, using the
/// ANSI cursor-up + erase-line sequence spec.md §6 specifies.
fn render(optimum: bool, records_processed: u64, first_render: bool) {
    let mut out = std::io::stdout();
    if !first_render {
        let _ = write!(out, "\x1b[1A\x1b[2K\x1b[1A\x1b[2K");
    }
    let _ = writeln!(out, "cutover optimum: {optimum}");
    let _ = writeln!(out, "records processed: {records_processed}");
    let _ = out.flush();
}
