//! Labelled counters and timers for build passes.
//!
//! Values are recorded silently at the call site. Call
//! [`BuildMetrics::flush`] to emit and clear every series as `tracing::info!` events
//! (e.g. at the end of a pass).

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Counter incremented when an existing artifact is reused instead of rebuilt.
pub const REUSE_ARTIFACT: &str = "ReuseArtifact";

/// Metric labels; sorted so the same pairs always name the same series.
pub type Labels = BTreeMap<String, String>;

/// Build a label set from `(key, value)` pairs.
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SeriesKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &str, labels: &Labels) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    fn render_labels(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Aggregate of all durations recorded for one timer series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

/// Shared metrics recorder; safe to use from concurrent build tasks.
#[derive(Debug, Default)]
pub struct BuildMetrics {
    counters: Mutex<BTreeMap<SeriesKey, u64>>,
    timers: Mutex<BTreeMap<SeriesKey, TimerStats>>,
}

impl BuildMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter `name` for `labels` by one.
    pub fn inc_counter(&self, name: &str, labels: &Labels) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(SeriesKey::new(name, labels)).or_default() += 1;
        tracing::trace!(metric = name, "counter incremented");
    }

    /// Record one timed call. An `outcome` label of `success` or `failure`
    /// is added to `labels`.
    pub fn record_timer(&self, name: &str, labels: &Labels, elapsed: Duration, success: bool) {
        let mut labels = labels.clone();
        labels.insert(
            "outcome".to_string(),
            if success { "success" } else { "failure" }.to_string(),
        );
        let elapsed_ms = elapsed.as_millis() as u64;

        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = timers.entry(SeriesKey::new(name, &labels)).or_default();
        stats.count += 1;
        stats.total_ms += elapsed_ms;
        stats.max_ms = stats.max_ms.max(elapsed_ms);
        tracing::trace!(metric = name, elapsed_ms, "timer recorded");
    }

    /// Read the current value of a counter series.
    pub fn counter(&self, name: &str, labels: &Labels) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .get(&SeriesKey::new(name, labels))
            .copied()
            .unwrap_or(0)
    }

    /// Read a timer series; `labels` must include the `outcome` label.
    pub fn timer(&self, name: &str, labels: &Labels) -> Option<TimerStats> {
        let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.get(&SeriesKey::new(name, labels)).copied()
    }

    /// Sum of every series of counter `name`, across all label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .iter()
            .filter(|(k, _)| k.name == name)
            .map(|(_, v)| *v)
            .sum()
    }

    /// Emit every series as an `info!` event and clear it.
    ///
    /// Returns how many series were emitted.
    pub fn flush(&self) -> usize {
        let counters =
            std::mem::take(&mut *self.counters.lock().unwrap_or_else(PoisonError::into_inner));
        let timers =
            std::mem::take(&mut *self.timers.lock().unwrap_or_else(PoisonError::into_inner));

        for (key, value) in counters.iter() {
            tracing::info!(
                metric = %key.name,
                labels = %key.render_labels(),
                value = *value,
                "counter"
            );
        }
        for (key, stats) in timers.iter() {
            tracing::info!(
                metric = %key.name,
                labels = %key.render_labels(),
                count = stats.count,
                total_ms = stats.total_ms,
                max_ms = stats.max_ms,
                "timer"
            );
        }
        counters.len() + timers.len()
    }

    /// Reset all series (useful in tests).
    pub fn reset(&self) {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_keyed_by_labels() {
        let m = BuildMetrics::new();
        let deck = labels(&[("repository", "deck"), ("artifact", "debian")]);
        let gate = labels(&[("repository", "gate"), ("artifact", "debian")]);
        m.inc_counter(REUSE_ARTIFACT, &deck);
        m.inc_counter(REUSE_ARTIFACT, &deck);
        m.inc_counter(REUSE_ARTIFACT, &gate);

        assert_eq!(m.counter(REUSE_ARTIFACT, &deck), 2);
        assert_eq!(m.counter(REUSE_ARTIFACT, &gate), 1);
        assert_eq!(m.counter_total(REUSE_ARTIFACT), 3);
    }

    #[test]
    fn label_order_does_not_split_series() {
        let m = BuildMetrics::new();
        m.inc_counter("c", &labels(&[("a", "1"), ("b", "2")]));
        m.inc_counter("c", &labels(&[("b", "2"), ("a", "1")]));
        assert_eq!(m.counter("c", &labels(&[("a", "1"), ("b", "2")])), 2);
    }

    #[test]
    fn timers_add_outcome_label() {
        let m = BuildMetrics::new();
        let base = labels(&[("repository", "deck")]);
        m.record_timer("DebBuild", &base, Duration::from_millis(30), true);
        m.record_timer("DebBuild", &base, Duration::from_millis(50), true);
        m.record_timer("DebBuild", &base, Duration::from_millis(5), false);

        let ok = m
            .timer("DebBuild", &labels(&[("repository", "deck"), ("outcome", "success")]))
            .unwrap();
        assert_eq!(ok.count, 2);
        assert_eq!(ok.total_ms, 80);
        assert_eq!(ok.max_ms, 50);

        let failed = m
            .timer("DebBuild", &labels(&[("repository", "deck"), ("outcome", "failure")]))
            .unwrap();
        assert_eq!(failed.count, 1);
        assert!(m.timer("DebBuild", &base).is_none());
    }

    #[test]
    fn flush_emits_and_drains() {
        let m = BuildMetrics::new();
        m.inc_counter(REUSE_ARTIFACT, &labels(&[("repository", "deck")]));
        m.inc_counter(REUSE_ARTIFACT, &labels(&[("repository", "gate")]));
        m.record_timer("GcrBuild", &Labels::new(), Duration::from_millis(3), false);

        assert_eq!(m.flush(), 3);
        assert_eq!(m.counter_total(REUSE_ARTIFACT), 0);
        assert_eq!(m.flush(), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let m = BuildMetrics::new();
        m.inc_counter("c", &Labels::new());
        m.record_timer("t", &Labels::new(), Duration::from_millis(1), true);
        m.reset();
        assert_eq!(m.counter_total("c"), 0);
        assert!(m
            .timer("t", &labels(&[("outcome", "success")]))
            .is_none());
    }
}
