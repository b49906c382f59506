//! Counter snapshots and diffs
//!
//! A [`MetricDiff`] records the value of one counter as a baseline and
//! reports how far it has moved since. Tests take a baseline, run an
//! operation, then assert on the diff.
//!
//! Reads are plain unsynchronized snapshot reads of a counter the system
//! under test may be updating from other threads. A diff is only meaningful
//! at a point where the test has awaited the operation it is measuring;
//! nothing here orders reads against background work.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::error::{Result, TestKitError};

/// Identifier of an instrumentation counter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statistic {
    symbol: Cow<'static, str>,
    description: Cow<'static, str>,
}

impl Statistic {
    pub const fn new(symbol: &'static str, description: &'static str) -> Self {
        Self {
            symbol: Cow::Borrowed(symbol),
            description: Cow::Borrowed(description),
        }
    }

    /// Statistic with a runtime-built symbol and no description
    pub fn named(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Cow::Owned(symbol.into()),
            description: Cow::Borrowed(""),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// Source of counter values, typically the instrumentation of the client
/// under test. Implementations must not change state when read.
pub trait CounterSource: Send + Sync {
    /// Current value; counters never touched read as zero
    fn counter_value(&self, statistic: &Statistic) -> i64;
}

/// In-memory counters, shareable between a test double and the test
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: DashMap<String, AtomicI64>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one, returning the new value
    pub fn increment(&self, statistic: &Statistic) -> i64 {
        self.add(statistic, 1)
    }

    /// Add `delta`, returning the new value
    pub fn add(&self, statistic: &Statistic, delta: i64) -> i64 {
        let entry = self
            .counters
            .entry(statistic.symbol().to_string())
            .or_insert_with(|| AtomicI64::new(0));
        entry.fetch_add(delta, Ordering::Relaxed) + delta
    }

    pub fn set(&self, statistic: &Statistic, value: i64) {
        self.counters
            .entry(statistic.symbol().to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }
}

impl CounterSource for CounterRegistry {
    fn counter_value(&self, statistic: &Statistic) -> i64 {
        self.counters
            .get(statistic.symbol())
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Value of a counter at one moment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub statistic: Statistic,
    pub value: i64,
}

impl CounterSnapshot {
    pub fn take(source: &dyn CounterSource, statistic: &Statistic) -> Self {
        Self {
            statistic: statistic.clone(),
            value: source.counter_value(statistic),
        }
    }
}

/// Tracks the change of one counter since a baseline.
///
/// Not synchronized: see the module docs before sharing a source between
/// concurrently running tests.
pub struct MetricDiff {
    source: Arc<dyn CounterSource>,
    baseline: CounterSnapshot,
}

impl MetricDiff {
    /// Start measuring `statistic`, taking the current value as baseline
    pub fn new(source: Arc<dyn CounterSource>, statistic: Statistic) -> Self {
        let baseline = CounterSnapshot::take(source.as_ref(), &statistic);
        Self { source, baseline }
    }

    /// Make the current value the new baseline
    pub fn reset(&mut self) {
        self.baseline = CounterSnapshot::take(self.source.as_ref(), &self.baseline.statistic);
    }

    pub fn current_value(&self) -> i64 {
        self.source.counter_value(&self.baseline.statistic)
    }

    /// Baseline set at construction or by the last [`reset`](Self::reset)
    pub fn starting_value(&self) -> i64 {
        self.baseline.value
    }

    pub fn statistic(&self) -> &Statistic {
        &self.baseline.statistic
    }

    /// Current value minus baseline, read fresh on every call.
    ///
    /// Wraps rather than overflowing on extreme counter values.
    pub fn diff(&self) -> i64 {
        self.current_value().wrapping_sub(self.baseline.value)
    }

    pub fn assert_diff_equals(&self, expected: i64) -> Result<()> {
        self.assert_diff_equals_msg(&format!("Count of {}", self), expected)
    }

    /// Like [`assert_diff_equals`](Self::assert_diff_equals) with a caller message
    pub fn assert_diff_equals_msg(&self, message: &str, expected: i64) -> Result<()> {
        let actual = self.diff();
        if actual == expected {
            return Ok(());
        }
        Err(TestKitError::DiffMismatch {
            message: message.to_string(),
            statistic: self.statistic().symbol().to_string(),
            expected,
            actual,
        })
    }

    /// Fail unless both counters moved by the same amount
    pub fn assert_diff_matches(&self, other: &MetricDiff) -> Result<()> {
        let (mine, theirs) = (self.diff(), other.diff());
        if mine == theirs {
            return Ok(());
        }
        Err(TestKitError::DiffMismatch {
            message: format!("{} != {}", self, other),
            statistic: self.statistic().symbol().to_string(),
            expected: theirs,
            actual: mine,
        })
    }

    pub fn diff_equals(&self, other: &MetricDiff) -> bool {
        self.diff() == other.diff()
    }

    pub fn diff_less_than(&self, other: &MetricDiff) -> bool {
        self.diff() < other.diff()
    }

    pub fn diff_less_than_or_equals(&self, other: &MetricDiff) -> bool {
        self.diff() <= other.diff()
    }
}

impl fmt::Display for MetricDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current_value();
        write!(
            f,
            "{} starting={} current={} diff={}",
            self.statistic(),
            self.baseline.value,
            current,
            current.wrapping_sub(self.baseline.value)
        )
    }
}

impl fmt::Debug for MetricDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricDiff")
            .field("baseline", &self.baseline)
            .finish_non_exhaustive()
    }
}

pub fn reset_all<'a>(metrics: impl IntoIterator<Item = &'a mut MetricDiff>) {
    for metric in metrics {
        metric.reset();
    }
}

/// Log each metric at info level
pub fn log_all<'a>(metrics: impl IntoIterator<Item = &'a MetricDiff>) {
    for metric in metrics {
        info!("{}", metric);
    }
}

pub fn log_then_reset<'a>(metrics: impl IntoIterator<Item = &'a mut MetricDiff>) {
    for metric in metrics {
        info!("{}", metric);
        metric.reset();
    }
}
