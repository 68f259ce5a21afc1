//! Monotonic pipeline counters.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

/// Counters maintained by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum Counter {
    /// Call sites redirected to a specialized clone.
    #[strum(serialize = "existential-specializations")]
    FunctionsSpecialized,
    /// Specialized clones created.
    #[strum(serialize = "clones-created")]
    ClonesCreated,
    /// Requests served by an already existing clone.
    #[strum(serialize = "clones-reused")]
    ClonesReused,
    /// Full apply sites examined.
    #[strum(serialize = "call-sites-visited")]
    CallSitesVisited,
    /// Sites skipped because of their callee.
    #[strum(serialize = "callees-rejected")]
    CalleesRejected,
    /// Sites skipped because no argument qualified.
    #[strum(serialize = "arguments-rejected")]
    ArgumentsRejected,
    /// Requests declined by the transform engine.
    #[strum(serialize = "engine-declined")]
    EngineDeclined,
}

impl Counter {
    const fn slot(self) -> usize {
        self as usize
    }
}

/// Sink for fire-and-forget counter increments.
pub trait MetricsRegistry: Send + Sync {
    /// Adds `amount` to a counter.
    fn add(&self, counter: Counter, amount: u64);

    /// Adds one to a counter.
    fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }
}

/// Atomic in-memory counters.
#[derive(Debug, Default)]
pub struct Statistics {
    counters: [AtomicU64; Counter::COUNT],
}

impl Statistics {
    /// Creates a zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of a counter.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    /// Returns every non-zero counter.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Counter, u64)> {
        Counter::iter()
            .map(|c| (c, self.get(c)))
            .filter(|(_, v)| *v > 0)
            .collect()
    }
}

impl MetricsRegistry for Statistics {
    fn add(&self, counter: Counter, amount: u64) {
        self.counters[counter.slot()].fetch_add(amount, Ordering::Relaxed);
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .snapshot()
            .into_iter()
            .map(|(counter, value)| format!("{counter}={value}"))
            .collect();
        if parts.is_empty() {
            f.write_str("no activity")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}
