use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ErrorKind;

/// Error counts by kind, shared by every session that reports into it.
///
/// Guarded by its own lock, never taken while holding anything else.
#[derive(Debug, Default)]
pub struct ErrorCounters {
    counts: Mutex<HashMap<ErrorKind, u64>>,
}

impl ErrorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<ErrorKind, u64>) -> R) -> R {
        let mut guard = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn record(&self, kind: ErrorKind) {
        self.with(|counts| *counts.entry(kind).or_insert(0) += 1);
    }

    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.with(|counts| counts.get(&kind).copied().unwrap_or(0))
    }

    pub fn total(&self) -> u64 {
        self.with(|counts| counts.values().sum())
    }

    /// Copy of the current counts; kinds never seen are absent.
    pub fn snapshot(&self) -> HashMap<ErrorKind, u64> {
        self.with(|counts| counts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_by_kind() {
        let counters = ErrorCounters::new();
        counters.record(ErrorKind::Connect);
        counters.record(ErrorKind::Connect);
        counters.record(ErrorKind::Command);
        assert_eq!(counters.count(ErrorKind::Connect), 2);
        assert_eq!(counters.count(ErrorKind::Disconnect), 0);
        assert_eq!(counters.total(), 3);
        assert_eq!(counters.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn shared_across_tasks() {
        let counters = Arc::new(ErrorCounters::new());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                tokio::spawn(async move { counters.record(ErrorKind::InvalidRequest) })
            })
            .collect();
        for task in tasks {
            task.await.expect("task");
        }
        assert_eq!(counters.count(ErrorKind::InvalidRequest), 8);
    }
}
