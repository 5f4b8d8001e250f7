//! Per-operator counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by an operator's tasks
#[derive(Debug, Default)]
pub struct OperatorStats {
    records_in: AtomicU64,
    records_out: AtomicU64,
    records_dropped: AtomicU64,
    errors: AtomicU64,
}

impl OperatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_records_in(&self) {
        self.records_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_out(&self) {
        self.records_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Records filtered out or discarded as late
    pub fn inc_records_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self, operator: &str) -> OperatorStatsSnapshot {
        OperatorStatsSnapshot {
            operator: operator.to_string(),
            records_in: self.records_in.load(Ordering::Relaxed),
            records_out: self.records_out.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of one operator's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStatsSnapshot {
    pub operator: String,
    pub records_in: u64,
    pub records_out: u64,
    pub records_dropped: u64,
    pub errors: u64,
}

/// Counters for a whole pipeline, ordered source to sink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    pub flow: String,
    pub operators: Vec<OperatorStatsSnapshot>,
}

impl FlowStats {
    /// Look up an operator's counters by name
    pub fn operator(&self, name: &str) -> Option<&OperatorStatsSnapshot> {
        self.operators.iter().find(|s| s.operator == name)
    }

    /// Sum of errors across all operators
    pub fn total_errors(&self) -> u64 {
        self.operators.iter().map(|s| s.errors).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = OperatorStats::new();
        stats.inc_records_in();
        stats.inc_records_in();
        stats.inc_records_out();
        stats.inc_records_dropped();
        stats.inc_errors();

        let snapshot = stats.snapshot("filter");
        assert_eq!(snapshot.operator, "filter");
        assert_eq!(snapshot.records_in, 2);
        assert_eq!(snapshot.records_out, 1);
        assert_eq!(snapshot.records_dropped, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn test_flow_stats_lookup_and_serialization() {
        let stats = FlowStats {
            flow: "test".to_string(),
            operators: vec![
                OperatorStats::new().snapshot("source"),
                OperatorStats::new().snapshot("sink"),
            ],
        };
        assert!(stats.operator("sink").is_some());
        assert!(stats.operator("missing").is_none());
        assert_eq!(stats.total_errors(), 0);

        let json = serde_json::to_string(&stats).unwrap();
        let back: FlowStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
