//! Semantic Memory - bounded store of regime -> strategy outcomes
//!
//! Records are kept in a min-heap on efficiency (ties: oldest first). Once
//! full, every insert evicts the weakest record, which may be the new one.
//! Retrieval is cosine similarity over the fingerprint metric vector.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::fingerprint::Fingerprint;
use super::rule::StrategyRule;

/// One stored outcome. Stored by value; never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub efficiency: f64,
    pub fingerprint: Fingerprint,
    pub rule: StrategyRule,
    pub stored_at: DateTime<Utc>,
    seq: u64,
}

impl MemoryRecord {
    /// Insertion sequence number
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Heap ordering: efficiency, then insertion order
#[derive(Debug, Clone)]
struct Ranked(MemoryRecord);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .efficiency
            .total_cmp(&other.0.efficiency)
            .then(self.0.seq.cmp(&other.0.seq))
    }
}

/// Result of an insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Stored,
    /// Capacity reached; the minimum-efficiency record was dropped
    Evicted(MemoryRecord),
}

impl InsertOutcome {
    pub fn evicted(&self) -> Option<&MemoryRecord> {
        match self {
            InsertOutcome::Stored => None,
            InsertOutcome::Evicted(record) => Some(record),
        }
    }
}

/// Cosine similarity; 0 when either vector has (near) zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[derive(Serialize, Deserialize)]
struct MemorySnapshot {
    capacity: usize,
    next_seq: u64,
    records: Vec<MemoryRecord>,
}

#[derive(Debug)]
pub struct SemanticMemory {
    capacity: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
    next_seq: u64,
}

impl SemanticMemory {
    /// Capacity is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
            next_seq: 0,
        }
    }

    pub fn insert(&mut self, fingerprint: Fingerprint, rule: StrategyRule, efficiency: f64) -> InsertOutcome {
        let efficiency = if efficiency.is_finite() {
            efficiency
        } else {
            warn!("[MEMORY] Non-finite efficiency {} stored as 0.0", efficiency);
            0.0
        };
        let record = MemoryRecord {
            efficiency,
            fingerprint,
            rule,
            stored_at: Utc::now(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.heap.push(Reverse(Ranked(record)));

        if self.heap.len() > self.capacity {
            if let Some(Reverse(Ranked(evicted))) = self.heap.pop() {
                return InsertOutcome::Evicted(evicted);
            }
        }
        InsertOutcome::Stored
    }

    /// Records more similar than `threshold`, most similar first
    pub fn retrieve(&self, fingerprint: &Fingerprint, threshold: f64) -> Vec<(f64, &MemoryRecord)> {
        let query = fingerprint.metric_vector();
        let mut matches: Vec<(f64, &MemoryRecord)> = self
            .heap
            .iter()
            .map(|Reverse(Ranked(record))| (cosine_similarity(&query, &record.fingerprint.metric_vector()), record))
            .filter(|(similarity, _)| *similarity > threshold)
            .collect();
        matches.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.seq.cmp(&b.1.seq)));
        matches
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_efficiency(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(Ranked(record))| record.efficiency)
    }

    /// All records, highest efficiency first
    pub fn records(&self) -> Vec<&MemoryRecord> {
        let mut records: Vec<&MemoryRecord> = self.heap.iter().map(|Reverse(Ranked(r))| r).collect();
        records.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency).then(a.seq.cmp(&b.seq)));
        records
    }

    /// Save to a JSON snapshot
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let snapshot = MemorySnapshot {
            capacity: self.capacity,
            next_seq: self.next_seq,
            records: self.records().into_iter().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load a snapshot. The configured capacity wins over the stored one;
    /// surplus records are evicted lowest efficiency first.
    pub fn load(path: impl AsRef<Path>, capacity: usize) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let snapshot: MemorySnapshot = serde_json::from_str(&contents)?;
        let mut memory = Self::new(capacity);
        memory.next_seq = snapshot.next_seq;
        for record in snapshot.records {
            memory.next_seq = memory.next_seq.max(record.seq + 1);
            memory.heap.push(Reverse(Ranked(record)));
            if memory.heap.len() > memory.capacity {
                memory.heap.pop();
            }
        }
        info!(
            "[MEMORY] Loaded {} records from {} (stored capacity {})",
            memory.len(),
            path.as_ref().display(),
            snapshot.capacity
        );
        Ok(memory)
    }

    /// Load a snapshot if one exists and parses, else start empty
    pub fn load_or_new(path: impl AsRef<Path>, capacity: usize) -> Self {
        match Self::load(path.as_ref(), capacity) {
            Ok(memory) => memory,
            Err(e) => {
                if path.as_ref().exists() {
                    warn!("[MEMORY] Ignoring unreadable snapshot {}: {}", path.as_ref().display(), e);
                }
                Self::new(capacity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn fp(values: [f64; 5]) -> Fingerprint {
        let mut fp = Fingerprint::neutral(100, Utc::now());
        fp.degraded.clear();
        fp.sync_order = values[0];
        fp.entropy_delta = values[1];
        fp.curvature = values[2];
        fp.hurst_exponent = values[3];
        fp.realized_vol = values[4];
        fp
    }

    fn rule(id: u64) -> StrategyRule {
        StrategyRule::new(id, BTreeMap::new(), BTreeMap::new())
    }

    #[test]
    fn test_eviction_keeps_best() {
        let mut memory = SemanticMemory::new(3);
        let mut evicted = Vec::new();
        for (i, eff) in [0.5, 0.9, 0.2, 0.7].into_iter().enumerate() {
            if let InsertOutcome::Evicted(r) = memory.insert(fp([0.5; 5]), rule(i as u64), eff) {
                evicted.push(r.efficiency);
            }
            assert!(memory.len() <= 3);
        }
        let kept: Vec<f64> = memory.records().iter().map(|r| r.efficiency).collect();
        assert_eq!(kept, vec![0.9, 0.7, 0.5]);
        assert_eq!(evicted, vec![0.2]);
        assert_eq!(memory.min_efficiency(), Some(0.5));
    }

    #[test]
    fn test_new_record_can_be_the_evicted_one() {
        let mut memory = SemanticMemory::new(2);
        memory.insert(fp([0.5; 5]), rule(1), 0.8);
        memory.insert(fp([0.5; 5]), rule(2), 0.6);
        let outcome = memory.insert(fp([0.5; 5]), rule(3), 0.1);
        assert_eq!(outcome.evicted().map(|r| r.rule.id), Some(3));
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_ties_evict_oldest() {
        let mut memory = SemanticMemory::new(1);
        memory.insert(fp([0.5; 5]), rule(1), 0.4);
        let outcome = memory.insert(fp([0.5; 5]), rule(2), 0.4);
        assert_eq!(outcome.evicted().map(|r| r.rule.id), Some(1));
    }

    #[test]
    fn test_zero_capacity_clamped_and_nan_efficiency() {
        let mut memory = SemanticMemory::new(0);
        assert_eq!(memory.capacity(), 1);
        memory.insert(fp([0.5; 5]), rule(1), f64::NAN);
        assert_eq!(memory.min_efficiency(), Some(0.0));
    }

    #[test]
    fn test_similarity_properties() {
        let a = [0.9, -0.1, -0.2, 0.6, 0.3];
        let b = [0.2, 0.4, 0.1, 0.5, 0.9];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-12);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&a, &[0.0; 5]), 0.0);
        let neg: Vec<f64> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&a, &neg) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_retrieve_orders_by_similarity() {
        let mut memory = SemanticMemory::new(10);
        memory.insert(fp([1.0, 0.0, 0.0, 0.0, 0.0]), rule(1), 0.5);
        memory.insert(fp([0.0, 1.0, 0.0, 0.0, 0.0]), rule(2), 0.5);
        memory.insert(fp([1.0, 0.2, 0.0, 0.0, 0.0]), rule(3), 0.5);
        let query = fp([1.0, 0.1, 0.0, 0.0, 0.0]);
        let hits = memory.retrieve(&query, 0.5);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].0 >= hits[1].0);
        assert!(hits.iter().all(|(_, r)| r.rule.id != 2));
        assert!(memory.retrieve(&fp([0.0; 5]), 0.0).is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let mut memory = SemanticMemory::new(4);
        memory.insert(fp([0.5; 5]), rule(1), 0.3);
        memory.insert(fp([0.4; 5]), rule(2), 0.8);
        memory.save(&path).unwrap();

        let restored = SemanticMemory::load(&path, 1).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.records()[0].rule.id, 2);

        let fresh = SemanticMemory::load_or_new(dir.path().join("missing.json"), 4);
        assert!(fresh.is_empty());
    }
}
