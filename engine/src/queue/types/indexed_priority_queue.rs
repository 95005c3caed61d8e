//! Indexed Priority Queue with O(log n) operations.
//!
//! Combines a HashMap (O(1) membership) with a BinaryHeap (O(log n) priority ops).
//! The heap stores only ordering metadata; removal is lazy, so a cancelled
//! job is dropped from the index immediately and its heap entry is skipped
//! the next time it surfaces.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::FxHashMap;

/// Heap entry with only ordering metadata.
#[derive(Debug, Clone)]
struct HeapEntry {
    job_id: String,
    priority: i32,
    created_at: u64,
    seq: u64,
}

impl Eq for HeapEntry {}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority = greater (popped first from max-heap)
        // Older created_at = greater (FIFO within a priority tier)
        // Lower seq = greater (insertion order for same-millisecond submits)
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority index over pending job ids.
pub struct IndexedPriorityQueue {
    heap: BinaryHeap<HeapEntry>,
    /// job_id -> seq of the live heap entry
    index: FxHashMap<String, u64>,
}

impl IndexedPriorityQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            index: FxHashMap::default(),
        }
    }

    /// Push a job id - O(log n)
    #[inline]
    pub fn push(&mut self, job_id: &str, priority: i32, created_at: u64, seq: u64) {
        self.index.insert(job_id.to_string(), seq);
        self.heap.push(HeapEntry {
            job_id: job_id.to_string(),
            priority,
            created_at,
            seq,
        });
    }

    /// Pop the id of the highest priority job - O(log n) amortized
    #[inline]
    pub fn pop(&mut self) -> Option<String> {
        while let Some(entry) = self.heap.pop() {
            if self.index.get(&entry.job_id) == Some(&entry.seq) {
                self.index.remove(&entry.job_id);
                return Some(entry.job_id);
            }
        }
        None
    }

    /// Check if job is indexed - O(1)
    #[inline]
    pub fn contains(&self, job_id: &str) -> bool {
        self.index.contains_key(job_id)
    }

    /// Remove a job id - O(1) (lazy removal)
    #[inline]
    pub fn remove(&mut self, job_id: &str) -> bool {
        self.index.remove(job_id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop stale heap entries left behind by lazy removal.
    pub fn compact(&mut self) {
        let index = &self.index;
        self.heap
            .retain(|entry| index.get(&entry.job_id) == Some(&entry.seq));
    }
}

impl Default for IndexedPriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_by_priority_then_age() {
        let mut q = IndexedPriorityQueue::new();
        q.push("a", 5, 100, 1);
        q.push("b", 1, 101, 2);
        q.push("c", 5, 102, 3);
        q.push("d", 10, 103, 4);

        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, vec!["d", "a", "c", "b"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_seq_breaks_same_millisecond_ties() {
        let mut q = IndexedPriorityQueue::new();
        q.push("second", 0, 100, 2);
        q.push("first", 0, 100, 1);
        assert_eq!(q.pop().as_deref(), Some("first"));
        assert_eq!(q.pop().as_deref(), Some("second"));
    }

    #[test]
    fn test_removed_entries_are_skipped() {
        let mut q = IndexedPriorityQueue::new();
        q.push("a", 10, 100, 1);
        q.push("b", 0, 101, 2);
        assert!(q.remove("a"));
        assert!(!q.contains("a"));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().as_deref(), Some("b"));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_compact_drops_stale_entries() {
        let mut q = IndexedPriorityQueue::new();
        for i in 0..10u64 {
            q.push(&format!("job-{i}"), 0, 100 + i, i);
        }
        for i in 0..9u64 {
            q.remove(&format!("job-{i}"));
        }
        q.compact();
        assert_eq!(q.heap.len(), 1);
        assert_eq!(q.pop().as_deref(), Some("job-9"));
    }
}
