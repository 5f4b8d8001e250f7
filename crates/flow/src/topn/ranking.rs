//! Bounded sorted lists used by the Top-N operator
//!
//! Each group keeps at most `n` [`Tuple`]s in a `Vec` sorted by sort key
//! and then by tie-break hash. `n` is expected to be small, so insertion is a
//! binary search plus a shift; a record that does not beat the current worst
//! entry of a full list is discarded after a single comparison.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// Ranking direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Order {
    /// Smallest sort keys first (bottom-N)
    #[default]
    Asc,
    /// Largest sort keys first (top-N)
    Desc,
}

/// Hash an identity string into a tie-break value
///
/// The first eight bytes of its SHA-256 digest, read big-endian; stable
/// across runs and processes.
pub fn hash_key(identity: &str) -> u64 {
    let digest = Sha256::digest(identity.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// One ranked entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple<T> {
    pub sort_key: i64,
    pub record: Record<T>,
    key_hash: Option<u64>,
}

impl<T> Tuple<T> {
    /// Entry without an identity; ties keep arrival order
    pub fn new(sort_key: i64, record: Record<T>) -> Self {
        Self {
            sort_key,
            record,
            key_hash: None,
        }
    }

    /// Entry whose identity breaks ties and replaces earlier entries with the
    /// same identity
    pub fn with_key_hash(sort_key: i64, record: Record<T>, key_hash: u64) -> Self {
        Self {
            sort_key,
            record,
            key_hash: Some(key_hash),
        }
    }

    pub fn key_hash(&self) -> Option<u64> {
        self.key_hash
    }

    fn tie_break(&self) -> u64 {
        self.key_hash.unwrap_or(0)
    }
}

/// Sorted list holding at most `capacity` entries
#[derive(Debug, Clone)]
pub struct RankedList<T> {
    capacity: usize,
    order: Order,
    entries: Vec<Tuple<T>>,
}

impl<T> RankedList<T> {
    pub fn new(capacity: usize, order: Order) -> Self {
        Self {
            capacity,
            order,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Compare two entries under the configured order; `Less` ranks better
    fn compare(&self, a: &Tuple<T>, b: &Tuple<T>) -> Ordering {
        let natural = a
            .sort_key
            .cmp(&b.sort_key)
            .then_with(|| a.tie_break().cmp(&b.tie_break()));
        match self.order {
            Order::Asc => natural,
            Order::Desc => natural.reverse(),
        }
    }

    fn insert_sorted(&mut self, tuple: Tuple<T>) {
        // After any equal entries, so ties keep arrival order.
        let pos = self
            .entries
            .partition_point(|e| self.compare(e, &tuple) != Ordering::Greater);
        self.entries.insert(pos, tuple);
    }

    /// Offer an entry; returns whether it was kept
    pub fn offer(&mut self, tuple: Tuple<T>) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if let Some(hash) = tuple.key_hash {
            if let Some(pos) = self.entries.iter().position(|e| e.key_hash == Some(hash)) {
                self.entries.remove(pos);
            }
        }

        if self.entries.len() < self.capacity {
            self.insert_sorted(tuple);
            return true;
        }

        let beats_worst = match self.entries.last() {
            Some(worst) => self.compare(&tuple, worst) == Ordering::Less,
            None => true,
        };
        if !beats_worst {
            return false;
        }
        self.entries.pop();
        self.insert_sorted(tuple);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Tuple<T>] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Tuple<T>> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort_keys<T>(list: &RankedList<T>) -> Vec<i64> {
        list.entries().iter().map(|t| t.sort_key).collect()
    }

    #[test]
    fn test_hash_key_is_stable() {
        assert_eq!(hash_key("instance-001"), hash_key("instance-001"));
        assert_ne!(hash_key("instance-001"), hash_key("instance-002"));
        // SHA-256("") starts with e3b0c442 98fc1c14.
        assert_eq!(hash_key(""), 0xe3b0_c442_98fc_1c14);
    }

    #[test]
    fn test_asc_keeps_smallest() {
        let mut list = RankedList::new(3, Order::Asc);
        for v in [10, 4, 8, 1, 9, 3] {
            list.offer(Tuple::new(v, Record::without_ts(v)));
        }
        assert_eq!(sort_keys(&list), vec![1, 3, 4]);
    }

    #[test]
    fn test_desc_keeps_largest() {
        let mut list = RankedList::new(3, Order::Desc);
        for v in [10, 4, 8, 1, 9, 3] {
            list.offer(Tuple::new(v, Record::without_ts(v)));
        }
        assert_eq!(sort_keys(&list), vec![10, 9, 8]);
    }

    #[test]
    fn test_non_qualifying_entry_discarded() {
        let mut list = RankedList::new(2, Order::Asc);
        assert!(list.offer(Tuple::new(1, Record::without_ts("a"))));
        assert!(list.offer(Tuple::new(2, Record::without_ts("b"))));
        assert!(!list.offer(Tuple::new(5, Record::without_ts("c"))));
        // Equal to the worst does not displace it.
        assert!(!list.offer(Tuple::new(2, Record::without_ts("d"))));
        assert_eq!(list.entries()[1].record, Record::without_ts("b"));
    }

    #[test]
    fn test_ties_broken_by_key_hash() {
        let (a, b) = (hash_key("a"), hash_key("b"));
        let (low, high) = if a < b { ("a", "b") } else { ("b", "a") };

        for first in [low, high] {
            let second = if first == low { high } else { low };
            let mut list = RankedList::new(2, Order::Asc);
            list.offer(Tuple::with_key_hash(5, Record::without_ts(first), hash_key(first)));
            list.offer(Tuple::with_key_hash(5, Record::without_ts(second), hash_key(second)));

            let order: Vec<&str> = list.entries().iter().map(|t| *t.record.data()).collect();
            assert_eq!(order, vec![low, high]);
        }
    }

    #[test]
    fn test_same_identity_replaces_previous_entry() {
        let key = hash_key("consumer-instance-001");
        let mut list = RankedList::new(3, Order::Desc);
        list.offer(Tuple::with_key_hash(9900, Record::new(9900, 2000), key));
        list.offer(Tuple::with_key_hash(9700, Record::new(9700, 4000), hash_key("002")));
        list.offer(Tuple::with_key_hash(9600, Record::new(9600, 6000), hash_key("004")));
        list.offer(Tuple::with_key_hash(9500, Record::new(9500, 7000), key));

        assert_eq!(sort_keys(&list), vec![9700, 9600, 9500]);
    }

    #[test]
    fn test_list_never_exceeds_capacity() {
        let mut list = RankedList::new(4, Order::Desc);
        for v in 0..100i64 {
            list.offer(Tuple::new((v * 37) % 101, Record::without_ts(v)));
            assert!(list.len() <= 4);
            let keys = sort_keys(&list);
            assert!(keys.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut list = RankedList::new(0, Order::Asc);
        assert!(!list.offer(Tuple::new(1, Record::without_ts(1))));
        assert!(list.is_empty());
    }
}
