//! Bounded correlation state: publish history and duplicate counters.
//!
//! Two independent LRU caches keyed by message id. Every read or write
//! refreshes the key; inserting past capacity silently drops the least
//! recently used entry of that cache only.

use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tracing::debug;

type PublishHistory = LruCache<String, DateTime<Utc>>;
type DuplicateCounts = LruCache<String, u64>;

pub struct CorrelationStore {
  publish_history: PublishHistory,
  duplicate_counts: DuplicateCounts,
  publish_evictions: u64,
  duplicate_evictions: u64,
}

/// Point-in-time view of the store, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
  pub capacity: usize,
  pub publish_len: usize,
  pub duplicate_len: usize,
  pub publish_evictions: u64,
  pub duplicate_evictions: u64,
}

impl CorrelationStore {
  pub fn new(capacity: NonZeroUsize) -> Self {
    Self {
      publish_history: LruCache::new(capacity),
      duplicate_counts: LruCache::new(capacity),
      publish_evictions: 0,
      duplicate_evictions: 0,
    }
  }

  /// Remember when `id` was published, overwriting any earlier publish.
  pub fn record_publish(&mut self, id: &str, timestamp: DateTime<Utc>) {
    // `push` hands back the replaced entry for an existing key, so only a
    // different key counts as an eviction.
    if let Some((evicted, _)) = self.publish_history.push(id.to_string(), timestamp) {
      if evicted != id {
        self.publish_evictions += 1;
        debug!(msg_id = %evicted, "evicted from publish history");
      }
    }
  }

  /// Publish time of `id`, if still resident. A hit refreshes the entry.
  pub fn lookup_publish(&mut self, id: &str) -> Option<DateTime<Utc>> {
    self.publish_history.get(id).copied()
  }

  /// Count one more duplicate of `id` and return the new count.
  pub fn increment_duplicate(&mut self, id: &str) -> u64 {
    if let Some(count) = self.duplicate_counts.get_mut(id) {
      *count += 1;
      return *count;
    }

    if let Some((evicted, _)) = self.duplicate_counts.push(id.to_string(), 1) {
      self.duplicate_evictions += 1;
      debug!(msg_id = %evicted, "evicted from duplicate counts");
    }
    1
  }

  pub fn stats(&self) -> StoreStats {
    StoreStats {
      capacity: self.publish_history.cap().get(),
      publish_len: self.publish_history.len(),
      duplicate_len: self.duplicate_counts.len(),
      publish_evictions: self.publish_evictions,
      duplicate_evictions: self.duplicate_evictions,
    }
  }

  /// Residency check that does not touch LRU order.
  pub fn has_publish(&self, id: &str) -> bool {
    self.publish_history.contains(id)
  }

  /// Current count without touching LRU order.
  pub fn peek_duplicates(&self, id: &str) -> Option<u64> {
    self.duplicate_counts.peek(id).copied()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn store(capacity: usize) -> CorrelationStore {
    CorrelationStore::new(NonZeroUsize::new(capacity).unwrap())
  }

  fn ts(secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, secs).unwrap()
  }

  #[test]
  fn lookup_refreshes_publish_entry() {
    let mut s = store(2);
    s.record_publish("a", ts(0));
    s.record_publish("b", ts(1));
    assert_eq!(s.lookup_publish("a"), Some(ts(0)));
    s.record_publish("c", ts(2));

    assert!(s.has_publish("a"));
    assert!(!s.has_publish("b"));
    assert!(s.has_publish("c"));
    assert_eq!(s.stats().publish_evictions, 1);
  }

  #[test]
  fn republish_overwrites_without_eviction() {
    let mut s = store(2);
    s.record_publish("a", ts(0));
    s.record_publish("a", ts(5));
    assert_eq!(s.lookup_publish("a"), Some(ts(5)));
    assert_eq!(s.stats().publish_len, 1);
    assert_eq!(s.stats().publish_evictions, 0);
  }

  #[test]
  fn republish_refreshes_publish_entry() {
    let mut s = store(2);
    s.record_publish("a", ts(0));
    s.record_publish("b", ts(1));
    s.record_publish("a", ts(2));
    s.record_publish("c", ts(3));

    assert!(!s.has_publish("b"));
    assert_eq!(s.lookup_publish("a"), Some(ts(2)));
    assert!(s.has_publish("c"));
  }

  #[test]
  fn increment_refreshes_duplicate_entry() {
    let mut s = store(2);
    s.increment_duplicate("a");
    s.increment_duplicate("b");
    s.increment_duplicate("a");
    s.increment_duplicate("c");

    assert_eq!(s.peek_duplicates("a"), Some(2));
    assert_eq!(s.peek_duplicates("b"), None);
    assert_eq!(s.peek_duplicates("c"), Some(1));
  }

  #[test]
  fn duplicate_counts_increment_and_reset_after_eviction() {
    let mut s = store(2);
    assert_eq!(s.increment_duplicate("m1"), 1);
    assert_eq!(s.increment_duplicate("m1"), 2);
    assert_eq!(s.increment_duplicate("m2"), 1);
    assert_eq!(s.increment_duplicate("m3"), 1);

    assert_eq!(s.peek_duplicates("m1"), None);
    assert_eq!(s.increment_duplicate("m1"), 1);
    assert_eq!(s.stats().duplicate_evictions, 2);
  }

  #[test]
  fn caches_evict_independently() {
    let mut s = store(1);
    s.record_publish("m1", ts(0));
    s.increment_duplicate("m2");
    s.increment_duplicate("m3");

    assert!(s.has_publish("m1"));
    assert_eq!(s.peek_duplicates("m2"), None);
    assert_eq!(s.peek_duplicates("m3"), Some(1));
  }

  #[test]
  fn capacity_is_never_exceeded() {
    let mut s = store(3);
    for i in 0..100u32 {
      let id = format!("m{}", i % 17);
      s.record_publish(&id, ts(i % 60));
      s.increment_duplicate(&id);
      if i % 3 == 0 {
        s.lookup_publish(&format!("m{}", i % 5));
      }
      let stats = s.stats();
      assert!(stats.publish_len <= 3);
      assert!(stats.duplicate_len <= 3);
    }
  }
}
