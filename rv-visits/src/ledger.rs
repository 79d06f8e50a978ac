// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./ledger_test.rs"]
mod tests;

use crate::Visit;
use std::collections::{HashSet, VecDeque};

//
// Ledger
//

/// The bounded visit history of one user, most recent first.
///
/// Recency is positional: the front is the latest insertion and eviction always drops from the
/// back. Timestamps are carried but never consulted, so a skewed clock cannot reorder entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
  capacity: usize,
  entries: VecDeque<Visit>,
}

impl Ledger {
  #[must_use]
  pub fn new(capacity: u32) -> Self {
    Self {
      capacity: capacity as usize,
      entries: VecDeque::new(),
    }
  }

  /// Build a ledger from entries that are already ordered most recent first. Entries past
  /// `capacity` are evicted from the least recent end. Returns the ledger and the number of
  /// evicted entries.
  #[must_use]
  pub fn from_entries(capacity: u32, entries: Vec<Visit>) -> (Self, usize) {
    let mut ledger = Self {
      capacity: capacity as usize,
      entries: entries.into(),
    };
    let evicted = ledger.evict_to_capacity();
    (ledger, evicted)
  }

  /// Insert `visit` as the most recent entry. An existing entry with the same id is removed
  /// first, so a repeated visit moves to the front. Returns the number of evicted entries.
  pub fn insert(&mut self, visit: Visit) -> usize {
    self
      .entries
      .retain(|existing| existing.visit_id != visit.visit_id);
    self.entries.push_front(visit);
    self.evict_to_capacity()
  }

  /// A copy of all entries, most recent first.
  #[must_use]
  pub fn get_recent(&self) -> Vec<Visit> {
    self.entries.iter().cloned().collect()
  }

  pub fn iter(&self) -> impl ExactSizeIterator<Item = &Visit> {
    self.entries.iter()
  }

  /// Remove every entry whose id is in `ids`. Unknown ids are ignored. Returns how many entries
  /// were removed.
  pub fn delete(&mut self, ids: &HashSet<u32>) -> usize {
    let before = self.entries.len();
    self
      .entries
      .retain(|visit| !ids.contains(&visit.visit_id));
    before - self.entries.len()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  #[must_use]
  pub const fn capacity(&self) -> usize {
    self.capacity
  }

  fn evict_to_capacity(&mut self) -> usize {
    let excess = self.entries.len().saturating_sub(self.capacity);
    for _ in 0 .. excess {
      if let Some(evicted) = self.entries.pop_back() {
        log::trace!("evicting visit {}", evicted.visit_id);
      }
    }
    excess
  }
}
