// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::Ledger;
use crate::Visit;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::HashSet;
use time::OffsetDateTime;
use time::ext::NumericalDuration;
use time::macros::datetime;

const START: OffsetDateTime = datetime!(2024-01-01 00:00:00 UTC);

fn visit(id: u32) -> Visit {
  Visit::new(
    id,
    format!("https://example.com/{id}"),
    format!("page {id}"),
    START + i64::from(id).seconds(),
  )
}

fn ids(ledger: &Ledger) -> Vec<u32> {
  ledger.iter().map(|visit| visit.visit_id).collect()
}

#[test]
fn most_recent_first() {
  let mut ledger = Ledger::new(10);
  for id in [1, 2, 3] {
    assert_eq!(0, ledger.insert(visit(id)));
  }

  assert_eq!(vec![3, 2, 1], ids(&ledger));
  assert_eq!(vec![visit(3), visit(2), visit(1)], ledger.get_recent());
}

#[test]
fn evicts_least_recent() {
  let mut ledger = Ledger::new(2);
  ledger.insert(visit(1));
  ledger.insert(visit(2));
  assert_eq!(1, ledger.insert(visit(3)));

  assert_eq!(vec![3, 2], ids(&ledger));
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(10)]
fn never_exceeds_capacity(#[case] capacity: u32) {
  let mut ledger = Ledger::new(capacity);
  for id in 0 .. 50 {
    ledger.insert(visit(id % 7));
    assert!(ledger.len() <= capacity as usize);
  }
}

#[test]
fn eviction_is_positional_not_by_timestamp() {
  let mut ledger = Ledger::new(2);
  // The newest insertion carries the oldest timestamp.
  ledger.insert(Visit::new(1, "a", "", START + 10.seconds()));
  ledger.insert(Visit::new(2, "b", "", START + 20.seconds()));
  ledger.insert(Visit::new(3, "c", "", START));

  assert_eq!(vec![3, 2], ids(&ledger));
}

#[test]
fn duplicate_id_moves_to_front() {
  let mut ledger = Ledger::new(3);
  ledger.insert(visit(1));
  ledger.insert(visit(2));
  ledger.insert(visit(3));

  let replacement = Visit::new(1, "https://example.com/new", "new", START + 100.seconds());
  assert_eq!(0, ledger.insert(replacement.clone()));

  assert_eq!(vec![1, 3, 2], ids(&ledger));
  assert_eq!(replacement, ledger.get_recent()[0]);
}

#[test]
fn delete_ignores_unknown_ids() {
  let mut ledger = Ledger::new(5);
  for id in [1, 2, 3] {
    ledger.insert(visit(id));
  }

  assert_eq!(0, ledger.delete(&HashSet::from([42])));
  assert_eq!(vec![3, 2, 1], ids(&ledger));

  assert_eq!(2, ledger.delete(&HashSet::from([1, 3, 42])));
  assert_eq!(vec![2], ids(&ledger));

  assert_eq!(0, ledger.delete(&HashSet::new()));
}

#[test]
fn deleting_last_entry_leaves_empty_ledger() {
  let mut ledger = Ledger::new(5);
  ledger.insert(visit(1));
  ledger.delete(&HashSet::from([1]));

  assert!(ledger.is_empty());
  assert!(ledger.get_recent().is_empty());
}

#[test]
fn clear() {
  let mut ledger = Ledger::new(5);
  for id in [1, 2, 3] {
    ledger.insert(visit(id));
  }
  ledger.clear();
  assert!(ledger.is_empty());

  ledger.insert(visit(4));
  assert_eq!(vec![4], ids(&ledger));
}

#[test]
fn from_entries_truncates_oldest() {
  let (ledger, evicted) = Ledger::from_entries(2, vec![visit(5), visit(4), visit(3)]);
  assert_eq!(1, evicted);
  assert_eq!(vec![5, 4], ids(&ledger));

  let (ledger, evicted) = Ledger::from_entries(4, vec![visit(5), visit(4)]);
  assert_eq!(0, evicted);
  assert_eq!(vec![5, 4], ids(&ledger));
}
