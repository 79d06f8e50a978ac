// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{VisitManager, with_manager};
use crate::config::{StoreConfig, SyncMode};
use crate::store::DataLoss;
use crate::Error;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rv_test_helpers::{TEST_EPOCH, TempStorePath, test_time_provider};
use rv_time::TestTimeProvider;
use std::sync::Arc;
use time::ext::NumericalDuration;

struct Setup {
  path: TempStorePath,
  time_provider: Arc<TestTimeProvider>,
}

impl Setup {
  fn new() -> Self {
    Self {
      path: TempStorePath::default(),
      time_provider: test_time_provider(),
    }
  }

  fn open(&self, config: StoreConfig) -> VisitManager {
    VisitManager::open_with_config(self.path.path(), config, self.time_provider.clone()).unwrap()
  }

  fn open_with_capacity(&self, capacity: u32) -> VisitManager {
    self.open(StoreConfig::with_capacity(capacity))
  }
}

fn ids(manager: &VisitManager, user_id: u32) -> Vec<u32> {
  manager
    .get_recent_visits(user_id)
    .unwrap()
    .iter()
    .map(|visit| visit.visit_id)
    .collect()
}

#[test]
fn recency_order_and_timestamps() {
  let setup = Setup::new();
  let manager = setup.open_with_capacity(10);

  for (id, url) in [(1, "a"), (2, "b"), (3, "c")] {
    assert!(manager.add_visit(1, id, url, format!("text {id}")).unwrap());
    setup.time_provider.advance(1.seconds());
  }

  let visits = manager.get_recent_visits(1).unwrap();
  assert_eq!(
    vec!["c", "b", "a"],
    visits.iter().map(|v| v.url.as_str()).collect::<Vec<_>>()
  );
  assert_eq!(TEST_EPOCH + 2.seconds(), visits[0].timestamp);
  assert_eq!(TEST_EPOCH, visits[2].timestamp);
  assert_eq!("text 3", visits[0].text);
}

#[test]
fn eviction_keeps_most_recent() {
  let setup = Setup::new();
  let manager = setup.open_with_capacity(2);

  for id in 1 ..= 3 {
    manager.add_visit(9, id, "https://example.com", "").unwrap();
  }
  assert_eq!(vec![3, 2], ids(&manager, 9));
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(10)]
fn capacity_is_never_exceeded(#[case] capacity: u32) {
  let setup = Setup::new();
  let manager = setup.open(StoreConfig {
    sync_mode: SyncMode::Deferred,
    ..StoreConfig::with_capacity(capacity)
  });

  for id in 0 .. 25 {
    manager.add_visit(1, id % 7, "u", "t").unwrap();
    let len = manager.get_recent_visits(1).unwrap().len();
    assert!(len <= capacity as usize, "{len} > {capacity}");
  }
}

#[test]
fn users_are_isolated() {
  let setup = Setup::new();
  let manager = setup.open_with_capacity(2);

  manager.add_visit(1, 1, "one", "").unwrap();
  for id in 10 .. 20 {
    manager.add_visit(2, id, "two", "").unwrap();
  }
  manager.delete_visits(2, &[1]).unwrap();
  manager.clear_user(3).unwrap();

  assert_eq!(vec![1], ids(&manager, 1));
  assert_eq!(vec![19, 18], ids(&manager, 2));
  assert!(ids(&manager, 3).is_empty());
  assert_eq!(vec![1, 2], manager.user_ids().unwrap());
}

#[test]
fn unknown_user_has_no_visits() {
  let setup = Setup::new();
  let manager = setup.open_with_capacity(2);
  assert!(manager.get_recent_visits(12345).unwrap().is_empty());
  assert!(manager.delete_visits(12345, &[1, 2]).unwrap());
  assert!(manager.delete_visits(12345, &[]).unwrap());
}

#[test]
fn clear_then_add() {
  let setup = Setup::new();
  let manager = setup.open_with_capacity(3);
  manager.add_visit(1, 1, "a", "").unwrap();
  manager.add_visit(1, 2, "b", "").unwrap();

  manager.clear_user(1).unwrap();
  assert!(ids(&manager, 1).is_empty());

  manager.add_visit(1, 1, "again", "").unwrap();
  assert_eq!(vec![1], ids(&manager, 1));
  assert_eq!("again", manager.get_recent_visits(1).unwrap()[0].url);
}

#[test]
fn persistence_across_reopen() {
  let setup = Setup::new();
  let before = {
    let manager = setup.open_with_capacity(4);
    for id in 1 ..= 6 {
      manager
        .add_visit(id % 2, id, format!("https://example.com/{id}"), "")
        .unwrap();
      setup.time_provider.advance(10.milliseconds());
    }
    let before = (
      manager.get_recent_visits(0).unwrap(),
      manager.get_recent_visits(1).unwrap(),
    );
    manager.close().unwrap();
    before
  };

  let manager = setup.open_with_capacity(4);
  assert_eq!(before.0, manager.get_recent_visits(0).unwrap());
  assert_eq!(before.1, manager.get_recent_visits(1).unwrap());
  assert_eq!(DataLoss::None, manager.data_loss());
}

#[test]
fn second_manager_is_rejected() {
  let setup = Setup::new();
  let first = setup.open_with_capacity(4);

  assert_matches!(
    VisitManager::open(setup.path.path(), 4),
    Err(Error::AlreadyOpen(_))
  );

  first.close().unwrap();
  let second = VisitManager::open(setup.path.path(), 4).unwrap();
  assert_eq!(4, second.capacity());
  assert_eq!(setup.path.path(), second.path());
}

#[test]
fn dropping_releases_the_store() {
  let setup = Setup::new();
  {
    let manager = setup.open_with_capacity(4);
    manager.add_visit(1, 1, "a", "").unwrap();
  }
  let manager = setup.open_with_capacity(4);
  assert_eq!(vec![1], ids(&manager, 1));
}

#[test]
fn close_is_idempotent_and_final() {
  let setup = Setup::new();
  let manager = setup.open_with_capacity(4);
  manager.add_visit(1, 1, "a", "").unwrap();

  manager.close().unwrap();
  manager.close().unwrap();
  assert!(manager.is_closed());

  assert_matches!(manager.add_visit(1, 2, "b", ""), Err(Error::StoreClosed));
  assert_matches!(manager.get_recent_visits(1), Err(Error::StoreClosed));
  assert_matches!(manager.delete_visits(1, &[1]), Err(Error::StoreClosed));
  assert_matches!(manager.clear_user(1), Err(Error::StoreClosed));
  assert_matches!(manager.flush(), Err(Error::StoreClosed));
  assert_matches!(manager.user_ids(), Err(Error::StoreClosed));
  assert_eq!(4, manager.capacity());
}

#[test]
fn invalid_capacity() {
  let setup = Setup::new();
  assert_matches!(
    VisitManager::open(setup.path.path(), 0),
    Err(Error::InvalidArgument(_))
  );
}

#[test]
fn corrupt_missing_and_foreign_files() {
  let missing = Setup::new();
  let manager = missing.open_with_capacity(4);
  assert!(manager.user_ids().unwrap().is_empty());
  drop(manager);

  let foreign = Setup::new();
  std::fs::write(foreign.path.path(), b"<html></html>").unwrap();
  assert_matches!(
    VisitManager::open(foreign.path.path(), 4),
    Err(Error::StoreOpen { .. })
  );

  let corrupt = Setup::new();
  {
    let manager = corrupt.open_with_capacity(4);
    manager.add_visit(1, 1, "a", "").unwrap();
  }
  let mut bytes = std::fs::read(corrupt.path.path()).unwrap();
  bytes.truncate(bytes.len() - 1);
  std::fs::write(corrupt.path.path(), &bytes).unwrap();
  assert_matches!(
    VisitManager::open(corrupt.path.path(), 4),
    Err(Error::StoreOpen { .. })
  );
}

#[test]
fn oversized_visit_is_rejected() {
  let setup = Setup::new();
  let manager = setup.open(StoreConfig {
    max_field_len: 4,
    ..StoreConfig::with_capacity(4)
  });

  assert!(!manager.add_visit(1, 1, "https://example.com", "").unwrap());
  assert!(manager.add_visit(1, 2, "ok", "fine").unwrap());
  assert_eq!(vec![2], ids(&manager, 1));
}

#[test]
fn deferred_mode_persists_on_close() {
  let setup = Setup::new();
  {
    let manager = setup.open(StoreConfig {
      sync_mode: SyncMode::Deferred,
      ..StoreConfig::with_capacity(4)
    });
    manager.add_visit(1, 1, "a", "").unwrap();
    manager.add_visit(1, 2, "b", "").unwrap();
    manager.delete_visits(1, &[1]).unwrap();
    manager.close().unwrap();
  }

  let manager = setup.open_with_capacity(4);
  assert_eq!(vec![2], ids(&manager, 1));
}

#[test]
fn capacity_shrinks_on_reopen() {
  let setup = Setup::new();
  {
    let manager = setup.open_with_capacity(5);
    for id in 1 ..= 5 {
      manager.add_visit(1, id, "u", "").unwrap();
    }
  }

  let manager = setup.open_with_capacity(3);
  assert_eq!(3, manager.capacity());
  assert_eq!(vec![5, 4, 3], ids(&manager, 1));
}

#[test]
fn scoped_manager_closes() {
  let path = TempStorePath::default();

  let visits = with_manager(path.path(), 3, |manager| {
    manager.add_visit(4, 1, "a", "")?;
    manager.get_recent_visits(4)
  })
  .unwrap();
  assert_eq!(1, visits.len());

  let failed: Result<(), Error> = with_manager(path.path(), 3, |manager| {
    manager.add_visit(4, 2, "b", "")?;
    Err(Error::InvalidArgument("stop".to_string()))
  });
  assert_matches!(failed, Err(Error::InvalidArgument(_)));

  // Both scopes released the lock and persisted their visits.
  let manager = VisitManager::open(path.path(), 3).unwrap();
  assert_eq!(vec![2, 1], ids(&manager, 4));
}

#[rstest]
#[case(SyncMode::EveryMutation)]
#[case(SyncMode::Deferred)]
fn concurrent_callers(#[case] sync_mode: SyncMode) {
  const THREADS: u32 = 4;
  const VISITS_PER_THREAD: u32 = 25;

  let setup = Setup::new();
  let manager = Arc::new(setup.open(StoreConfig {
    sync_mode,
    ..StoreConfig::with_capacity(8)
  }));

  let handles: Vec<_> = (0 .. THREADS)
    .map(|thread| {
      let manager = manager.clone();
      std::thread::spawn(move || {
        for i in 0 .. VISITS_PER_THREAD {
          let visit_id = thread * VISITS_PER_THREAD + i;
          assert!(manager.add_visit(0, visit_id, "shared", "").unwrap());
          manager.add_visit(thread + 1, i, "own", "").unwrap();
          if i % 5 == 0 {
            manager.delete_visits(thread + 1, &[i]).unwrap();
          }
          assert!(manager.get_recent_visits(0).unwrap().len() <= 8);
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  let shared = manager.get_recent_visits(0).unwrap();
  assert_eq!(8, shared.len());
  let expected_own: Vec<u32> = (0 .. VISITS_PER_THREAD)
    .rev()
    .filter(|i| i % 5 != 0)
    .take(8)
    .collect();
  let mut before_close = vec![shared];
  for thread in 0 .. THREADS {
    assert_eq!(expected_own, ids(&manager, thread + 1));
    before_close.push(manager.get_recent_visits(thread + 1).unwrap());
  }

  manager.close().unwrap();
  let reopened = setup.open_with_capacity(8);
  let after_reopen: Vec<_> = (0 ..= THREADS)
    .map(|user_id| reopened.get_recent_visits(user_id).unwrap())
    .collect();
  assert_eq!(before_close, after_reopen);
}
