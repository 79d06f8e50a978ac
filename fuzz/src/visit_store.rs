// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use arbitrary::Arbitrary;
use rv_time::{TestTimeProvider, TimeProvider as _};
use rv_visits::{StoreConfig, SyncMode, Visit, VisitManager};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use time::ext::NumericalDuration;
use time::macros::datetime;

const USERS: u8 = 4;
const VISIT_IDS: u8 = 8;
const MAX_FIELD_LEN: usize = 16;

#[derive(Arbitrary, Debug)]
enum Operation {
  Add {
    user: u8,
    visit_id: u8,
    url_len: u8,
    text: u8,
  },
  Delete {
    user: u8,
    visit_ids: Vec<u8>,
  },
  Clear {
    user: u8,
  },
  Get {
    user: u8,
  },
  AdvanceTime {
    millis: u16,
  },
  Flush,
  // Close and reopen, optionally with a different capacity and sync mode.
  Reopen {
    capacity: Option<u8>,
    deferred: bool,
  },
}

#[derive(Arbitrary, Debug)]
pub struct VisitStoreFuzzTestCase {
  capacity: u8,
  deferred: bool,
  operations: Vec<Operation>,
}

pub struct VisitStoreFuzzTest {
  operations: Vec<Operation>,
  _temp_dir: TempDir,
  path: PathBuf,
  time_provider: Arc<TestTimeProvider>,
  config: StoreConfig,
  // Expected ledgers, most recent first.
  model: BTreeMap<u32, VecDeque<Visit>>,
}

fn config(capacity: u8, deferred: bool) -> StoreConfig {
  StoreConfig {
    capacity: u32::from(capacity % 12) + 1,
    sync_mode: if deferred {
      SyncMode::Deferred
    } else {
      SyncMode::EveryMutation
    },
    max_field_len: MAX_FIELD_LEN,
  }
}

impl VisitStoreFuzzTest {
  #[must_use]
  pub fn new(test_case: VisitStoreFuzzTestCase) -> Self {
    let temp_dir = match TempDir::with_prefix("rv_fuzz") {
      Ok(temp_dir) => temp_dir,
      Err(err) => panic!("temp dir should be creatable: {err}"),
    };
    let path = temp_dir.path().join("visits.rv");

    Self {
      operations: test_case.operations,
      _temp_dir: temp_dir,
      path,
      time_provider: Arc::new(TestTimeProvider::new(datetime!(2024-01-01 00:00:00 UTC))),
      config: config(test_case.capacity, test_case.deferred),
      model: BTreeMap::new(),
    }
  }

  fn open(&self) -> VisitManager {
    match VisitManager::open_with_config(
      &self.path,
      self.config.clone(),
      self.time_provider.clone(),
    ) {
      Ok(manager) => manager,
      Err(err) => panic!("store should open: {err}"),
    }
  }

  pub fn run(mut self) {
    let mut manager = self.open();

    for operation in std::mem::take(&mut self.operations) {
      log::trace!("operation: {operation:?}");
      match operation {
        Operation::Add {
          user,
          visit_id,
          url_len,
          text,
        } => {
          let user_id = u32::from(user % USERS);
          let visit = Visit::new(
            u32::from(visit_id % VISIT_IDS),
            "u".repeat(usize::from(url_len % 24)),
            text.to_string(),
            self.time_provider.now(),
          );
          let accepted = manager
            .add_visit(user_id, visit.visit_id, visit.url.as_str(), visit.text.as_str())
            .unwrap();
          assert_eq!(visit.url.len() <= MAX_FIELD_LEN, accepted);
          if accepted {
            self.model_add(user_id, visit);
          }
        },
        Operation::Delete { user, visit_ids } => {
          let user_id = u32::from(user % USERS);
          let visit_ids: Vec<u32> = visit_ids
            .into_iter()
            .map(|id| u32::from(id % VISIT_IDS))
            .collect();
          assert!(manager.delete_visits(user_id, &visit_ids).unwrap());
          if let Some(ledger) = self.model.get_mut(&user_id) {
            ledger.retain(|visit| !visit_ids.contains(&visit.visit_id));
          }
        },
        Operation::Clear { user } => {
          let user_id = u32::from(user % USERS);
          manager.clear_user(user_id).unwrap();
          if let Some(ledger) = self.model.get_mut(&user_id) {
            ledger.clear();
          }
        },
        Operation::Get { user } => {
          let user_id = u32::from(user % USERS);
          self.check_user(&manager, user_id);
        },
        Operation::AdvanceTime { millis } => {
          self.time_provider.advance(i64::from(millis).milliseconds());
        },
        Operation::Flush => manager.flush().unwrap(),
        Operation::Reopen { capacity, deferred } => {
          manager.close().unwrap();
          if let Some(capacity) = capacity {
            self.config = config(capacity, deferred);
            let capacity = self.config.capacity as usize;
            for ledger in self.model.values_mut() {
              ledger.truncate(capacity);
            }
          }
          manager = self.open();
          self.check_all(&manager);
        },
      }
    }

    self.check_all(&manager);
    manager.close().unwrap();
    let manager = self.open();
    self.check_all(&manager);
  }

  fn model_add(&mut self, user_id: u32, visit: Visit) {
    let ledger = self.model.entry(user_id).or_default();
    ledger.retain(|existing| existing.visit_id != visit.visit_id);
    ledger.push_front(visit);
    ledger.truncate(self.config.capacity as usize);
  }

  fn check_user(&self, manager: &VisitManager, user_id: u32) {
    let actual = manager.get_recent_visits(user_id).unwrap();
    assert!(actual.len() <= self.config.capacity as usize);
    let expected: Vec<Visit> = self
      .model
      .get(&user_id)
      .map(|ledger| ledger.iter().cloned().collect())
      .unwrap_or_default();
    assert_eq!(expected, actual, "visits of user {user_id}");
  }

  fn check_all(&self, manager: &VisitManager) {
    assert_eq!(
      self.model.keys().copied().collect::<Vec<_>>(),
      manager.user_ids().unwrap()
    );
    for user_id in 0 .. u32::from(USERS) {
      self.check_user(manager, user_id);
    }
  }
}

#[test]
fn run_all_corpus() {
  crate::run_all_corpus("corpus/visit_store", |input: VisitStoreFuzzTestCase| {
    VisitStoreFuzzTest::new(input).run();
  });
}

#[test]
fn seeded_operations() {
  let add = |user, visit_id, url_len| Operation::Add {
    user,
    visit_id,
    url_len,
    text: visit_id,
  };

  for deferred in [false, true] {
    VisitStoreFuzzTest::new(VisitStoreFuzzTestCase {
      capacity: 2,
      deferred,
      operations: vec![
        add(0, 1, 4),
        Operation::AdvanceTime { millis: 10 },
        add(0, 2, 5),
        add(0, 3, 6),
        add(0, 2, 7),
        add(1, 1, 20),
        add(1, 4, 0),
        Operation::Get { user: 0 },
        Operation::Delete {
          user: 0,
          visit_ids: vec![3, 11],
        },
        Operation::Delete {
          user: 2,
          visit_ids: vec![1],
        },
        Operation::Flush,
        Operation::Reopen {
          capacity: Some(4),
          deferred: !deferred,
        },
        add(2, 5, 1),
        add(2, 6, 1),
        add(2, 7, 1),
        Operation::Reopen {
          capacity: Some(0),
          deferred,
        },
        Operation::Clear { user: 2 },
        Operation::Clear { user: 3 },
        add(2, 8, 2),
        Operation::Reopen {
          capacity: None,
          deferred,
        },
        Operation::Get { user: 2 },
      ],
    })
    .run();
  }
}
