// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::ArbitraryVisit;
use arbitrary::Arbitrary;
use rv_visits::Ledger;
use rv_visits::image::{self, DecodedImage, LedgerSlot};
use std::collections::BTreeMap;

#[derive(Arbitrary, Debug)]
struct CorruptByte {
  offset: u32,
  new_byte: u8,
}

#[derive(Arbitrary, Debug)]
pub struct StoreImageFuzzTestCase {
  capacity: u8,
  ledgers: Vec<(u32, Vec<ArbitraryVisit>)>,
  corrupt_byte: Option<CorruptByte>,
  raw: Vec<u8>,
}

pub struct StoreImageFuzzTest {
  test_case: StoreImageFuzzTestCase,
  capacity: u32,
}

impl StoreImageFuzzTest {
  #[must_use]
  pub fn new(test_case: StoreImageFuzzTestCase) -> Self {
    let capacity = u32::from(test_case.capacity % 16) + 1;
    Self {
      test_case,
      capacity,
    }
  }

  pub fn run(self) {
    if let Ok(decoded) = image::decode(&self.test_case.raw, self.capacity) {
      check_image(&decoded, self.capacity);
    }

    let mut ledgers = BTreeMap::new();
    for (user_id, visits) in self.test_case.ledgers {
      let mut ledger = Ledger::new(self.capacity);
      for visit in visits {
        ledger.insert(visit.0);
      }
      ledgers.insert(user_id, LedgerSlot::Loaded(ledger));
    }

    let mut bytes = match image::encode(self.capacity, &ledgers) {
      Ok(bytes) => bytes,
      Err(err) => panic!("image encoding should succeed: {err}"),
    };
    match image::decode(&bytes, self.capacity) {
      Ok(decoded) => {
        assert_eq!(ledgers, decoded.ledgers);
        assert_eq!(0, decoded.evicted);
      },
      Err(err) => panic!("image decoding should succeed: {err}"),
    }

    if let Some(corrupt_byte) = self.test_case.corrupt_byte {
      let offset = corrupt_byte.offset as usize % bytes.len();
      bytes[offset] = corrupt_byte.new_byte;
      if let Ok(decoded) = image::decode(&bytes, self.capacity) {
        check_image(&decoded, self.capacity);
      }
    }
  }
}

// Any image that loads respects the capacity and survives a rewrite unchanged, including the
// raw bytes of quarantined ledgers.
fn check_image(decoded: &DecodedImage, capacity: u32) {
  for (user_id, slot) in &decoded.ledgers {
    if let LedgerSlot::Loaded(ledger) = slot {
      assert!(
        ledger.len() <= capacity as usize,
        "user {user_id} holds {} visits",
        ledger.len()
      );
    }
  }

  let bytes = match image::encode(capacity, &decoded.ledgers) {
    Ok(bytes) => bytes,
    Err(err) => panic!("loaded image should encode: {err}"),
  };
  match image::decode(&bytes, capacity) {
    Ok(reloaded) => {
      assert_eq!(decoded.ledgers, reloaded.ledgers);
      assert_eq!(0, reloaded.evicted);
      assert_eq!(capacity, reloaded.stored_capacity);
    },
    Err(err) => panic!("rewritten image should decode: {err}"),
  }
}

#[test]
fn run_all_corpus() {
  crate::run_all_corpus("corpus/store_image", |input: StoreImageFuzzTestCase| {
    StoreImageFuzzTest::new(input).run();
  });
}
