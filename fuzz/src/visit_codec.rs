// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::ArbitraryVisit;
use arbitrary::Arbitrary;
use rv_visits::codec;

#[derive(Arbitrary, Debug)]
pub struct VisitCodecFuzzTestCase {
  visit: ArbitraryVisit,
  raw: Vec<u8>,
}

pub struct VisitCodecFuzzTest {
  test_case: VisitCodecFuzzTestCase,
}

impl VisitCodecFuzzTest {
  #[must_use]
  pub const fn new(test_case: VisitCodecFuzzTestCase) -> Self {
    Self { test_case }
  }

  pub fn run(self) {
    let visit = self.test_case.visit.0;
    let encoded = match codec::encode(&visit) {
      Ok(encoded) => encoded,
      Err(err) => panic!("visit encoding should succeed: {err}"),
    };
    assert_eq!(codec::encoded_len(&visit), encoded.len());
    match codec::decode(&encoded) {
      Ok(decoded) => assert_eq!(visit, decoded),
      Err(err) => panic!("visit decoding should succeed: {err}"),
    }

    // Arbitrary input either fails cleanly or is a canonical encoding.
    if let Ok(decoded) = codec::decode(&self.test_case.raw) {
      match codec::encode(&decoded) {
        Ok(reencoded) => assert_eq!(self.test_case.raw, reencoded),
        Err(err) => panic!("decoded visit should encode: {err}"),
      }
    }
  }
}

#[test]
fn run_all_corpus() {
  crate::run_all_corpus("corpus/visit_codec", |input: VisitCodecFuzzTestCase| {
    VisitCodecFuzzTest::new(input).run();
  });
}
