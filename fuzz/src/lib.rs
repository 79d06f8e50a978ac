// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use arbitrary::{Arbitrary, Unstructured};
use rv_visits::Visit;
use std::io::Read;
use time::OffsetDateTime;

pub mod store_image;
pub mod visit_codec;
pub mod visit_store;

#[cfg(test)]
#[ctor::ctor]
fn test_global_init() {
  rv_test_helpers::test_global_init();
}

// Years 1 through 9999, the range every `time` build supports.
const MIN_SECONDS: i64 = -62_135_596_800;
const MAX_SECONDS: i64 = 253_402_300_799;

// Wrapper for Visit to implement Arbitrary
#[derive(Debug, Clone)]
pub struct ArbitraryVisit(pub Visit);

impl<'a> Arbitrary<'a> for ArbitraryVisit {
  fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
    let seconds = u.int_in_range(MIN_SECONDS ..= MAX_SECONDS)?;
    let nanos = u.int_in_range(0 ..= 999_999_999_i128)?;
    let timestamp =
      OffsetDateTime::from_unix_timestamp_nanos(i128::from(seconds) * 1_000_000_000 + nanos)
        .map_err(|_| arbitrary::Error::IncorrectFormat)?;
    Ok(Self(Visit::new(
      u.arbitrary()?,
      String::arbitrary(u)?,
      String::arbitrary(u)?,
      timestamp,
    )))
  }
}

pub fn run_all_corpus<T: for<'a> Arbitrary<'a>>(corpus_path: &str, fuzzer: impl Fn(T)) {
  let Ok(entries) = std::fs::read_dir(corpus_path) else {
    log::info!("no corpus at {corpus_path}");
    return;
  };
  for path in entries {
    let path = path.unwrap().path();
    let mut file = std::fs::File::open(path.clone()).unwrap();
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer).unwrap();
    log::info!("running corpus file: {}", path.display());
    let corpus = T::arbitrary(&mut Unstructured::new(&buffer)).unwrap();
    fuzzer(corpus);
  }
}
