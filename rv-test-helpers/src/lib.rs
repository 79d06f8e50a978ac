// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use rv_time::TestTimeProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::datetime;

/// The instant every test clock starts at unless a test picks its own.
pub const TEST_EPOCH: OffsetDateTime = datetime!(2024-01-01 00:00:00 UTC);

pub fn test_global_init() {
  rv_log::SwapLogger::initialize();
}

#[must_use]
pub fn test_time_provider() -> Arc<TestTimeProvider> {
  Arc::new(TestTimeProvider::new(TEST_EPOCH))
}

//
// TempStorePath
//

/// A store path inside a temporary directory that is removed (with any sidecar files) on drop.
pub struct TempStorePath {
  _dir: TempDir,
  path: PathBuf,
}

impl TempStorePath {
  #[must_use]
  pub fn new(file_name: &str) -> Self {
    let dir = TempDir::with_prefix("rv_store").unwrap_or_else(|e| panic!("temp dir: {e}"));
    let path = dir.path().join(file_name);
    Self { _dir: dir, path }
  }

  #[must_use]
  pub fn path(&self) -> &std::path::Path {
    &self.path
  }
}

impl Default for TempStorePath {
  fn default() -> Self {
    Self::new("visits.rv")
  }
}
