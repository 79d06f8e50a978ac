// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::{Error, Result};

/// Default number of visits retained per user.
pub const DEFAULT_CAPACITY: u32 = 10;

/// Default upper bound for the url and text of a single visit.
pub const DEFAULT_MAX_FIELD_LEN: usize = 1024 * 1024;

/// Controls when mutations reach the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
  /// The store image is rewritten and synced before every mutating call returns.
  #[default]
  EveryMutation,
  /// Mutations only mark the store dirty. The image is written on `flush()` and `close()`.
  Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
  /// Maximum number of visits kept for each user. Shared by all users of the store.
  pub capacity: u32,

  pub sync_mode: SyncMode,

  /// Visits whose url or text is longer than this (in bytes) are rejected by `add_visit`.
  pub max_field_len: usize,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      sync_mode: SyncMode::default(),
      max_field_len: DEFAULT_MAX_FIELD_LEN,
    }
  }
}

impl StoreConfig {
  #[must_use]
  pub fn with_capacity(capacity: u32) -> Self {
    Self {
      capacity,
      ..Default::default()
    }
  }

  /// # Errors
  /// Returns `InvalidArgument` for a zero capacity or a field limit that cannot be encoded.
  pub fn validate(&self) -> Result<()> {
    if self.capacity == 0 {
      return Err(Error::InvalidArgument(
        "capacity must be positive".to_string(),
      ));
    }
    if self.max_field_len == 0 || u32::try_from(self.max_field_len).is_err() {
      return Err(Error::InvalidArgument(format!(
        "max_field_len must be between 1 and {}, got {}",
        u32::MAX,
        self.max_field_len
      )));
    }
    Ok(())
  }
}
