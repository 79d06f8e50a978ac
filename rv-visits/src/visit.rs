// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use rv_time::{OffsetDateTimeExt as _, TimestampParts};
use time::OffsetDateTime;

/// A single timestamped page visit. Visits are values: the store hands out copies and replaces
/// them wholesale, never in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
  pub visit_id: u32,
  pub url: String,
  pub text: String,
  pub timestamp: OffsetDateTime,
}

impl Visit {
  #[must_use]
  pub fn new(
    visit_id: u32,
    url: impl Into<String>,
    text: impl Into<String>,
    timestamp: OffsetDateTime,
  ) -> Self {
    Self {
      visit_id,
      url: url.into(),
      text: text.into(),
      timestamp,
    }
  }

  /// The timestamp as whole seconds plus nanoseconds since the UNIX epoch, in UTC.
  #[must_use]
  pub fn timestamp_parts(&self) -> TimestampParts {
    self.timestamp.to_parts()
  }
}
