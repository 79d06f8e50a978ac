// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![deny(
  clippy::expect_used,
  clippy::panic,
  clippy::todo,
  clippy::unimplemented,
  clippy::unreachable,
  clippy::unwrap_used
)]

#[cfg(test)]
#[path = "./lib_test.rs"]
mod tests;

use parking_lot::Mutex;
use std::sync::Arc;
use time::OffsetDateTime;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

//
// TimestampError
//

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TimestampError {
  #[error("nanosecond component {0} is not below one second")]
  InvalidNanos(u32),
  #[error("timestamp {seconds}s+{nanos}ns is outside of the supported range")]
  OutOfRange { seconds: i64, nanos: u32 },
}

//
// TimestampParts
//

/// A UTC point in time split into whole seconds since the UNIX epoch and the sub-second
/// nanoseconds. For instants before the epoch `seconds` is floored, so `nanos` is always in
/// `0 .. 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampParts {
  pub seconds: i64,
  pub nanos: u32,
}

impl TimestampParts {
  #[must_use]
  pub const fn new(seconds: i64, nanos: u32) -> Self {
    Self { seconds, nanos }
  }

  pub fn to_offset_date_time(self) -> Result<OffsetDateTime, TimestampError> {
    if self.nanos >= NANOS_PER_SECOND {
      return Err(TimestampError::InvalidNanos(self.nanos));
    }

    let total = i128::from(self.seconds) * i128::from(NANOS_PER_SECOND) + i128::from(self.nanos);
    OffsetDateTime::from_unix_timestamp_nanos(total).map_err(|_| TimestampError::OutOfRange {
      seconds: self.seconds,
      nanos: self.nanos,
    })
  }
}

impl TryFrom<TimestampParts> for OffsetDateTime {
  type Error = TimestampError;

  fn try_from(parts: TimestampParts) -> Result<Self, Self::Error> {
    parts.to_offset_date_time()
  }
}

//
// OffsetDateTimeExt
//

pub trait OffsetDateTimeExt {
  fn to_parts(&self) -> TimestampParts;
}

impl OffsetDateTimeExt for OffsetDateTime {
  fn to_parts(&self) -> TimestampParts {
    let utc = self.to_offset(time::UtcOffset::UTC);
    TimestampParts {
      seconds: utc.unix_timestamp(),
      nanos: utc.nanosecond(),
    }
  }
}

//
// TimeProvider
//

pub trait TimeProvider: Send + Sync {
  fn now(&self) -> OffsetDateTime;
}

//
// SystemTimeProvider
//

pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
  fn now(&self) -> OffsetDateTime {
    OffsetDateTime::now_utc()
  }
}

//
// TestTimeChangeGuard
//

pub struct TestTimeChangeGuard<'a> {
  time_provider: &'a TestTimeProvider,
  original_time: OffsetDateTime,
}

impl Drop for TestTimeChangeGuard<'_> {
  fn drop(&mut self) {
    *self.time_provider.now.lock() = self.original_time;
  }
}

//
// TestTimeProvider
//

#[derive(Clone)]
pub struct TestTimeProvider {
  now: Arc<Mutex<OffsetDateTime>>,
}

impl TestTimeProvider {
  #[must_use]
  pub fn new(now: OffsetDateTime) -> Self {
    Self {
      now: Arc::new(Mutex::new(now)),
    }
  }

  pub fn advance(&self, duration: time::Duration) {
    *self.now.lock() += duration;
  }

  pub fn set_time(&self, new_time: OffsetDateTime) {
    *self.now.lock() = new_time;
  }

  #[must_use]
  pub fn temp_set_time(&self, new_time: OffsetDateTime) -> TestTimeChangeGuard<'_> {
    let mut now = self.now.lock();
    let original_time = *now;
    *now = new_time;
    TestTimeChangeGuard {
      time_provider: self,
      original_time,
    }
  }
}

impl TimeProvider for TestTimeProvider {
  fn now(&self) -> OffsetDateTime {
    *self.now.lock()
  }
}
