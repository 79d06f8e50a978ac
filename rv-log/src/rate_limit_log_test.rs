// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::WarnTracker;
use crate::warn_every;
use time::ext::NumericalDuration;

fn test_warn() {
  warn_every!(1.seconds(), "{}", "function");
}

#[tokio::test(start_paused = true)]
async fn rate_limit_log() {
  // Different call sites are tracked independently.
  warn_every!(1.seconds(), "{}", "hello");
  warn_every!(1.seconds(), "{}", "world");

  test_warn();
  test_warn();

  tokio::time::sleep(std::time::Duration::from_millis(500)).await;
  test_warn();

  tokio::time::sleep(std::time::Duration::from_millis(501)).await;
  test_warn();
}

#[tokio::test(start_paused = true)]
async fn tracker_window() {
  let tracker = WarnTracker::default();
  assert!(tracker.should_warn(1.seconds()));
  assert!(!tracker.should_warn(1.seconds()));

  tokio::time::sleep(std::time::Duration::from_millis(999)).await;
  assert!(!tracker.should_warn(1.seconds()));

  tokio::time::sleep(std::time::Duration::from_millis(2)).await;
  assert!(tracker.should_warn(1.seconds()));
}
