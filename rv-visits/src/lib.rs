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

//! A durable store of each user's most recent visits.
//!
//! Every user owns a ledger holding at most `capacity` visits, most recent first. Adding past
//! capacity evicts the least recent visit. All ledgers live in a single file that is rewritten
//! atomically as the store changes. `VisitManager` is the thread safe handle most callers want.

pub mod codec;
mod config;
mod error;
pub mod image;
mod ledger;
mod lock;
mod manager;
mod store;
mod visit;

pub use config::{DEFAULT_CAPACITY, DEFAULT_MAX_FIELD_LEN, StoreConfig, SyncMode};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use manager::{VisitManager, with_manager};
pub use store::{DataLoss, Store};
pub use visit::Visit;

#[cfg(test)]
#[ctor::ctor]
fn test_global_init() {
  rv_test_helpers::test_global_init();
}
