// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  // The path exists but does not hold a usable store image, or it could not be read.
  #[error("failed to open store '{}': {reason}", .path.display())]
  StoreOpen { path: PathBuf, reason: String },
  #[error("store '{}' is already open", .0.display())]
  AlreadyOpen(PathBuf),
  #[error("corrupt record: {0}")]
  CorruptRecord(String),
  #[error("invalid argument: {0}")]
  InvalidArgument(String),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("store is closed")]
  StoreClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
