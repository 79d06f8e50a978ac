// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::{Error, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive advisory lock guarding a store path against a second live store.
///
/// The lock is taken on a `<path>.lock` sidecar rather than the store file itself because the
/// store file is replaced by rename on every rewrite, which would orphan a lock held on its
/// inode. flock semantics apply per open file description, so a second open from the same
/// process conflicts just like one from another process.
#[derive(Debug)]
pub struct StoreLock {
  file: File,
  path: PathBuf,
}

impl StoreLock {
  /// Attempt to acquire the lock for `store_path` without blocking.
  ///
  /// # Errors
  /// Returns `AlreadyOpen` if another handle holds the lock, or `StoreOpen` if the sidecar cannot
  /// be created or locked for any other reason.
  pub fn try_acquire(store_path: &Path) -> Result<Self> {
    let path = sidecar_path(store_path);

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(|e| Error::StoreOpen {
        path: store_path.to_path_buf(),
        reason: format!("cannot create lock file {}: {e}", path.display()),
      })?;

    match file.try_lock_exclusive() {
      Ok(()) => {},
      Err(e) if is_contended(&e) => {
        log::debug!("lock {} is held elsewhere", path.display());
        return Err(Error::AlreadyOpen(store_path.to_path_buf()));
      },
      Err(e) => {
        return Err(Error::StoreOpen {
          path: store_path.to_path_buf(),
          reason: format!("cannot lock {}: {e}", path.display()),
        });
      },
    }

    Ok(Self { file, path })
  }

  /// Release the lock explicitly. Dropping the lock has the same effect but cannot report errors.
  ///
  /// # Errors
  /// Returns `Io` if the unlock call fails.
  pub fn release(self) -> Result<()> {
    log::trace!("releasing {}", self.path.display());
    FileExt::unlock(&self.file)?;
    Ok(())
  }
}

fn is_contended(e: &std::io::Error) -> bool {
  e.kind() == std::io::ErrorKind::WouldBlock
    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn sidecar_path(store_path: &Path) -> PathBuf {
  let mut name = OsString::from(store_path.as_os_str());
  name.push(".lock");
  PathBuf::from(name)
}
