// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./manager_test.rs"]
mod tests;

use crate::config::StoreConfig;
use crate::store::{DataLoss, Store};
use crate::{Error, Result, Visit};
use parking_lot::RwLock;
use rv_log::warn_every;
use rv_time::{SystemTimeProvider, TimeProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::ext::NumericalDuration;

//
// VisitManager
//

/// The public handle over a visit store, safe to share between threads.
///
/// Reads run concurrently under a shared lock. Mutations, including the disk write that makes
/// them durable, run under the exclusive lock, so a reader sees each mutation either fully
/// applied or not at all. Visit timestamps come from the manager's `TimeProvider`.
pub struct VisitManager {
  store: RwLock<Option<Store>>,
  path: PathBuf,
  capacity: u32,
  data_loss: DataLoss,
  time_provider: Arc<dyn TimeProvider>,
}

impl VisitManager {
  /// Open the store at `path` keeping at most `capacity` visits per user, stamping visits with
  /// the system clock.
  ///
  /// # Errors
  /// See `Store::open`.
  pub fn open(path: impl AsRef<Path>, capacity: u32) -> Result<Self> {
    Self::open_with_config(
      path,
      StoreConfig::with_capacity(capacity),
      Arc::new(SystemTimeProvider),
    )
  }

  /// # Errors
  /// See `Store::open`.
  pub fn open_with_config(
    path: impl AsRef<Path>,
    config: StoreConfig,
    time_provider: Arc<dyn TimeProvider>,
  ) -> Result<Self> {
    let store = Store::open(path, config)?;
    Ok(Self {
      path: store.path().to_path_buf(),
      capacity: store.capacity(),
      data_loss: store.data_loss(),
      store: RwLock::new(Some(store)),
      time_provider,
    })
  }

  /// Record a visit for `user_id` timestamped now. Returns `Ok(false)` if the url or text is
  /// over the configured size limit.
  ///
  /// # Errors
  /// `StoreClosed`, `CorruptRecord` if the user's stored visits are unreadable, or `Io` if the
  /// visit could not be persisted.
  pub fn add_visit(
    &self,
    user_id: u32,
    visit_id: u32,
    url: impl Into<String>,
    text: impl Into<String>,
  ) -> Result<bool> {
    let mut guard = self.store.write();
    let store = guard.as_mut().ok_or(Error::StoreClosed)?;
    // Stamped under the lock so recency and timestamps agree.
    let visit = Visit::new(visit_id, url, text, self.time_provider.now());
    store.add_visit(user_id, visit)
  }

  /// The visits of `user_id`, most recent first. Unknown users have none.
  ///
  /// # Errors
  /// `StoreClosed`, or `CorruptRecord` if the user's stored visits are unreadable.
  pub fn get_recent_visits(&self, user_id: u32) -> Result<Vec<Visit>> {
    self
      .store
      .read()
      .as_ref()
      .ok_or(Error::StoreClosed)?
      .get_recent_visits(user_id)
  }

  /// # Errors
  /// `StoreClosed`, `CorruptRecord`, or `Io`.
  pub fn delete_visits(&self, user_id: u32, visit_ids: &[u32]) -> Result<bool> {
    self
      .store
      .write()
      .as_mut()
      .ok_or(Error::StoreClosed)?
      .delete_visits(user_id, visit_ids)
  }

  /// # Errors
  /// `StoreClosed` or `Io`.
  pub fn clear_user(&self, user_id: u32) -> Result<()> {
    self
      .store
      .write()
      .as_mut()
      .ok_or(Error::StoreClosed)?
      .clear_user(user_id)
  }

  /// # Errors
  /// `StoreClosed` or `Io`.
  pub fn flush(&self) -> Result<()> {
    self
      .store
      .write()
      .as_mut()
      .ok_or(Error::StoreClosed)?
      .flush()
  }

  /// Flush and release the store. Later calls fail with `StoreClosed`. Closing twice is fine.
  /// If the final flush fails the manager stays open.
  ///
  /// # Errors
  /// `Io` if the final flush or unlock fails.
  pub fn close(&self) -> Result<()> {
    let mut guard = self.store.write();
    if let Some(store) = guard.as_mut() {
      store.close()?;
      *guard = None;
    }
    Ok(())
  }

  #[must_use]
  pub fn is_closed(&self) -> bool {
    self.store.read().is_none()
  }

  #[must_use]
  pub fn path(&self) -> &Path {
    &self.path
  }

  #[must_use]
  pub const fn capacity(&self) -> u32 {
    self.capacity
  }

  /// What opening the store had to give up. Fixed for the life of the manager.
  #[must_use]
  pub const fn data_loss(&self) -> DataLoss {
    self.data_loss
  }

  /// # Errors
  /// `StoreClosed`.
  pub fn user_ids(&self) -> Result<Vec<u32>> {
    Ok(
      self
        .store
        .read()
        .as_ref()
        .ok_or(Error::StoreClosed)?
        .user_ids(),
    )
  }
}

impl std::fmt::Debug for VisitManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VisitManager")
      .field("path", &self.path)
      .field("capacity", &self.capacity)
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}

impl Drop for VisitManager {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      warn_every!(
        15.seconds(),
        "failed to close visit manager for {}: {}",
        self.path.display(),
        e
      );
    }
  }
}

/// Open a manager, run `f` with it and close it again, also when `f` fails. An error from `f`
/// takes precedence over an error from closing.
///
/// # Errors
/// Any error from opening, from `f`, or from the final close.
pub fn with_manager<T>(
  path: impl AsRef<Path>,
  capacity: u32,
  f: impl FnOnce(&VisitManager) -> Result<T>,
) -> Result<T> {
  let manager = VisitManager::open(path, capacity)?;
  let result = f(&manager);
  let closed = manager.close();
  let value = result?;
  closed?;
  Ok(value)
}
