// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./store_test.rs"]
mod tests;

use crate::config::{StoreConfig, SyncMode};
use crate::image::{self, LedgerSlot};
use crate::ledger::Ledger;
use crate::lock::StoreLock;
use crate::{Error, Result, Visit};
use rv_log::warn_every;
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use time::ext::NumericalDuration;

/// What `Store::open` had to give up while loading an existing image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLoss {
  None,
  /// One or more users' visits could not be read. They are kept on disk untouched and report
  /// `CorruptRecord` until cleared.
  Partial,
}

//
// Store
//

/// The durable map from user id to that user's bounded visit ledger.
///
/// A `Store` owns its file for its whole lifetime: `open` takes an exclusive lock next to the
/// file and `close` (or drop) releases it. Every mutation is applied to a single ledger and then
/// committed according to the configured `SyncMode`. With `SyncMode::EveryMutation` a mutation
/// whose write fails is rolled back, so memory and disk never disagree.
///
/// The store image is always rewritten whole, through a temporary sibling file that is renamed
/// over the store path, so a crash leaves either the previous or the next image in place.
#[derive(Debug)]
pub struct Store {
  path: PathBuf,
  config: StoreConfig,
  ledgers: BTreeMap<u32, LedgerSlot>,
  lock: Option<StoreLock>,
  dirty: bool,
  data_loss: DataLoss,
}

impl Store {
  /// Open the store at `path`, creating an empty one if nothing exists there yet.
  ///
  /// Ledgers loaded from an image written with a larger capacity are trimmed to
  /// `config.capacity`, dropping their least recent visits, and the trimmed image is written
  /// back immediately.
  ///
  /// # Errors
  /// - `InvalidArgument` if the configuration is invalid.
  /// - `AlreadyOpen` if another live store holds `path`.
  /// - `StoreOpen` if `path` exists but is unreadable, foreign, of an unsupported version, or
  ///   structurally corrupt. The file is left untouched. Also when the parent directory or the
  ///   lock file cannot be created.
  /// - `Io` if a fresh or trimmed image cannot be written.
  pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
    config.validate()?;
    let path = path.as_ref().to_path_buf();

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(|e| Error::StoreOpen {
        path: path.clone(),
        reason: format!("cannot create directory {}: {e}", parent.display()),
      })?;
    }
    let lock = StoreLock::try_acquire(&path)?;

    let (ledgers, needs_write, data_loss) = match std::fs::read(&path) {
      Ok(bytes) => {
        let image = image::decode(&bytes, config.capacity).map_err(|e| Error::StoreOpen {
          path: path.clone(),
          reason: e.to_string(),
        })?;

        let quarantined: Vec<u32> = image.quarantined_users().collect();
        let data_loss = if quarantined.is_empty() {
          DataLoss::None
        } else {
          warn_every!(
            15.seconds(),
            "store {} has unreadable visits for users {:?}",
            path.display(),
            quarantined
          );
          DataLoss::Partial
        };

        if image.evicted > 0 {
          log::info!(
            "evicted {} visits from {} to fit capacity {} (was {})",
            image.evicted,
            path.display(),
            config.capacity,
            image.stored_capacity
          );
        }
        let needs_write = image.evicted > 0 || image.stored_capacity != config.capacity;
        (image.ledgers, needs_write, data_loss)
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::debug!("creating new store at {}", path.display());
        (BTreeMap::new(), true, DataLoss::None)
      },
      Err(e) => {
        return Err(Error::StoreOpen {
          path,
          reason: format!("unreadable: {e}"),
        });
      },
    };

    let mut store = Self {
      path,
      config,
      ledgers,
      lock: Some(lock),
      dirty: needs_write,
      data_loss,
    };
    if store.dirty {
      store.write_image()?;
    }

    log::debug!(
      "opened store {} with {} users, capacity {}",
      store.path.display(),
      store.ledgers.len(),
      store.config.capacity
    );
    Ok(store)
  }

  /// Record `visit` as the most recent visit of `user_id`, evicting the least recent visit if
  /// the user is at capacity. A previous visit with the same id is replaced and moves to the
  /// front.
  ///
  /// Returns `Ok(false)` without touching the store if the url or text exceeds the configured
  /// field limit.
  ///
  /// # Errors
  /// `StoreClosed`, `CorruptRecord` for a quarantined user, or `Io` if the change could not be
  /// persisted (in which case it is not applied).
  pub fn add_visit(&mut self, user_id: u32, visit: Visit) -> Result<bool> {
    self.ensure_open()?;

    let max = self.config.max_field_len;
    if visit.url.len() > max || visit.text.len() > max {
      log::debug!(
        "rejecting visit {} for user {user_id}: url {} bytes, text {} bytes, limit {max}",
        visit.visit_id,
        visit.url.len(),
        visit.text.len()
      );
      return Ok(false);
    }

    let capacity = self.config.capacity;
    self.mutate(user_id, |slot| {
      let ledger = slot
        .get_or_insert_with(|| LedgerSlot::Loaded(Ledger::new(capacity)))
        .ledger_mut(user_id)?;
      let evicted = ledger.insert(visit);
      if evicted > 0 {
        log::trace!("user {user_id} evicted {evicted} visits");
      }
      Ok(true)
    })
  }

  /// A copy of the visits of `user_id`, most recent first. Unknown users have no visits.
  ///
  /// # Errors
  /// `StoreClosed`, or `CorruptRecord` for a quarantined user.
  pub fn get_recent_visits(&self, user_id: u32) -> Result<Vec<Visit>> {
    self.ensure_open()?;
    match self.ledgers.get(&user_id) {
      Some(slot) => Ok(slot.ledger(user_id)?.get_recent()),
      None => Ok(Vec::new()),
    }
  }

  /// Remove the given visit ids from `user_id`. Ids that are not present, and users that do not
  /// exist, are ignored. Always returns `Ok(true)` when the store is usable.
  ///
  /// # Errors
  /// `StoreClosed`, `CorruptRecord` for a quarantined user, or `Io` if the change could not be
  /// persisted.
  pub fn delete_visits(&mut self, user_id: u32, visit_ids: &[u32]) -> Result<bool> {
    self.ensure_open()?;
    if visit_ids.is_empty() {
      return Ok(true);
    }

    let ids: HashSet<u32> = visit_ids.iter().copied().collect();
    self.mutate(user_id, |slot| {
      if let Some(slot) = slot {
        let removed = slot.ledger_mut(user_id)?.delete(&ids);
        log::trace!("user {user_id} removed {removed} visits");
      }
      Ok(true)
    })
  }

  /// Drop every visit of `user_id`. The user stays known with an empty ledger. A quarantined
  /// user is reset to an empty ledger, discarding the unreadable data.
  ///
  /// # Errors
  /// `StoreClosed`, or `Io` if the change could not be persisted.
  pub fn clear_user(&mut self, user_id: u32) -> Result<()> {
    let capacity = self.config.capacity;
    self.mutate(user_id, |slot| {
      match slot {
        Some(LedgerSlot::Loaded(ledger)) => ledger.clear(),
        Some(LedgerSlot::Quarantined(quarantined)) => {
          log::info!(
            "discarding unreadable visits for user {user_id}: {}",
            quarantined.reason()
          );
          *slot = Some(LedgerSlot::Loaded(Ledger::new(capacity)));
        },
        None => {},
      }
      Ok(())
    })
  }

  /// Write any deferred mutations to disk. A no-op when nothing is pending.
  ///
  /// # Errors
  /// `StoreClosed`, or `Io` if the image could not be written.
  pub fn flush(&mut self) -> Result<()> {
    self.ensure_open()?;
    if self.dirty {
      self.write_image()?;
    }
    Ok(())
  }

  /// Flush pending mutations and release the store's lock. Calling `close` on a closed store
  /// does nothing. If the final flush fails the store stays open so the caller can retry.
  ///
  /// # Errors
  /// `Io` if the final flush or unlock fails.
  pub fn close(&mut self) -> Result<()> {
    if self.lock.is_none() {
      return Ok(());
    }
    if self.dirty {
      self.write_image()?;
    }

    self.ledgers.clear();
    if let Some(lock) = self.lock.take() {
      lock.release()?;
    }
    log::debug!("closed store {}", self.path.display());
    Ok(())
  }

  #[must_use]
  pub fn is_closed(&self) -> bool {
    self.lock.is_none()
  }

  #[must_use]
  pub fn path(&self) -> &Path {
    &self.path
  }

  #[must_use]
  pub const fn capacity(&self) -> u32 {
    self.config.capacity
  }

  #[must_use]
  pub const fn data_loss(&self) -> DataLoss {
    self.data_loss
  }

  /// Every known user id in ascending order, including users with empty or quarantined ledgers.
  #[must_use]
  pub fn user_ids(&self) -> Vec<u32> {
    self.ledgers.keys().copied().collect()
  }

  fn ensure_open(&self) -> Result<()> {
    if self.lock.is_none() {
      return Err(Error::StoreClosed);
    }
    Ok(())
  }

  // Applies `f` to a working copy of one user's slot and commits it. Nothing changes if `f`
  // fails, and an unchanged slot is not persisted.
  fn mutate<R>(
    &mut self,
    user_id: u32,
    f: impl FnOnce(&mut Option<LedgerSlot>) -> Result<R>,
  ) -> Result<R> {
    self.ensure_open()?;

    let previous = self.ledgers.get(&user_id).cloned();
    let mut slot = previous.clone();
    let result = f(&mut slot)?;
    if slot == previous {
      return Ok(result);
    }

    self.set_slot(user_id, slot);
    let was_dirty = self.dirty;
    self.dirty = true;
    if self.config.sync_mode == SyncMode::EveryMutation
      && let Err(e) = self.write_image()
    {
      self.set_slot(user_id, previous);
      self.dirty = was_dirty;
      return Err(e);
    }
    Ok(result)
  }

  fn set_slot(&mut self, user_id: u32, slot: Option<LedgerSlot>) {
    match slot {
      Some(slot) => {
        self.ledgers.insert(user_id, slot);
      },
      None => {
        self.ledgers.remove(&user_id);
      },
    }
  }

  fn write_image(&mut self) -> Result<()> {
    let bytes = image::encode(self.config.capacity, &self.ledgers)?;
    write_atomically(&self.path, &bytes)?;
    self.dirty = false;
    log::trace!("wrote {} bytes to {}", bytes.len(), self.path.display());
    Ok(())
  }
}

impl Drop for Store {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      warn_every!(
        15.seconds(),
        "failed to close store {}: {}",
        self.path.display(),
        e
      );
    }
  }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
  let mut tmp_name = OsString::from(path.as_os_str());
  tmp_name.push(".tmp");
  let tmp_path = PathBuf::from(tmp_name);

  let written = File::create(&tmp_path).and_then(|mut file| {
    file.write_all(bytes)?;
    file.sync_all()
  });
  if let Err(e) = written.and_then(|()| std::fs::rename(&tmp_path, path)) {
    let _ignored = std::fs::remove_file(&tmp_path);
    return Err(e);
  }

  sync_parent_dir(path);
  Ok(())
}

// The rename is only durable once the directory entry is synced. Not every platform allows
// opening a directory, so failures here are logged rather than returned.
fn sync_parent_dir(path: &Path) {
  let parent = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
    log::debug!("failed to sync directory {}: {e}", parent.display());
  }
}
