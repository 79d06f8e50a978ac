// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

//! On-disk image of a whole store.
//!
//! ```text
//! header: [magic: "RVSTORE\0"][version: u16][flags: u16][capacity: u32][ledger_count: u32]
//! ledger: [user_id: u32][visit_count: u32][payload_len: u32][payload: bytes][crc32: u32]
//! ```
//!
//! - `payload` is `visit_count` records back to back (see `codec`), most recent first.
//! - `crc32` covers `payload` only. The ledger header is validated structurally: a bad length or
//!   a duplicated user id makes the whole image unreadable.
//! - A ledger whose payload fails its checksum or does not decode is kept as a quarantined slot.
//!   Its bytes are written back unchanged so that nothing is lost by rewriting the image.
//! - `capacity` records the capacity in effect when the image was written. It is informational;
//!   the capacity requested at open wins.

#[cfg(test)]
#[path = "./image_test.rs"]
mod tests;

use crate::ledger::Ledger;
use crate::{Error, Result, codec};
use bytes::{Buf, BufMut};
use crc32fast::Hasher;
use std::collections::BTreeMap;

pub const MAGIC: [u8; 8] = *b"RVSTORE\0";
pub const VERSION: u16 = 1;

pub const HEADER_LEN: usize = 8 + 2 + 2 + 4 + 4;
const LEDGER_HEADER_LEN: usize = 4 + 4 + 4;
const CRC_LEN: usize = 4;

//
// ImageError
//

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ImageError {
  #[error("not a visit store (bad magic)")]
  Foreign,
  #[error("unsupported store version {0}, expected {VERSION}")]
  UnsupportedVersion(u16),
  #[error("unrecoverable framing: {0}")]
  Framing(String),
}

//
// QuarantinedLedger
//

/// A ledger whose frame was intact but whose contents could not be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedLedger {
  visit_count: u32,
  payload: Vec<u8>,
  crc: u32,
  reason: String,
}

impl QuarantinedLedger {
  #[must_use]
  pub fn reason(&self) -> &str {
    &self.reason
  }
}

//
// LedgerSlot
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerSlot {
  Loaded(Ledger),
  Quarantined(QuarantinedLedger),
}

impl LedgerSlot {
  /// The loaded ledger, or `CorruptRecord` if this user's data was quarantined at open.
  pub fn ledger(&self, user_id: u32) -> Result<&Ledger> {
    match self {
      Self::Loaded(ledger) => Ok(ledger),
      Self::Quarantined(quarantined) => Err(quarantined_error(user_id, quarantined)),
    }
  }

  pub fn ledger_mut(&mut self, user_id: u32) -> Result<&mut Ledger> {
    match self {
      Self::Loaded(ledger) => Ok(ledger),
      Self::Quarantined(quarantined) => Err(quarantined_error(user_id, quarantined)),
    }
  }
}

fn quarantined_error(user_id: u32, quarantined: &QuarantinedLedger) -> Error {
  Error::CorruptRecord(format!(
    "visits for user {user_id} are unreadable: {}",
    quarantined.reason
  ))
}

//
// DecodedImage
//

#[derive(Debug)]
pub struct DecodedImage {
  pub stored_capacity: u32,
  pub ledgers: BTreeMap<u32, LedgerSlot>,
  /// Entries dropped because the image held more visits per user than the requested capacity.
  pub evicted: usize,
}

impl DecodedImage {
  pub fn quarantined_users(&self) -> impl Iterator<Item = u32> + '_ {
    self
      .ledgers
      .iter()
      .filter(|(_, slot)| matches!(slot, LedgerSlot::Quarantined(_)))
      .map(|(user_id, _)| *user_id)
  }
}

/// Serialize all ledgers into a complete image.
///
/// # Errors
/// Fails with `InvalidArgument` if a visit or ledger is too large to be framed.
pub fn encode(capacity: u32, ledgers: &BTreeMap<u32, LedgerSlot>) -> Result<Vec<u8>> {
  let ledger_count = u32::try_from(ledgers.len())
    .map_err(|_| Error::InvalidArgument("too many users".to_string()))?;

  let mut buf = Vec::with_capacity(HEADER_LEN);
  buf.put_slice(&MAGIC);
  buf.put_u16_le(VERSION);
  buf.put_u16_le(0);
  buf.put_u32_le(capacity);
  buf.put_u32_le(ledger_count);

  for (user_id, slot) in ledgers {
    match slot {
      LedgerSlot::Loaded(ledger) => {
        let mut payload = Vec::new();
        for visit in ledger.iter() {
          codec::encode_into(visit, &mut payload)?;
        }
        let visit_count = u32::try_from(ledger.len())
          .map_err(|_| Error::InvalidArgument(format!("user {user_id} has too many visits")))?;
        put_frame(&mut buf, *user_id, visit_count, &payload, crc32(&payload))?;
      },
      LedgerSlot::Quarantined(quarantined) => put_frame(
        &mut buf,
        *user_id,
        quarantined.visit_count,
        &quarantined.payload,
        quarantined.crc,
      )?,
    }
  }

  Ok(buf)
}

fn put_frame(
  buf: &mut Vec<u8>,
  user_id: u32,
  visit_count: u32,
  payload: &[u8],
  crc: u32,
) -> Result<()> {
  let payload_len = u32::try_from(payload.len())
    .map_err(|_| Error::InvalidArgument(format!("visits for user {user_id} are too large")))?;

  buf.reserve(LEDGER_HEADER_LEN + payload.len() + CRC_LEN);
  buf.put_u32_le(user_id);
  buf.put_u32_le(visit_count);
  buf.put_u32_le(payload_len);
  buf.put_slice(payload);
  buf.put_u32_le(crc);
  Ok(())
}

fn crc32(payload: &[u8]) -> u32 {
  let mut hasher = Hasher::new();
  hasher.update(payload);
  hasher.finalize()
}

/// Parse a complete image, applying `capacity` to every ledger.
///
/// # Errors
/// Returns an `ImageError` when the file is not a store, has an unknown version, or its framing
/// cannot be followed. Corrupt ledger contents are not errors; they become quarantined slots.
pub fn decode(bytes: &[u8], capacity: u32) -> std::result::Result<DecodedImage, ImageError> {
  let mut cursor = bytes;

  if bytes.is_empty() {
    return Err(ImageError::Framing("file is empty".to_string()));
  }
  if cursor.remaining() < MAGIC.len() || cursor[.. MAGIC.len()] != MAGIC {
    return Err(ImageError::Foreign);
  }
  cursor.advance(MAGIC.len());

  if cursor.remaining() < HEADER_LEN - MAGIC.len() {
    return Err(ImageError::Framing(format!(
      "header truncated at {} bytes",
      bytes.len()
    )));
  }
  let version = cursor.get_u16_le();
  if version != VERSION {
    return Err(ImageError::UnsupportedVersion(version));
  }
  let _flags = cursor.get_u16_le();
  let stored_capacity = cursor.get_u32_le();
  let ledger_count = cursor.get_u32_le();

  let mut ledgers = BTreeMap::new();
  let mut evicted = 0;
  for index in 0 .. ledger_count {
    if cursor.remaining() < LEDGER_HEADER_LEN {
      return Err(ImageError::Framing(format!(
        "ledger {index} of {ledger_count} is truncated"
      )));
    }
    let user_id = cursor.get_u32_le();
    let visit_count = cursor.get_u32_le();
    let payload_len = cursor.get_u32_le() as usize;

    if cursor.remaining() < payload_len.saturating_add(CRC_LEN) {
      return Err(ImageError::Framing(format!(
        "ledger for user {user_id} claims {payload_len} bytes, {} remain",
        cursor.remaining()
      )));
    }
    let (payload, rest) = cursor.split_at(payload_len);
    cursor = rest;
    let stored_crc = cursor.get_u32_le();

    if ledgers.contains_key(&user_id) {
      return Err(ImageError::Framing(format!(
        "user {user_id} appears more than once"
      )));
    }

    let slot = match decode_payload(payload, visit_count, stored_crc) {
      Ok(entries) => {
        let (ledger, dropped) = Ledger::from_entries(capacity, entries);
        evicted += dropped;
        LedgerSlot::Loaded(ledger)
      },
      Err(reason) => {
        log::debug!("quarantining visits for user {user_id}: {reason}");
        LedgerSlot::Quarantined(QuarantinedLedger {
          visit_count,
          payload: payload.to_vec(),
          crc: stored_crc,
          reason,
        })
      },
    };
    ledgers.insert(user_id, slot);
  }

  if cursor.has_remaining() {
    return Err(ImageError::Framing(format!(
      "{} trailing bytes after {ledger_count} ledgers",
      cursor.remaining()
    )));
  }

  Ok(DecodedImage {
    stored_capacity,
    ledgers,
    evicted,
  })
}

fn decode_payload(
  payload: &[u8],
  visit_count: u32,
  stored_crc: u32,
) -> std::result::Result<Vec<crate::Visit>, String> {
  let computed_crc = crc32(payload);
  if computed_crc != stored_crc {
    return Err(format!(
      "CRC mismatch: expected 0x{stored_crc:08x}, got 0x{computed_crc:08x}"
    ));
  }

  // The count comes from disk, so it only bounds the loop and never sizes an allocation.
  let mut entries = Vec::new();
  let mut offset = 0;
  for _ in 0 .. visit_count {
    let (visit, consumed) =
      codec::decode_prefix(&payload[offset ..]).map_err(|e| e.to_string())?;
    entries.push(visit);
    offset += consumed;
  }

  if offset != payload.len() {
    return Err(format!(
      "{} bytes left after {visit_count} records",
      payload.len() - offset
    ));
  }
  Ok(entries)
}
