// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

//! Fixed layout encoding of a single visit.
//!
//! ```text
//! [visit_id: u32][seconds: i64][nanos: u32][url_len: u32][url: bytes][text_len: u32][text: bytes]
//! ```
//!
//! All integers are little endian. `seconds`/`nanos` are the UTC timestamp split at the second
//! boundary. Strings are UTF-8 and may be empty, which is why they are length prefixed rather
//! than terminated.

#[cfg(test)]
#[path = "./codec_test.rs"]
mod tests;

use crate::visit::Visit;
use crate::{Error, Result};
use bytes::{Buf, BufMut};
use rv_time::TimestampParts;

/// Bytes used by the fixed width fields of a record.
pub const FIXED_LEN: usize = 4 + 8 + 4 + 4 + 4;

/// Number of bytes `visit` occupies once encoded.
#[must_use]
pub fn encoded_len(visit: &Visit) -> usize {
  FIXED_LEN + visit.url.len() + visit.text.len()
}

/// Encode a visit into a new buffer.
///
/// # Errors
/// Fails with `InvalidArgument` if the url or text is too long to be length prefixed.
pub fn encode(visit: &Visit) -> Result<Vec<u8>> {
  let mut buf = Vec::with_capacity(encoded_len(visit));
  encode_into(visit, &mut buf)?;
  Ok(buf)
}

/// Append the encoding of `visit` to `buf`.
///
/// # Errors
/// Fails with `InvalidArgument` if the url or text is too long to be length prefixed. Nothing is
/// written in that case.
pub fn encode_into<B: BufMut>(visit: &Visit, buf: &mut B) -> Result<()> {
  let url_len = field_len("url", &visit.url)?;
  let text_len = field_len("text", &visit.text)?;
  let parts = visit.timestamp_parts();

  buf.put_u32_le(visit.visit_id);
  buf.put_i64_le(parts.seconds);
  buf.put_u32_le(parts.nanos);
  buf.put_u32_le(url_len);
  buf.put_slice(visit.url.as_bytes());
  buf.put_u32_le(text_len);
  buf.put_slice(visit.text.as_bytes());
  Ok(())
}

fn field_len(name: &str, value: &str) -> Result<u32> {
  u32::try_from(value.len()).map_err(|_| {
    Error::InvalidArgument(format!(
      "{name} is {} bytes, which cannot be encoded",
      value.len()
    ))
  })
}

/// Decode a buffer that holds exactly one record.
///
/// # Errors
/// Fails with `CorruptRecord` if the buffer is truncated, has trailing bytes, or holds invalid
/// field values.
pub fn decode(buf: &[u8]) -> Result<Visit> {
  let (visit, consumed) = decode_prefix(buf)?;
  if consumed != buf.len() {
    return Err(Error::CorruptRecord(format!(
      "{} trailing bytes after record",
      buf.len() - consumed
    )));
  }
  Ok(visit)
}

/// Decode the record at the start of `buf`, returning it with the number of bytes consumed.
///
/// # Errors
/// Fails with `CorruptRecord` if the record is truncated or holds invalid field values.
pub fn decode_prefix(buf: &[u8]) -> Result<(Visit, usize)> {
  let mut cursor = buf;

  ensure_remaining(cursor, 4 + 8 + 4, "header")?;
  let visit_id = cursor.get_u32_le();
  let seconds = cursor.get_i64_le();
  let nanos = cursor.get_u32_le();

  let url = read_string(&mut cursor, "url")?;
  let text = read_string(&mut cursor, "text")?;

  let timestamp = TimestampParts::new(seconds, nanos)
    .to_offset_date_time()
    .map_err(|e| Error::CorruptRecord(format!("visit {visit_id}: {e}")))?;

  let consumed = buf.len() - cursor.remaining();
  Ok((
    Visit {
      visit_id,
      url,
      text,
      timestamp,
    },
    consumed,
  ))
}

fn read_string(cursor: &mut &[u8], field: &str) -> Result<String> {
  ensure_remaining(cursor, 4, field)?;
  let len = cursor.get_u32_le() as usize;
  ensure_remaining(cursor, len, field)?;

  let (bytes, rest) = cursor.split_at(len);
  let value = std::str::from_utf8(bytes)
    .map_err(|e| Error::CorruptRecord(format!("{field} is not valid UTF-8: {e}")))?
    .to_string();
  *cursor = rest;
  Ok(value)
}

fn ensure_remaining(cursor: &[u8], needed: usize, field: &str) -> Result<()> {
  if cursor.remaining() < needed {
    return Err(Error::CorruptRecord(format!(
      "truncated {field}: need {needed} bytes, have {}",
      cursor.remaining()
    )));
  }
  Ok(())
}
