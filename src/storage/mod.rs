//! Storage substrate
//!
//! The indexing layer runs on top of an externally supplied sorted
//! key-value store. `KvSubstrate` is the contract it needs from that store:
//! point reads and writes addressed by `(scope, key)` plus prefix-bounded
//! cursors. `MemoryKv` is the in-process implementation used by tests,
//! benches and embedders that do not bring their own store.

pub mod cursor;
pub mod memory;

pub use cursor::Cursor;
pub use memory::MemoryKv;

use crate::types::Name;
use crate::Result;
use std::cmp::Ordering;

/// Substrate cursor handle. Zero is never issued.
pub type CursorId = u32;

/// Position state reported by every cursor operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    /// Positioned at a live key-value pair
    Ok,
    /// The pair the cursor was positioned at has been erased
    Erased,
    /// Out of bounds (before the first or after the last pair of the prefix)
    End,
}

impl CursorStatus {
    pub fn is_end(&self) -> bool {
        matches!(self, CursorStatus::End)
    }
}

/// Sorted key-value store primitives.
///
/// All calls are synchronous. Reads of variable-size data follow the
/// "size first, then copy" convention of host APIs: `get` stages a value and
/// reports its size, `get_data` copies from the staged value. The provided
/// methods wrap these into owned buffers.
pub trait KvSubstrate {
    /// Look up `key` in `scope`. On a hit the value is staged for `get_data`
    /// and its size is returned.
    fn get(&self, scope: Name, key: &[u8]) -> Result<Option<u32>>;

    /// Copy the value staged by the last successful `get`, starting at
    /// `offset`. Returns the number of bytes copied.
    fn get_data(&self, offset: u32, buf: &mut [u8]) -> Result<u32>;

    /// Store `value` under `key`, billing the storage to `payer`.
    /// Returns the change in billable bytes.
    fn set(&self, scope: Name, key: &[u8], value: &[u8], payer: Name) -> Result<i64>;

    /// Remove `key`. Returns the change in billable bytes (zero if absent).
    fn erase(&self, scope: Name, key: &[u8]) -> Result<i64>;

    /// Create a cursor over every key of `scope` starting with `prefix`.
    /// The cursor starts at the end position.
    fn create_cursor(&self, scope: Name, prefix: &[u8]) -> Result<CursorId>;

    fn destroy_cursor(&self, cursor: CursorId) -> Result<()>;

    fn cursor_status(&self, cursor: CursorId) -> Result<CursorStatus>;

    /// Advance. From the end position this wraps to the first pair.
    fn cursor_next(&self, cursor: CursorId) -> Result<CursorStatus>;

    /// Step back. From the end position this moves to the last pair.
    fn cursor_prev(&self, cursor: CursorId) -> Result<CursorStatus>;

    /// Position at the first pair whose key is `>= key`
    fn cursor_lower_bound(&self, cursor: CursorId, key: &[u8]) -> Result<CursorStatus>;

    fn cursor_move_to_end(&self, cursor: CursorId) -> Result<CursorStatus>;

    /// Copy the current key from `offset`. Returns the status and the full
    /// key size (zero unless the status is `Ok`).
    fn cursor_key(&self, cursor: CursorId, offset: u32, buf: &mut [u8]) -> Result<(CursorStatus, u32)>;

    /// Copy the current value from `offset`, same conventions as `cursor_key`
    fn cursor_value(&self, cursor: CursorId, offset: u32, buf: &mut [u8]) -> Result<(CursorStatus, u32)>;

    /// Order two cursors over the same scope and prefix. End sorts last.
    fn cursor_compare(&self, a: CursorId, b: CursorId) -> Result<Ordering>;

    /// Order the cursor's current key against `key`. End sorts last.
    fn cursor_key_compare(&self, cursor: CursorId, key: &[u8]) -> Result<Ordering>;

    /// Largest key `set` accepts, if the store enforces one
    fn max_key_size(&self) -> Option<u32> {
        None
    }

    /// Largest value `set` accepts, if the store enforces one
    fn max_value_size(&self) -> Option<u32> {
        None
    }

    /// Owned read of a whole value
    fn read(&self, scope: Name, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.get(scope, key)? {
            None => Ok(None),
            Some(size) => {
                let mut buf = vec![0u8; size as usize];
                let copied = self.get_data(0, &mut buf)?;
                buf.truncate(copied as usize);
                Ok(Some(buf))
            }
        }
    }

    fn contains(&self, scope: Name, key: &[u8]) -> Result<bool> {
        Ok(self.get(scope, key)?.is_some())
    }

    /// Owned copy of the cursor's current key, `None` unless the status is `Ok`
    fn cursor_key_vec(&self, cursor: CursorId) -> Result<Option<Vec<u8>>> {
        let (status, size) = self.cursor_key(cursor, 0, &mut [])?;
        if status != CursorStatus::Ok {
            return Ok(None);
        }
        let mut buf = vec![0u8; size as usize];
        self.cursor_key(cursor, 0, &mut buf)?;
        Ok(Some(buf))
    }

    /// Owned copy of the cursor's current value, `None` unless the status is `Ok`
    fn cursor_value_vec(&self, cursor: CursorId) -> Result<Option<Vec<u8>>> {
        let (status, size) = self.cursor_value(cursor, 0, &mut [])?;
        if status != CursorStatus::Ok {
            return Ok(None);
        }
        let mut buf = vec![0u8; size as usize];
        self.cursor_value(cursor, 0, &mut buf)?;
        Ok(Some(buf))
    }
}
