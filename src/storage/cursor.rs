//! Owned substrate cursor

use super::{CursorId, CursorStatus, KvSubstrate};
use crate::types::Name;
use crate::Result;
use std::fmt;
use tracing::warn;

/// Exclusive owner of one substrate cursor handle.
///
/// The handle is destroyed exactly once, when the guard drops. Moving the
/// guard moves ownership; there is no `Clone`.
pub struct Cursor<'a, S: KvSubstrate + ?Sized> {
    kv: &'a S,
    id: CursorId,
}

impl<'a, S: KvSubstrate + ?Sized> Cursor<'a, S> {
    /// Open a cursor over `prefix`, positioned at the end
    pub fn open(kv: &'a S, scope: Name, prefix: &[u8]) -> Result<Self> {
        let id = kv.create_cursor(scope, prefix)?;
        Ok(Self { kv, id })
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    pub fn substrate(&self) -> &'a S {
        self.kv
    }

    pub fn status(&self) -> Result<CursorStatus> {
        self.kv.cursor_status(self.id)
    }

    pub fn next(&self) -> Result<CursorStatus> {
        self.kv.cursor_next(self.id)
    }

    pub fn prev(&self) -> Result<CursorStatus> {
        self.kv.cursor_prev(self.id)
    }

    pub fn lower_bound(&self, key: &[u8]) -> Result<CursorStatus> {
        self.kv.cursor_lower_bound(self.id, key)
    }

    pub fn move_to_end(&self) -> Result<CursorStatus> {
        self.kv.cursor_move_to_end(self.id)
    }

    pub fn key(&self) -> Result<Option<Vec<u8>>> {
        self.kv.cursor_key_vec(self.id)
    }

    pub fn value(&self) -> Result<Option<Vec<u8>>> {
        self.kv.cursor_value_vec(self.id)
    }

    pub fn compare(&self, other: &Cursor<'_, S>) -> Result<std::cmp::Ordering> {
        self.kv.cursor_compare(self.id, other.id)
    }

    pub fn key_compare(&self, key: &[u8]) -> Result<std::cmp::Ordering> {
        self.kv.cursor_key_compare(self.id, key)
    }
}

impl<S: KvSubstrate + ?Sized> Drop for Cursor<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.kv.destroy_cursor(self.id) {
            warn!(cursor = self.id, error = %e, "failed to release cursor");
        }
    }
}

impl<S: KvSubstrate + ?Sized> fmt::Debug for Cursor<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("id", &self.id).finish()
    }
}
