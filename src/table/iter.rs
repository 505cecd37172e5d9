//! Index iterators
//!
//! `IndexIter` walks one index in key order, `RevIndexIter` walks it
//! backwards. Both own at most one substrate cursor, released on drop.
//! An iterator built as an end sentinel holds no cursor until it is stepped
//! backwards.
//!
//! `Records` and `Keys` adapt a forward iterator to `std::iter::Iterator`.

use super::{Table, TableRecord};
use crate::key::{FullKey, PartialKey};
use crate::storage::{Cursor, CursorStatus, KvSubstrate};
use crate::{KvError, Result};
use std::cmp::Ordering;
use std::fmt;

const READ_END: &str = "cannot read end iterator";
const READ_ERASED: &str = "iterator points to an erased entry";
const INCREMENT_END: &str = "cannot increment end iterator";
const INCREMENT_PAST_END: &str = "incremented past the end";
const DECREMENT_PAST_BEGIN: &str = "decremented past the beginning";

/// Forward iterator over one index
pub struct IndexIter<'a, T, S: KvSubstrate + ?Sized> {
    table: &'a Table<'a, T, S>,
    index: usize,
    cursor: Option<Cursor<'a, S>>,
    status: CursorStatus,
}

impl<'a, T: TableRecord, S: KvSubstrate + ?Sized> IndexIter<'a, T, S> {
    /// The end sentinel: no cursor, status `End`
    pub(crate) fn end(table: &'a Table<'a, T, S>, index: usize) -> Self {
        Self {
            table,
            index,
            cursor: None,
            status: CursorStatus::End,
        }
    }

    fn open(table: &'a Table<'a, T, S>, index: usize) -> Result<Cursor<'a, S>> {
        let prefix = table.descriptor_at(index).prefix();
        Cursor::open(table.substrate(), table.scope(), prefix.as_bytes())
    }

    /// Positioned at the first entry `>= key`
    pub(crate) fn lower_bound(table: &'a Table<'a, T, S>, index: usize, key: &FullKey) -> Result<Self> {
        let cursor = Self::open(table, index)?;
        let status = cursor.lower_bound(key.as_bytes())?;
        Ok(Self {
            table,
            index,
            cursor: Some(cursor),
            status,
        })
    }

    /// Positioned at `key`, or the end sentinel if it is absent
    pub(crate) fn find(table: &'a Table<'a, T, S>, index: usize, key: &FullKey) -> Result<Self> {
        let iter = Self::lower_bound(table, index, key)?;
        if iter.status == CursorStatus::Ok && iter.key_compare(key)? == Ordering::Equal {
            Ok(iter)
        } else {
            Ok(Self::end(table, index))
        }
    }

    /// Positioned at the first entry `> key`
    pub(crate) fn upper_bound(table: &'a Table<'a, T, S>, index: usize, key: &FullKey) -> Result<Self> {
        let mut iter = Self::lower_bound(table, index, key)?;
        if iter.status == CursorStatus::Ok && iter.key_compare(key)? == Ordering::Equal {
            iter.advance()?;
        }
        Ok(iter)
    }

    pub fn status(&self) -> CursorStatus {
        self.status
    }

    /// Positioned at a live entry
    pub fn good(&self) -> bool {
        self.status == CursorStatus::Ok
    }

    pub fn is_end(&self) -> bool {
        self.status.is_end()
    }

    /// Re-read the status from the substrate, e.g. after the table was
    /// modified underneath this iterator
    pub fn refresh(&mut self) -> Result<CursorStatus> {
        if let Some(cursor) = &self.cursor {
            self.status = cursor.status()?;
        }
        Ok(self.status)
    }

    fn cursor(&self) -> Result<&Cursor<'a, S>> {
        self.cursor
            .as_ref()
            .ok_or_else(|| KvError::SubstrateFailure("iterator has no cursor".into()))
    }

    /// Step forward. Stepping off the last entry yields the end position.
    pub fn advance(&mut self) -> Result<()> {
        if self.status.is_end() {
            return Err(KvError::IteratorMisuse(INCREMENT_END));
        }
        self.status = self.cursor()?.next()?;
        Ok(())
    }

    /// Step backward. From the end position this moves to the last entry.
    pub fn retreat(&mut self) -> Result<()> {
        if self.cursor.is_none() {
            self.cursor = Some(Self::open(self.table, self.index)?);
        }
        self.status = self.cursor()?.prev()?;
        if self.status.is_end() {
            return Err(KvError::IteratorMisuse(DECREMENT_PAST_BEGIN));
        }
        Ok(())
    }

    /// Full key of the current entry, prefix included
    pub fn key(&self) -> Result<FullKey> {
        match self.status {
            CursorStatus::End => Err(KvError::IteratorMisuse(READ_END)),
            CursorStatus::Erased => Err(KvError::IteratorMisuse(READ_ERASED)),
            CursorStatus::Ok => self
                .cursor()?
                .key()?
                .map(FullKey::from_vec)
                .ok_or(KvError::IteratorMisuse(READ_ERASED)),
        }
    }

    /// Current key without the index prefix
    pub fn partial_key(&self) -> Result<PartialKey> {
        let key = self.key()?;
        key.strip_prefix(self.table.descriptor_at(self.index).prefix())
            .ok_or_else(|| KvError::SubstrateFailure(format!("key {} outside index range", key)))
    }

    /// The record at the current position. Reading through a secondary
    /// index costs one extra lookup.
    pub fn value(&self) -> Result<T> {
        match self.status {
            CursorStatus::End => Err(KvError::IteratorMisuse(READ_END)),
            CursorStatus::Erased => Err(KvError::IteratorMisuse(READ_ERASED)),
            CursorStatus::Ok => {
                let raw = self
                    .cursor()?
                    .value()?
                    .ok_or(KvError::IteratorMisuse(READ_ERASED))?;
                self.table.resolve(self.index, raw)
            }
        }
    }

    /// Compare the current key with `key`; the end position is greater
    /// than every key
    pub fn key_compare(&self, key: &FullKey) -> Result<Ordering> {
        match &self.cursor {
            None => Ok(Ordering::Greater),
            Some(cursor) => cursor.key_compare(key.as_bytes()),
        }
    }

    fn same_index(&self, other: &Self) -> bool {
        std::ptr::eq(self.table, other.table) && self.index == other.index
    }

    /// Order two iterators over the same index; end positions sort last
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        if !self.same_index(other) {
            return Err(KvError::CursorMismatch);
        }
        match (self.status.is_end(), other.status.is_end()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(Ordering::Greater),
            (false, true) => Ok(Ordering::Less),
            (false, false) => self.cursor()?.compare(other.cursor()?),
        }
    }
}

impl<T: TableRecord, S: KvSubstrate + ?Sized> PartialEq for IndexIter<'_, T, S> {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.compare(other), Ok(Ordering::Equal))
    }
}

impl<T: TableRecord, S: KvSubstrate + ?Sized> PartialOrd for IndexIter<'_, T, S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl<T, S: KvSubstrate + ?Sized> fmt::Debug for IndexIter<'_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexIter")
            .field("index", &self.index)
            .field("cursor", &self.cursor)
            .field("status", &self.status)
            .finish()
    }
}

/// Reverse iterator over one index.
///
/// `advance` moves toward smaller keys; running off the first entry yields
/// `rend`. Stepping back from `rend` lands on the first entry.
pub struct RevIndexIter<'a, T, S: KvSubstrate + ?Sized> {
    inner: IndexIter<'a, T, S>,
}

impl<'a, T: TableRecord, S: KvSubstrate + ?Sized> RevIndexIter<'a, T, S> {
    /// Positioned at the last entry, or `rend` for an empty index
    pub(crate) fn rbegin(table: &'a Table<'a, T, S>, index: usize) -> Result<Self> {
        let cursor = IndexIter::open(table, index)?;
        let status = cursor.prev()?;
        Ok(Self {
            inner: IndexIter {
                table,
                index,
                cursor: Some(cursor),
                status,
            },
        })
    }

    pub(crate) fn rend(table: &'a Table<'a, T, S>, index: usize) -> Self {
        Self {
            inner: IndexIter::end(table, index),
        }
    }

    pub fn status(&self) -> CursorStatus {
        self.inner.status
    }

    pub fn good(&self) -> bool {
        self.inner.good()
    }

    pub fn is_rend(&self) -> bool {
        self.inner.is_end()
    }

    /// Step toward smaller keys
    pub fn advance(&mut self) -> Result<()> {
        if self.inner.status.is_end() {
            return Err(KvError::IteratorMisuse(INCREMENT_PAST_END));
        }
        self.inner.status = self.inner.cursor()?.prev()?;
        Ok(())
    }

    /// Step toward larger keys
    pub fn retreat(&mut self) -> Result<()> {
        if self.inner.cursor.is_none() {
            self.inner.cursor = Some(IndexIter::open(self.inner.table, self.inner.index)?);
        }
        self.inner.status = self.inner.cursor()?.next()?;
        if self.inner.status.is_end() {
            return Err(KvError::IteratorMisuse(DECREMENT_PAST_BEGIN));
        }
        Ok(())
    }

    pub fn key(&self) -> Result<FullKey> {
        self.inner.key()
    }

    pub fn partial_key(&self) -> Result<PartialKey> {
        self.inner.partial_key()
    }

    pub fn value(&self) -> Result<T> {
        self.inner.value()
    }

    pub fn key_compare(&self, key: &FullKey) -> Result<Ordering> {
        self.inner.key_compare(key)
    }

    /// Order in traversal direction: larger keys come first, `rend` last
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        if !self.inner.same_index(&other.inner) {
            return Err(KvError::CursorMismatch);
        }
        match (self.inner.status.is_end(), other.inner.status.is_end()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(Ordering::Greater),
            (false, true) => Ok(Ordering::Less),
            (false, false) => other.inner.cursor()?.compare(self.inner.cursor()?),
        }
    }
}

impl<T: TableRecord, S: KvSubstrate + ?Sized> PartialEq for RevIndexIter<'_, T, S> {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.compare(other), Ok(Ordering::Equal))
    }
}

impl<T: TableRecord, S: KvSubstrate + ?Sized> PartialOrd for RevIndexIter<'_, T, S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl<T, S: KvSubstrate + ?Sized> fmt::Debug for RevIndexIter<'_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevIndexIter").field("inner", &self.inner).finish()
    }
}

/// Shared state of the `std::iter::Iterator` adapters.
///
/// Each entry is read before the cursor moves on, so the caller may erase
/// the record just yielded. Entries erased ahead of the cursor are skipped.
struct Scan<'a, T, S: KvSubstrate + ?Sized> {
    iter: IndexIter<'a, T, S>,
    stop: Option<FullKey>,
    done: bool,
}

impl<'a, T: TableRecord, S: KvSubstrate + ?Sized> Scan<'a, T, S> {
    fn step<R, F>(&mut self, read: F) -> Result<Option<R>>
    where
        F: FnOnce(&IndexIter<'a, T, S>) -> Result<R>,
    {
        if self.iter.refresh()? == CursorStatus::Erased {
            self.iter.advance()?;
        }
        if self.iter.is_end() {
            return Ok(None);
        }
        if let Some(stop) = &self.stop {
            if self.iter.key_compare(stop)? != Ordering::Less {
                return Ok(None);
            }
        }
        let item = read(&self.iter)?;
        self.iter.advance()?;
        Ok(Some(item))
    }

    fn next_with<R, F>(&mut self, read: F) -> Option<Result<R>>
    where
        F: FnOnce(&IndexIter<'a, T, S>) -> Result<R>,
    {
        if self.done {
            return None;
        }
        match self.step(read) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Records of an index in key order, optionally stopping before a key
pub struct Records<'a, T, S: KvSubstrate + ?Sized> {
    scan: Scan<'a, T, S>,
}

impl<'a, T: TableRecord, S: KvSubstrate + ?Sized> Records<'a, T, S> {
    pub(crate) fn new(iter: IndexIter<'a, T, S>, stop: Option<FullKey>) -> Self {
        Self {
            scan: Scan {
                iter,
                stop,
                done: false,
            },
        }
    }
}

impl<T: TableRecord, S: KvSubstrate + ?Sized> Iterator for Records<'_, T, S> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan.next_with(|iter| iter.value())
    }
}

/// Partial keys of an index in key order
pub struct Keys<'a, T, S: KvSubstrate + ?Sized> {
    scan: Scan<'a, T, S>,
}

impl<'a, T: TableRecord, S: KvSubstrate + ?Sized> Keys<'a, T, S> {
    pub(crate) fn new(iter: IndexIter<'a, T, S>, stop: Option<FullKey>) -> Self {
        Self {
            scan: Scan {
                iter,
                stop,
                done: false,
            },
        }
    }
}

impl<T: TableRecord, S: KvSubstrate + ?Sized> Iterator for Keys<'_, T, S> {
    type Item = Result<PartialKey>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan.next_with(|iter| iter.partial_key())
    }
}
