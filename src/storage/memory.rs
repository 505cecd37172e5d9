//! In-memory sorted substrate
//!
//! One `BTreeMap<Vec<u8>, Entry>` per scope behind a single mutex. Cursors
//! remember the key they sit on rather than an index, so erasing that key
//! turns them `Erased` without invalidating them: stepping from an erased
//! position continues from the erased key.
//!
//! `transact` provides the all-or-nothing boundary the indexing layer relies
//! on: writes made inside the closure are undone if it returns `Err`.
//!
//! `get` followed by `get_data` shares one staged buffer across threads. The
//! owned reads (`read`, `cursor_key_vec`, `cursor_value_vec`) copy under a
//! single lock and are the ones to use when the store is shared.

use super::{CursorId, CursorStatus, KvSubstrate};
use crate::config::KvConfig;
use crate::types::Name;
use crate::{KvError, Result};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    payer: Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    End,
    At(Vec<u8>),
}

#[derive(Debug)]
struct CursorState {
    scope: Name,
    prefix: Vec<u8>,
    position: Position,
}

/// Previous state of one key, replayed on rollback
#[derive(Debug)]
struct UndoRecord {
    scope: Name,
    key: Vec<u8>,
    previous: Option<Entry>,
}

#[derive(Default)]
struct Inner {
    scopes: AHashMap<Name, BTreeMap<Vec<u8>, Entry>>,
    usage: AHashMap<Name, i64>,
    staged: Vec<u8>,
    cursors: AHashMap<CursorId, CursorState>,
    next_cursor: CursorId,
    undo: Option<Vec<UndoRecord>>,
}

/// Rolls back a unit of work whose closure unwound before finishing
struct UnitOfWork<'a> {
    kv: &'a MemoryKv,
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        let mut inner = self.kv.inner.lock();
        if let Some(undo) = inner.undo.take() {
            let writes = inner.rollback(undo, self.kv.config.billable_overhead);
            warn!(writes, "unit of work unwound, rolled back");
        }
    }
}

/// In-memory `KvSubstrate`
pub struct MemoryKv {
    inner: Mutex<Inner>,
    config: KvConfig,
}

/// Smallest key greater than every key starting with `prefix`
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut succ = prefix.to_vec();
    while let Some(last) = succ.pop() {
        if last != 0xff {
            succ.push(last + 1);
            return Some(succ);
        }
    }
    None
}

fn copy_from(src: &[u8], offset: u32, buf: &mut [u8]) -> u32 {
    let offset = offset as usize;
    if offset >= src.len() {
        return 0;
    }
    let n = buf.len().min(src.len() - offset);
    buf[..n].copy_from_slice(&src[offset..offset + n]);
    n as u32
}

impl Inner {
    fn billable(&self, key: &[u8], value: &[u8], overhead: u64) -> i64 {
        (key.len() + value.len()) as i64 + overhead as i64
    }

    /// Replace the entry at `key`, keeping payer usage in sync.
    /// Returns the change in billable bytes.
    fn replace(&mut self, scope: Name, key: &[u8], entry: Option<Entry>, overhead: u64) -> i64 {
        let map = self.scopes.entry(scope).or_default();
        let previous = match &entry {
            Some(e) => map.insert(key.to_vec(), e.clone()),
            None => map.remove(key),
        };

        let mut delta = 0;
        if let Some(old) = &previous {
            let billed = self.billable(key, &old.value, overhead);
            *self.usage.entry(old.payer).or_default() -= billed;
            delta -= billed;
        }
        if let Some(new) = &entry {
            let billed = self.billable(key, &new.value, overhead);
            *self.usage.entry(new.payer).or_default() += billed;
            delta += billed;
        }

        if let Some(undo) = self.undo.as_mut() {
            undo.push(UndoRecord {
                scope,
                key: key.to_vec(),
                previous,
            });
        }

        delta
    }

    /// Replay `undo` newest first. Returns the number of writes undone.
    fn rollback(&mut self, undo: Vec<UndoRecord>, overhead: u64) -> usize {
        let writes = undo.len();
        for record in undo.into_iter().rev() {
            self.replace(record.scope, &record.key, record.previous, overhead);
        }
        writes
    }

    fn cursor(&self, id: CursorId) -> Result<&CursorState> {
        self.cursors.get(&id).ok_or(KvError::InvalidCursor(id))
    }

    fn map(&self, scope: Name) -> Option<&BTreeMap<Vec<u8>, Entry>> {
        self.scopes.get(&scope)
    }

    fn status_of(&self, state: &CursorState) -> CursorStatus {
        match &state.position {
            Position::End => CursorStatus::End,
            Position::At(key) => {
                let live = self.map(state.scope).is_some_and(|m| m.contains_key(key));
                if live {
                    CursorStatus::Ok
                } else {
                    CursorStatus::Erased
                }
            }
        }
    }

    fn first_at_or_after(&self, scope: Name, prefix: &[u8], start: &[u8]) -> Position {
        let start = if start < prefix { prefix } else { start };
        self.map(scope)
            .and_then(|m| {
                m.range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
                    .next()
            })
            .filter(|(k, _)| k.starts_with(prefix))
            .map_or(Position::End, |(k, _)| Position::At(k.clone()))
    }

    fn first_after(&self, scope: Name, prefix: &[u8], key: &[u8]) -> Position {
        self.map(scope)
            .and_then(|m| {
                m.range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
                    .next()
            })
            .filter(|(k, _)| k.starts_with(prefix))
            .map_or(Position::End, |(k, _)| Position::At(k.clone()))
    }

    fn last_before(&self, scope: Name, prefix: &[u8], key: Option<&[u8]>) -> Position {
        let upper = match key {
            Some(k) => Bound::Excluded(k.to_vec()),
            None => match prefix_successor(prefix) {
                Some(succ) => Bound::Excluded(succ),
                None => Bound::Unbounded,
            },
        };
        let upper_ref = match &upper {
            Bound::Excluded(v) => Bound::Excluded(v.as_slice()),
            _ => Bound::Unbounded,
        };
        self.map(scope)
            .and_then(|m| {
                m.range::<[u8], _>((Bound::Included(prefix), upper_ref))
                    .next_back()
            })
            .filter(|(k, _)| k.starts_with(prefix))
            .map_or(Position::End, |(k, _)| Position::At(k.clone()))
    }

    fn current_entry(&self, state: &CursorState) -> Option<(&Vec<u8>, &Entry)> {
        match &state.position {
            Position::End => None,
            Position::At(key) => self.map(state.scope).and_then(|m| m.get_key_value(key)),
        }
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_config(KvConfig::default())
    }

    pub fn with_config(config: KvConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_cursor: 1,
                ..Default::default()
            }),
            config,
        }
    }

    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    /// Run `f` as one unit of work. Every write made inside it is rolled
    /// back if it returns `Err` or panics. Units of work do not nest.
    pub fn transact<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Self) -> Result<R>,
    {
        {
            let mut inner = self.inner.lock();
            if inner.undo.is_some() {
                return Err(KvError::SubstrateFailure(
                    "unit of work already in progress".into(),
                ));
            }
            inner.undo = Some(Vec::new());
        }

        let _unit = UnitOfWork { kv: self };
        let result = f(self);

        let mut inner = self.inner.lock();
        let undo = inner.undo.take().unwrap_or_default();
        match result {
            Ok(value) => {
                debug!(writes = undo.len(), "unit of work committed");
                Ok(value)
            }
            Err(err) => {
                let writes = inner.rollback(undo, self.config.billable_overhead);
                debug!(writes, error = %err, "unit of work rolled back");
                Err(err)
            }
        }
    }

    /// Billable bytes currently charged to `payer`
    pub fn usage(&self, payer: Name) -> i64 {
        self.inner.lock().usage.get(&payer).copied().unwrap_or(0)
    }

    /// Number of entries stored under `scope`
    pub fn len(&self, scope: Name) -> usize {
        self.inner.lock().map(scope).map_or(0, |m| m.len())
    }

    pub fn is_empty(&self, scope: Name) -> bool {
        self.len(scope) == 0
    }

    /// Ordered copy of every pair in `scope`
    pub fn dump(&self, scope: Name) -> Vec<(Vec<u8>, Vec<u8>)> {
        let inner = self.inner.lock();
        inner.map(scope).map_or_else(Vec::new, |m| {
            m.iter()
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect()
        })
    }

    /// Payer of the pair at `key`, if present
    pub fn payer_of(&self, scope: Name, key: &[u8]) -> Option<Name> {
        self.inner
            .lock()
            .map(scope)
            .and_then(|m| m.get(key))
            .map(|e| e.payer)
    }

    /// Cursors created and not yet destroyed
    pub fn live_cursors(&self) -> usize {
        self.inner.lock().cursors.len()
    }

    fn step<F>(&self, cursor: CursorId, f: F) -> Result<CursorStatus>
    where
        F: FnOnce(&Inner, &CursorState) -> Position,
    {
        let mut inner = self.inner.lock();
        let state = inner.cursor(cursor)?;
        let position = f(&inner, state);
        let state = inner
            .cursors
            .get_mut(&cursor)
            .ok_or(KvError::InvalidCursor(cursor))?;
        state.position = position;
        let state = inner.cursor(cursor)?;
        Ok(inner.status_of(state))
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvSubstrate for MemoryKv {
    fn get(&self, scope: Name, key: &[u8]) -> Result<Option<u32>> {
        let mut inner = self.inner.lock();
        let found = inner.map(scope).and_then(|m| m.get(key)).map(|e| e.value.clone());
        match found {
            Some(value) => {
                let size = value.len() as u32;
                inner.staged = value;
                Ok(Some(size))
            }
            None => Ok(None),
        }
    }

    fn get_data(&self, offset: u32, buf: &mut [u8]) -> Result<u32> {
        let inner = self.inner.lock();
        Ok(copy_from(&inner.staged, offset, buf))
    }

    fn set(&self, scope: Name, key: &[u8], value: &[u8], payer: Name) -> Result<i64> {
        let limits = &self.config.limits;
        if key.len() > limits.max_key_size as usize {
            warn!(%scope, size = key.len(), limit = limits.max_key_size, "key too large");
            return Err(KvError::LimitExceeded(format!(
                "key of {} bytes exceeds {}",
                key.len(),
                limits.max_key_size
            )));
        }
        if value.len() > limits.max_value_size as usize {
            warn!(%scope, size = value.len(), limit = limits.max_value_size, "value too large");
            return Err(KvError::LimitExceeded(format!(
                "value of {} bytes exceeds {}",
                value.len(),
                limits.max_value_size
            )));
        }

        let mut inner = self.inner.lock();
        let entry = Entry {
            value: value.to_vec(),
            payer,
        };
        let delta = inner.replace(scope, key, Some(entry), self.config.billable_overhead);
        trace!(%scope, %payer, key_len = key.len(), value_len = value.len(), delta, "set");
        Ok(delta)
    }

    fn erase(&self, scope: Name, key: &[u8]) -> Result<i64> {
        let mut inner = self.inner.lock();
        let present = inner.map(scope).is_some_and(|m| m.contains_key(key));
        if !present {
            return Ok(0);
        }
        let delta = inner.replace(scope, key, None, self.config.billable_overhead);
        trace!(%scope, key_len = key.len(), delta, "erase");
        Ok(delta)
    }

    fn create_cursor(&self, scope: Name, prefix: &[u8]) -> Result<CursorId> {
        let mut inner = self.inner.lock();
        let max = self.config.limits.max_iterators as usize;
        if inner.cursors.len() >= max {
            warn!(%scope, live = inner.cursors.len(), "too many live cursors");
            return Err(KvError::LimitExceeded(format!(
                "more than {} live cursors",
                max
            )));
        }

        let mut id = inner.next_cursor;
        while inner.cursors.contains_key(&id) {
            id = id.checked_add(1).unwrap_or(1);
        }
        inner.next_cursor = id.checked_add(1).unwrap_or(1);
        inner.cursors.insert(
            id,
            CursorState {
                scope,
                prefix: prefix.to_vec(),
                position: Position::End,
            },
        );
        Ok(id)
    }

    fn destroy_cursor(&self, cursor: CursorId) -> Result<()> {
        self.inner
            .lock()
            .cursors
            .remove(&cursor)
            .map(|_| ())
            .ok_or(KvError::InvalidCursor(cursor))
    }

    fn cursor_status(&self, cursor: CursorId) -> Result<CursorStatus> {
        let inner = self.inner.lock();
        let state = inner.cursor(cursor)?;
        Ok(inner.status_of(state))
    }

    fn cursor_next(&self, cursor: CursorId) -> Result<CursorStatus> {
        self.step(cursor, |inner, state| match &state.position {
            Position::End => inner.first_at_or_after(state.scope, &state.prefix, &state.prefix),
            Position::At(key) => inner.first_after(state.scope, &state.prefix, key),
        })
    }

    fn cursor_prev(&self, cursor: CursorId) -> Result<CursorStatus> {
        self.step(cursor, |inner, state| match &state.position {
            Position::End => inner.last_before(state.scope, &state.prefix, None),
            Position::At(key) => inner.last_before(state.scope, &state.prefix, Some(key.as_slice())),
        })
    }

    fn cursor_lower_bound(&self, cursor: CursorId, key: &[u8]) -> Result<CursorStatus> {
        self.step(cursor, |inner, state| {
            inner.first_at_or_after(state.scope, &state.prefix, key)
        })
    }

    fn cursor_move_to_end(&self, cursor: CursorId) -> Result<CursorStatus> {
        self.step(cursor, |_, _| Position::End)
    }

    fn cursor_key(&self, cursor: CursorId, offset: u32, buf: &mut [u8]) -> Result<(CursorStatus, u32)> {
        let inner = self.inner.lock();
        let state = inner.cursor(cursor)?;
        let status = inner.status_of(state);
        match inner.current_entry(state) {
            Some((key, _)) if status == CursorStatus::Ok => {
                copy_from(key, offset, buf);
                Ok((status, key.len() as u32))
            }
            _ => Ok((status, 0)),
        }
    }

    fn cursor_value(&self, cursor: CursorId, offset: u32, buf: &mut [u8]) -> Result<(CursorStatus, u32)> {
        let inner = self.inner.lock();
        let state = inner.cursor(cursor)?;
        let status = inner.status_of(state);
        match inner.current_entry(state) {
            Some((_, entry)) if status == CursorStatus::Ok => {
                copy_from(&entry.value, offset, buf);
                Ok((status, entry.value.len() as u32))
            }
            _ => Ok((status, 0)),
        }
    }

    fn cursor_compare(&self, a: CursorId, b: CursorId) -> Result<Ordering> {
        let inner = self.inner.lock();
        let sa = inner.cursor(a)?;
        let sb = inner.cursor(b)?;
        if sa.scope != sb.scope || sa.prefix != sb.prefix {
            return Err(KvError::CursorMismatch);
        }
        Ok(match (&sa.position, &sb.position) {
            (Position::End, Position::End) => Ordering::Equal,
            (Position::End, _) => Ordering::Greater,
            (_, Position::End) => Ordering::Less,
            (Position::At(x), Position::At(y)) => x.cmp(y),
        })
    }

    fn cursor_key_compare(&self, cursor: CursorId, key: &[u8]) -> Result<Ordering> {
        let inner = self.inner.lock();
        let state = inner.cursor(cursor)?;
        Ok(match &state.position {
            Position::End => Ordering::Greater,
            Position::At(current) => current.as_slice().cmp(key),
        })
    }

    fn max_key_size(&self) -> Option<u32> {
        Some(self.config.limits.max_key_size)
    }

    fn max_value_size(&self) -> Option<u32> {
        Some(self.config.limits.max_value_size)
    }

    fn read(&self, scope: Name, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        Ok(inner.map(scope).and_then(|m| m.get(key)).map(|e| e.value.clone()))
    }

    fn contains(&self, scope: Name, key: &[u8]) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(inner.map(scope).is_some_and(|m| m.contains_key(key)))
    }

    fn cursor_key_vec(&self, cursor: CursorId) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        let state = inner.cursor(cursor)?;
        if inner.status_of(state) != CursorStatus::Ok {
            return Ok(None);
        }
        Ok(inner.current_entry(state).map(|(key, _)| key.clone()))
    }

    fn cursor_value_vec(&self, cursor: CursorId) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        let state = inner.cursor(cursor)?;
        if inner.status_of(state) != CursorStatus::Ok {
            return Ok(None);
        }
        Ok(inner.current_entry(state).map(|(_, entry)| entry.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KvLimits;

    fn scope() -> Name {
        "kvtest".parse().unwrap()
    }

    fn kv_with(pairs: &[(&[u8], &[u8])]) -> MemoryKv {
        let kv = MemoryKv::new();
        for (k, v) in pairs {
            kv.set(scope(), k, v, scope()).unwrap();
        }
        kv
    }

    #[test]
    fn test_get_and_staged_read() {
        let kv = kv_with(&[(b"a", b"hello")]);
        assert_eq!(kv.get(scope(), b"a").unwrap(), Some(5));

        let mut buf = [0u8; 3];
        assert_eq!(kv.get_data(1, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"ell");
        assert_eq!(kv.get_data(10, &mut buf).unwrap(), 0);

        assert_eq!(kv.read(scope(), b"a").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(kv.read(scope(), b"b").unwrap(), None);
        assert!(!kv.contains("other".parse().unwrap(), b"a").unwrap());
    }

    #[test]
    fn test_cursor_walk_within_prefix() {
        let kv = kv_with(&[
            (b"a1", b"x"),
            (b"b1", b"1"),
            (b"b2", b"2"),
            (b"b3", b"3"),
            (b"c1", b"y"),
        ]);
        let c = kv.create_cursor(scope(), b"b").unwrap();
        assert_eq!(kv.cursor_status(c).unwrap(), CursorStatus::End);

        // next from end wraps to the first pair
        assert_eq!(kv.cursor_next(c).unwrap(), CursorStatus::Ok);
        assert_eq!(kv.cursor_key_vec(c).unwrap(), Some(b"b1".to_vec()));
        assert_eq!(kv.cursor_next(c).unwrap(), CursorStatus::Ok);
        assert_eq!(kv.cursor_next(c).unwrap(), CursorStatus::Ok);
        assert_eq!(kv.cursor_value_vec(c).unwrap(), Some(b"3".to_vec()));
        assert_eq!(kv.cursor_next(c).unwrap(), CursorStatus::End);

        // prev from end goes to the last pair
        assert_eq!(kv.cursor_prev(c).unwrap(), CursorStatus::Ok);
        assert_eq!(kv.cursor_key_vec(c).unwrap(), Some(b"b3".to_vec()));
        kv.cursor_lower_bound(c, b"b1").unwrap();
        assert_eq!(kv.cursor_prev(c).unwrap(), CursorStatus::End);

        kv.destroy_cursor(c).unwrap();
        assert_eq!(kv.live_cursors(), 0);
    }

    #[test]
    fn test_lower_bound_clamps_to_prefix() {
        let kv = kv_with(&[(b"a1", b""), (b"b1", b""), (b"b5", b""), (b"c1", b"")]);
        let c = kv.create_cursor(scope(), b"b").unwrap();

        assert_eq!(kv.cursor_lower_bound(c, b"").unwrap(), CursorStatus::Ok);
        assert_eq!(kv.cursor_key_vec(c).unwrap(), Some(b"b1".to_vec()));
        assert_eq!(kv.cursor_lower_bound(c, b"b2").unwrap(), CursorStatus::Ok);
        assert_eq!(kv.cursor_key_vec(c).unwrap(), Some(b"b5".to_vec()));
        assert_eq!(kv.cursor_lower_bound(c, b"b6").unwrap(), CursorStatus::End);
        assert_eq!(kv.cursor_key_vec(c).unwrap(), None);
    }

    #[test]
    fn test_erased_cursor_keeps_position() {
        let kv = kv_with(&[(b"k1", b""), (b"k2", b""), (b"k3", b"")]);
        let c = kv.create_cursor(scope(), b"k").unwrap();
        kv.cursor_lower_bound(c, b"k2").unwrap();

        kv.erase(scope(), b"k2").unwrap();
        assert_eq!(kv.cursor_status(c).unwrap(), CursorStatus::Erased);
        assert_eq!(kv.cursor_value(c, 0, &mut []).unwrap(), (CursorStatus::Erased, 0));

        assert_eq!(kv.cursor_next(c).unwrap(), CursorStatus::Ok);
        assert_eq!(kv.cursor_key_vec(c).unwrap(), Some(b"k3".to_vec()));
    }

    #[test]
    fn test_compare() {
        let kv = kv_with(&[(b"p1", b""), (b"p2", b"")]);
        let a = kv.create_cursor(scope(), b"p").unwrap();
        let b = kv.create_cursor(scope(), b"p").unwrap();
        assert_eq!(kv.cursor_compare(a, b).unwrap(), Ordering::Equal);

        kv.cursor_lower_bound(a, b"p1").unwrap();
        assert_eq!(kv.cursor_compare(a, b).unwrap(), Ordering::Less);
        kv.cursor_lower_bound(b, b"p2").unwrap();
        assert_eq!(kv.cursor_compare(a, b).unwrap(), Ordering::Less);
        assert_eq!(kv.cursor_compare(b, a).unwrap(), Ordering::Greater);

        assert_eq!(kv.cursor_key_compare(a, b"p1").unwrap(), Ordering::Equal);
        assert_eq!(kv.cursor_key_compare(a, b"p0").unwrap(), Ordering::Greater);
        kv.cursor_move_to_end(a).unwrap();
        assert_eq!(kv.cursor_key_compare(a, b"zzz").unwrap(), Ordering::Greater);

        let other = kv.create_cursor(scope(), b"q").unwrap();
        assert!(matches!(kv.cursor_compare(a, other), Err(KvError::CursorMismatch)));
    }

    #[test]
    fn test_payer_accounting() {
        let config = KvConfig {
            billable_overhead: 10,
            ..Default::default()
        };
        let kv = MemoryKv::with_config(config);
        let alice: Name = "alice".parse().unwrap();
        let bob: Name = "bob".parse().unwrap();

        assert_eq!(kv.set(scope(), b"key", b"12345", alice).unwrap(), 18);
        assert_eq!(kv.usage(alice), 18);

        // overwrite re-bills to the new payer
        kv.set(scope(), b"key", b"1", bob).unwrap();
        assert_eq!(kv.usage(alice), 0);
        assert_eq!(kv.usage(bob), 14);
        assert_eq!(kv.payer_of(scope(), b"key"), Some(bob));

        assert_eq!(kv.erase(scope(), b"key").unwrap(), -14);
        assert_eq!(kv.usage(bob), 0);
        assert_eq!(kv.erase(scope(), b"key").unwrap(), 0);
    }

    #[test]
    fn test_limits() {
        let config = KvConfig::default().with_limits(KvLimits {
            max_key_size: 4,
            max_value_size: 4,
            max_iterators: 1,
        });
        let kv = MemoryKv::with_config(config);

        assert!(matches!(
            kv.set(scope(), b"12345", b"", scope()),
            Err(KvError::LimitExceeded(_))
        ));
        assert!(matches!(
            kv.set(scope(), b"k", b"12345", scope()),
            Err(KvError::LimitExceeded(_))
        ));

        let c = kv.create_cursor(scope(), b"").unwrap();
        assert!(kv.create_cursor(scope(), b"").is_err());
        kv.destroy_cursor(c).unwrap();
        assert!(kv.create_cursor(scope(), b"").is_ok());
    }

    #[test]
    fn test_destroy_twice_is_an_error() {
        let kv = MemoryKv::new();
        let c = kv.create_cursor(scope(), b"").unwrap();
        kv.destroy_cursor(c).unwrap();
        assert!(matches!(kv.destroy_cursor(c), Err(KvError::InvalidCursor(_))));
    }

    #[test]
    fn test_transact_rolls_back() {
        let kv = kv_with(&[(b"keep", b"old")]);
        let before = kv.dump(scope());
        let usage = kv.usage(scope());

        let result: Result<()> = kv.transact(|kv| {
            kv.set(scope(), b"keep", b"new", scope())?;
            kv.set(scope(), b"extra", b"v", scope())?;
            kv.erase(scope(), b"keep")?;
            Err(KvError::KeyNotFound)
        });
        assert!(result.is_err());
        assert_eq!(kv.dump(scope()), before);
        assert_eq!(kv.usage(scope()), usage);

        kv.transact(|kv| kv.set(scope(), b"extra", b"v", scope())).unwrap();
        assert_eq!(kv.len(scope()), 2);
    }

    #[test]
    fn test_transact_does_not_nest() {
        let kv = MemoryKv::new();
        let result = kv.transact(|kv| kv.transact(|_| Ok(())));
        assert!(matches!(result, Err(KvError::SubstrateFailure(_))));
    }

    #[test]
    fn test_panicking_unit_of_work_rolls_back() {
        let kv = MemoryKv::new();
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = kv.transact(|kv| {
                kv.set(scope(), b"k", b"v", scope())?;
                panic!("writer failed");
            });
        }));
        assert!(unwound.is_err());

        // the write made before the panic is gone
        assert!(!kv.contains(scope(), b"k").unwrap());
        kv.transact(|kv| kv.set(scope(), b"k2", b"v", scope())).unwrap();
        assert_eq!(kv.len(scope()), 1);
    }

    #[test]
    fn test_cursor_ids_skip_live_handles() {
        let kv = MemoryKv::new();
        let live = kv.create_cursor(scope(), b"").unwrap();
        kv.inner.lock().next_cursor = live;

        let fresh = kv.create_cursor(scope(), b"").unwrap();
        assert_ne!(fresh, live);
        assert_eq!(kv.live_cursors(), 2);

        kv.inner.lock().next_cursor = CursorId::MAX;
        let wrapped = kv.create_cursor(scope(), b"").unwrap();
        assert_eq!(wrapped, CursorId::MAX);
        let after = kv.create_cursor(scope(), b"").unwrap();
        assert!(after != live && after != fresh && after != 0);
        assert_eq!(kv.live_cursors(), 4);
    }

    #[test]
    fn test_owned_reads_do_not_mix_across_threads() {
        let kv = kv_with(&[(b"a", b"value-a"), (b"b", b"value-bb")]);
        let c = kv.create_cursor(scope(), b"a").unwrap();
        kv.cursor_next(c).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..10_000 {
                    assert_eq!(kv.read(scope(), b"a").unwrap(), Some(b"value-a".to_vec()));
                    assert_eq!(kv.cursor_value_vec(c).unwrap(), Some(b"value-a".to_vec()));
                }
            });
            s.spawn(|| {
                for _ in 0..10_000 {
                    assert_eq!(kv.read(scope(), b"b").unwrap(), Some(b"value-bb".to_vec()));
                }
            });
        });
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_successor(&[0xff, 0xff]), None);
        assert_eq!(prefix_successor(b""), None);
    }
}
