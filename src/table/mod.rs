//! Indexed tables
//!
//! A table stores records of one type under a mandatory primary index and
//! any number of secondary indices. The primary entry holds the serialized
//! record; each secondary entry holds the primary full key.
//!
//! ```text
//! prefix(table, primary)   ++ pk      -> pack(record)
//! prefix(table, secondary) ++ sk_i    -> prefix(table, primary) ++ pk
//! ```
//!
//! Tables are declared with a `TableBuilder`, which hands out typed
//! `IndexId` tokens and binds every index prefix once in `build`.

mod codec;
mod coordinator;
mod index;
mod iter;
mod singleton;

pub use coordinator::PutOutcome;
pub use codec::{pack, packed_size, unpack, Framing, TableRecord, RECORD_TAG};
pub use index::{IndexDescriptor, IndexId, IndexKind};
pub use iter::{IndexIter, Keys, Records, RevIndexIter};
pub use singleton::Singleton;

use coordinator::{RecordKeys, SecondaryKey};
use crate::config::KvConfig;
use crate::key::{make_key, FullKey, PartialKey, ToKey, DEFAULT_KEY_STATUS};
use crate::storage::KvSubstrate;
use crate::types::Name;
use crate::{KvError, Result};
use ahash::AHashSet;
use index::{BoundIndex, KeyFn};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

struct IndexDecl<T> {
    name: String,
    kind: IndexKind,
    extract: KeyFn<T>,
}

/// Declares the indices of a table before it is bound to a substrate
pub struct TableBuilder<T> {
    table: String,
    key_status: u8,
    decls: Vec<IndexDecl<T>>,
}

impl<T: TableRecord> TableBuilder<T> {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            key_status: DEFAULT_KEY_STATUS,
            decls: Vec::new(),
        }
    }

    /// Status byte used for every prefix of this table
    pub fn key_status(mut self, status: u8) -> Self {
        self.key_status = status;
        self
    }

    /// Take the prefix status byte from `config`
    pub fn with_config(self, config: &KvConfig) -> Self {
        self.key_status(config.key_status)
    }

    fn declare<K, F>(&mut self, name: &str, kind: IndexKind, key_fn: F) -> IndexId<K>
    where
        K: ToKey + 'static,
        F: Fn(&T) -> K + 'static,
    {
        let position = self.decls.len();
        self.decls.push(IndexDecl {
            name: name.to_string(),
            kind,
            extract: Box::new(move |record| make_key(&key_fn(record))),
        });
        // Names are validated in `build`; an invalid one fails the whole table.
        let table = Name::new(&self.table).unwrap_or_default();
        let index = Name::new(name).unwrap_or_default();
        IndexId::new(position, table, index)
    }

    /// Declare the primary index. Exactly one is required.
    pub fn primary<K, F>(&mut self, name: &str, key_fn: F) -> IndexId<K>
    where
        K: ToKey + 'static,
        F: Fn(&T) -> K + 'static,
    {
        self.declare(name, IndexKind::Primary, key_fn)
    }

    /// Declare a secondary index. Secondary keys must be unique per record.
    pub fn secondary<K, F>(&mut self, name: &str, key_fn: F) -> IndexId<K>
    where
        K: ToKey + 'static,
        F: Fn(&T) -> K + 'static,
    {
        self.declare(name, IndexKind::Secondary, key_fn)
    }

    /// Validate the declarations and bind every index to `scope`
    pub fn build<S: KvSubstrate + ?Sized>(self, scope: Name, kv: &S) -> Result<Table<'_, T, S>> {
        let table = Name::new(&self.table)?;
        if table.is_empty() {
            return Err(KvError::Schema("table name must not be empty".into()));
        }
        if self.key_status == 0 {
            return Err(KvError::Schema("key status must be non-zero".into()));
        }

        let mut seen = AHashSet::new();
        let mut primary = None;
        let mut indices = Vec::with_capacity(self.decls.len());
        for (position, decl) in self.decls.into_iter().enumerate() {
            let name = Name::new(&decl.name)?;
            if name.is_empty() {
                return Err(KvError::Schema(format!("index name of {} must not be empty", table)));
            }
            if !seen.insert(name) {
                return Err(KvError::Schema(format!("duplicate index {} on {}", name, table)));
            }
            if decl.kind == IndexKind::Primary {
                if primary.is_some() {
                    return Err(KvError::Schema(format!("{} declares more than one primary index", table)));
                }
                primary = Some(position);
            }
            let descriptor = IndexDescriptor::bind(scope, table, name, decl.kind, self.key_status);
            indices.push(BoundIndex::new(descriptor, decl.extract));
        }

        let primary =
            primary.ok_or_else(|| KvError::Schema(format!("{} declares no primary index", table)))?;

        debug!(%scope, %table, indices = indices.len(), "bound table");
        Ok(Table {
            kv,
            scope,
            name: table,
            indices,
            primary,
        })
    }
}

/// A table bound to a scope of a substrate
pub struct Table<'s, T, S: KvSubstrate + ?Sized> {
    kv: &'s S,
    scope: Name,
    name: Name,
    indices: Vec<BoundIndex<T>>,
    primary: usize,
}

impl<'s, T: TableRecord, S: KvSubstrate + ?Sized> Table<'s, T, S> {
    pub fn builder(table: &str) -> TableBuilder<T> {
        TableBuilder::new(table)
    }

    pub fn scope(&self) -> Name {
        self.scope
    }

    pub fn name(&self) -> Name {
        self.name
    }

    pub fn substrate(&self) -> &'s S {
        self.kv
    }

    /// Every bound index in declaration order
    pub fn descriptors(&self) -> impl Iterator<Item = &IndexDescriptor> + '_ {
        self.indices.iter().map(|i| &i.descriptor)
    }

    pub(crate) fn descriptor_at(&self, position: usize) -> &IndexDescriptor {
        &self.indices[position].descriptor
    }

    fn secondaries(&self) -> impl Iterator<Item = &BoundIndex<T>> + '_ {
        let primary = self.primary;
        self.indices
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != primary)
            .map(|(_, index)| index)
    }

    fn keys_of(&self, record: &T) -> RecordKeys {
        RecordKeys {
            primary: self.indices[self.primary].full_key(record),
            secondaries: self
                .secondaries()
                .map(|index| SecondaryKey {
                    index: index.descriptor.name(),
                    key: index.full_key(record),
                })
                .collect(),
        }
    }

    fn keys_of_payload(&self, payload: &[u8]) -> Result<RecordKeys> {
        let stored: T = unpack(payload)?;
        Ok(self.keys_of(&stored))
    }

    /// Turn a raw value read from an index into a record
    pub(crate) fn resolve(&self, position: usize, raw: Vec<u8>) -> Result<T> {
        if position == self.primary {
            return unpack(&raw);
        }
        let payload = self.kv.read(self.scope, &raw)?.ok_or_else(|| {
            KvError::SubstrateFailure(format!(
                "secondary index {} points to missing primary entry {}",
                self.descriptor_at(position).name(),
                FullKey::from_vec(raw.clone())
            ))
        })?;
        unpack(&payload)
    }

    /// Insert `record`, or replace the record with the same primary key.
    ///
    /// Fails with `DuplicateSecondaryKey` or `SecondaryKeyConflict` before
    /// anything is written if a secondary key belongs to another record.
    pub fn put(&self, record: &T) -> Result<PutOutcome> {
        let keys = self.keys_of(record);
        let payload = pack(record)?;
        coordinator::put(self.kv, self.scope, &keys, &payload, |stored| {
            self.keys_of_payload(stored)
        })
    }

    /// Remove the record with `record`'s primary key. Returns false if there
    /// was none.
    pub fn erase(&self, record: &T) -> Result<bool> {
        let primary = self.indices[self.primary].full_key(record);
        self.erase_full(&primary)
    }

    /// Remove the record stored under primary key `key`
    pub fn erase_by_key<Q: ToKey + ?Sized>(&self, key: &Q) -> Result<bool> {
        let primary = self.descriptor_at(self.primary).full_key(&make_key(key));
        self.erase_full(&primary)
    }

    fn erase_full(&self, primary: &FullKey) -> Result<bool> {
        coordinator::erase(self.kv, self.scope, primary, |stored| self.keys_of_payload(stored))
    }

    /// True if a record with `record`'s primary key is stored
    pub fn contains(&self, record: &T) -> Result<bool> {
        let primary = self.indices[self.primary].full_key(record);
        self.kv.contains(self.scope, primary.as_bytes())
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        let mut n = 0;
        for key in self.primary().keys()? {
            key?;
            n += 1;
        }
        Ok(n)
    }

    /// The primary index, keyed by already-encoded keys
    pub fn primary(&self) -> IndexRef<'_, T, S> {
        IndexRef::new(self, self.primary)
    }

    /// The index declared as `id`
    pub fn index<K: ?Sized>(&self, id: IndexId<K>) -> Result<IndexRef<'_, T, S, K>> {
        let declared_here = id.table == self.name
            && self
                .indices
                .get(id.position)
                .is_some_and(|i| i.descriptor.name() == id.name);
        if !declared_here {
            return Err(KvError::Schema(format!("{:?} is not an index of {}", id, self.name)));
        }
        Ok(IndexRef::new(self, id.position))
    }

    /// Look an index up by name, keyed by already-encoded keys
    pub fn by_name(&self, name: &str) -> Result<IndexRef<'_, T, S>> {
        let name = Name::new(name)?;
        self.indices
            .iter()
            .position(|i| i.descriptor.name() == name)
            .map(|position| IndexRef::new(self, position))
            .ok_or_else(|| KvError::Schema(format!("{} has no index {}", self.name, name)))
    }
}

impl<T, S: KvSubstrate + ?Sized> fmt::Debug for Table<'_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Name> = self.indices.iter().map(|i| i.descriptor.name()).collect();
        f.debug_struct("Table")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("indices", &names)
            .field("primary", &self.primary)
            .finish()
    }
}

/// One index of a table.
///
/// `K` is the index's key type. Lookups accept any `Q` the key type borrows
/// as, so a `String` index can be searched with a `&str`. Every lookup also
/// has a `_partial` form taking an encoded key and a `_full` form taking a
/// full key.
pub struct IndexRef<'a, T, S: KvSubstrate + ?Sized, K: ?Sized = PartialKey> {
    table: &'a Table<'a, T, S>,
    position: usize,
    _key: PhantomData<fn(&K)>,
}

impl<'a, T: TableRecord, S: KvSubstrate + ?Sized, K: ?Sized> IndexRef<'a, T, S, K> {
    fn new(table: &'a Table<'a, T, S>, position: usize) -> Self {
        Self {
            table,
            position,
            _key: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &'a IndexDescriptor {
        self.table.descriptor_at(self.position)
    }

    pub fn name(&self) -> Name {
        self.descriptor().name()
    }

    pub fn is_primary(&self) -> bool {
        self.position == self.table.primary
    }

    /// Full key of `key` under this index
    pub fn full_key<Q>(&self, key: &Q) -> FullKey
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.descriptor().full_key(&make_key(key))
    }

    pub fn find<Q>(&self, key: &Q) -> Result<IndexIter<'a, T, S>>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.find_full(&self.full_key(key))
    }

    pub fn find_partial(&self, key: &PartialKey) -> Result<IndexIter<'a, T, S>> {
        self.find_full(&self.descriptor().full_key(key))
    }

    pub fn find_full(&self, key: &FullKey) -> Result<IndexIter<'a, T, S>> {
        IndexIter::find(self.table, self.position, key)
    }

    pub fn exists<Q>(&self, key: &Q) -> Result<bool>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.exists_full(&self.full_key(key))
    }

    pub fn exists_partial(&self, key: &PartialKey) -> Result<bool> {
        self.exists_full(&self.descriptor().full_key(key))
    }

    pub fn exists_full(&self, key: &FullKey) -> Result<bool> {
        self.table.kv.contains(self.table.scope, key.as_bytes())
    }

    /// The record under `key`, if any
    pub fn get<Q>(&self, key: &Q) -> Result<Option<T>>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.get_full(&self.full_key(key))
    }

    pub fn get_partial(&self, key: &PartialKey) -> Result<Option<T>> {
        self.get_full(&self.descriptor().full_key(key))
    }

    pub fn get_full(&self, key: &FullKey) -> Result<Option<T>> {
        match self.table.kv.read(self.table.scope, key.as_bytes())? {
            Some(raw) => Ok(Some(self.table.resolve(self.position, raw)?)),
            None => Ok(None),
        }
    }

    /// The record under `key`; `KeyNotFound` if there is none
    pub fn at<Q>(&self, key: &Q) -> Result<T>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.get(key)?.ok_or(KvError::KeyNotFound)
    }

    pub fn at_partial(&self, key: &PartialKey) -> Result<T> {
        self.get_partial(key)?.ok_or(KvError::KeyNotFound)
    }

    pub fn at_full(&self, key: &FullKey) -> Result<T> {
        self.get_full(key)?.ok_or(KvError::KeyNotFound)
    }

    /// First entry of the index, or end if it is empty
    pub fn begin(&self) -> Result<IndexIter<'a, T, S>> {
        self.lower_bound_partial(&PartialKey::new())
    }

    /// The end sentinel. Holds no cursor until stepped backwards.
    pub fn end(&self) -> IndexIter<'a, T, S> {
        IndexIter::end(self.table, self.position)
    }

    /// Last entry of the index, traversed toward smaller keys
    pub fn rbegin(&self) -> Result<RevIndexIter<'a, T, S>> {
        RevIndexIter::rbegin(self.table, self.position)
    }

    pub fn rend(&self) -> RevIndexIter<'a, T, S> {
        RevIndexIter::rend(self.table, self.position)
    }

    pub fn lower_bound<Q>(&self, key: &Q) -> Result<IndexIter<'a, T, S>>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.lower_bound_full(&self.full_key(key))
    }

    pub fn lower_bound_partial(&self, key: &PartialKey) -> Result<IndexIter<'a, T, S>> {
        self.lower_bound_full(&self.descriptor().full_key(key))
    }

    pub fn lower_bound_full(&self, key: &FullKey) -> Result<IndexIter<'a, T, S>> {
        IndexIter::lower_bound(self.table, self.position, key)
    }

    pub fn upper_bound<Q>(&self, key: &Q) -> Result<IndexIter<'a, T, S>>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.upper_bound_full(&self.full_key(key))
    }

    pub fn upper_bound_partial(&self, key: &PartialKey) -> Result<IndexIter<'a, T, S>> {
        self.upper_bound_full(&self.descriptor().full_key(key))
    }

    pub fn upper_bound_full(&self, key: &FullKey) -> Result<IndexIter<'a, T, S>> {
        IndexIter::upper_bound(self.table, self.position, key)
    }

    /// Records with keys in `[begin, end)`
    pub fn range<Q>(&self, begin: &Q, end: &Q) -> Result<Vec<T>>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        self.range_full(&self.full_key(begin), &self.full_key(end))
    }

    pub fn range_partial(&self, begin: &PartialKey, end: &PartialKey) -> Result<Vec<T>> {
        let d = self.descriptor();
        self.range_full(&d.full_key(begin), &d.full_key(end))
    }

    pub fn range_full(&self, begin: &FullKey, end: &FullKey) -> Result<Vec<T>> {
        let mut it = self.lower_bound_full(begin)?;
        let stop = self.lower_bound_full(end)?;
        let mut out = Vec::new();
        while it.compare(&stop)? == std::cmp::Ordering::Less {
            out.push(it.value()?);
            it.advance()?;
        }
        Ok(out)
    }

    /// Lazy form of `range`
    pub fn range_iter<Q>(&self, begin: &Q, end: &Q) -> Result<Records<'a, T, S>>
    where
        K: Borrow<Q>,
        Q: ToKey + ?Sized,
    {
        let it = self.lower_bound_full(&self.full_key(begin))?;
        Ok(Records::new(it, Some(self.full_key(end))))
    }

    /// Every record in key order
    pub fn iter(&self) -> Result<Records<'a, T, S>> {
        Ok(Records::new(self.begin()?, None))
    }

    /// Every key in order, without the index prefix
    pub fn keys(&self) -> Result<Keys<'a, T, S>> {
        Ok(Keys::new(self.begin()?, None))
    }
}

impl<T, S: KvSubstrate + ?Sized, K: ?Sized> Clone for IndexRef<'_, T, S, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, S: KvSubstrate + ?Sized, K: ?Sized> Copy for IndexRef<'_, T, S, K> {}

impl<T, S: KvSubstrate + ?Sized, K: ?Sized> fmt::Debug for IndexRef<'_, T, S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexRef")
            .field("table", &self.table.name)
            .field("index", &self.table.indices[self.position].descriptor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u64,
        tag: String,
    }

    impl TableRecord for Row {}

    fn scope() -> Name {
        "unit".parse().unwrap()
    }

    #[test]
    fn test_build_requires_one_primary() {
        let kv = MemoryKv::new();

        let mut b = TableBuilder::<Row>::new("rows");
        b.secondary("bytag", |r: &Row| r.tag.clone());
        assert!(matches!(b.build(scope(), &kv), Err(KvError::Schema(_))));

        let mut b = TableBuilder::<Row>::new("rows");
        b.primary("id", |r: &Row| r.id);
        b.primary("id2", |r: &Row| r.id);
        assert!(matches!(b.build(scope(), &kv), Err(KvError::Schema(_))));
    }

    #[test]
    fn test_build_rejects_bad_names() {
        let kv = MemoryKv::new();

        let mut b = TableBuilder::<Row>::new("rows");
        b.primary("id", |r: &Row| r.id);
        b.secondary("id", |r: &Row| r.tag.clone());
        assert!(matches!(b.build(scope(), &kv), Err(KvError::Schema(_))));

        let mut b = TableBuilder::<Row>::new("Rows!");
        b.primary("id", |r: &Row| r.id);
        assert!(matches!(b.build(scope(), &kv), Err(KvError::InvalidName(_))));

        let mut b = TableBuilder::<Row>::new("rows");
        b.primary("id", |r: &Row| r.id);
        assert!(b.key_status(0).build(scope(), &kv).is_err());
    }

    #[test]
    fn test_status_from_config() {
        let kv = MemoryKv::new();
        let config = KvConfig::default().with_key_status(3);
        let mut b = TableBuilder::<Row>::new("rows").with_config(&config);
        b.primary("id", |r: &Row| r.id);
        let rows = b.build(scope(), &kv).unwrap();

        rows.put(&Row { id: 1, tag: "t".into() }).unwrap();
        let stored = kv.dump(scope());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0[0], 3);
    }

    #[test]
    fn test_index_tokens_are_checked() {
        let kv = MemoryKv::new();

        let mut b = TableBuilder::<Row>::new("rows");
        b.primary("id", |r: &Row| r.id);
        let rows = b.build(scope(), &kv).unwrap();

        let mut other = TableBuilder::<Row>::new("other");
        other.primary("id", |r: &Row| r.id);
        let foreign = other.secondary("bytag", |r: &Row| r.tag.clone());

        assert!(rows.index(foreign).is_err());
        assert!(rows.by_name("bytag").is_err());
        assert!(rows.by_name("id").unwrap().is_primary());
    }

    fn first_record<T: TableRecord, S: KvSubstrate + ?Sized>(table: &Table<'_, T, S>) -> Result<Option<T>> {
        table.primary().iter()?.next().transpose()
    }

    #[test]
    fn test_builder_from_table() {
        let kv = MemoryKv::new();
        let mut b = Table::<Row, MemoryKv>::builder("rows");
        b.primary("id", |r: &Row| r.id);
        let rows = b.build(scope(), &kv).unwrap();

        assert_eq!(first_record(&rows).unwrap(), None);
        rows.put(&Row { id: 2, tag: "y".into() }).unwrap();
        assert_eq!(first_record(&rows).unwrap().map(|r| r.id), Some(2));
    }

    #[test]
    fn test_descriptors_in_declaration_order() {
        let kv = MemoryKv::new();
        let mut b = TableBuilder::<Row>::new("rows");
        b.secondary("bytag", |r: &Row| r.tag.clone());
        let id = b.primary("id", |r: &Row| r.id);
        let rows = b.build(scope(), &kv).unwrap();

        let names: Vec<String> = rows.descriptors().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["bytag", "id"]);
        assert!(rows.index(id).unwrap().is_primary());

        rows.put(&Row { id: 4, tag: "x".into() }).unwrap();
        assert_eq!(rows.index(id).unwrap().at(&4u64).unwrap().tag, "x");
        assert_eq!(rows.count().unwrap(), 1);
    }
}
