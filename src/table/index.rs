//! Index declarations and bound descriptors

use crate::key::{make_prefix, FullKey, PartialKey};
use crate::types::Name;
use std::fmt;
use std::marker::PhantomData;

/// Role of an index within its table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Holds the serialized record
    Primary,
    /// Holds the primary full key of the record
    Secondary,
}

/// Typed handle to an index declared on a `TableBuilder`.
///
/// `K` is the key type returned by the index's key function.
pub struct IndexId<K: ?Sized> {
    pub(crate) position: usize,
    pub(crate) table: Name,
    pub(crate) name: Name,
    _key: PhantomData<fn(&K)>,
}

impl<K: ?Sized> IndexId<K> {
    pub(crate) fn new(position: usize, table: Name, name: Name) -> Self {
        Self {
            position,
            table,
            name,
            _key: PhantomData,
        }
    }

    pub fn name(&self) -> Name {
        self.name
    }
}

impl<K: ?Sized> Clone for IndexId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ?Sized> Copy for IndexId<K> {}

impl<K: ?Sized> fmt::Debug for IndexId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexId({}.{})", self.table, self.name)
    }
}

/// An index bound to a table: names, role and the prefix it scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    scope: Name,
    table: Name,
    name: Name,
    kind: IndexKind,
    prefix: PartialKey,
}

impl IndexDescriptor {
    pub(crate) fn bind(scope: Name, table: Name, name: Name, kind: IndexKind, status: u8) -> Self {
        Self {
            scope,
            table,
            name,
            kind,
            prefix: make_prefix(table, name, status),
        }
    }

    pub fn scope(&self) -> Name {
        self.scope
    }

    pub fn table(&self) -> Name {
        self.table
    }

    pub fn name(&self) -> Name {
        self.name
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn is_primary(&self) -> bool {
        self.kind == IndexKind::Primary
    }

    pub fn prefix(&self) -> &PartialKey {
        &self.prefix
    }

    /// `prefix ++ key`
    pub fn full_key(&self, key: &PartialKey) -> FullKey {
        FullKey::new(&self.prefix, key)
    }

    /// True if `key` lies in this index's scan range
    pub fn contains(&self, key: &FullKey) -> bool {
        key.starts_with(&self.prefix)
    }
}

pub(crate) type KeyFn<T> = Box<dyn Fn(&T) -> PartialKey>;

/// A descriptor together with the key function it was declared with
pub(crate) struct BoundIndex<T> {
    pub(crate) descriptor: IndexDescriptor,
    extract: KeyFn<T>,
}

impl<T> BoundIndex<T> {
    pub(crate) fn new(descriptor: IndexDescriptor, extract: KeyFn<T>) -> Self {
        Self { descriptor, extract }
    }

    pub(crate) fn partial_key(&self, record: &T) -> PartialKey {
        (self.extract)(record)
    }

    pub(crate) fn full_key(&self, record: &T) -> FullKey {
        self.descriptor.full_key(&self.partial_key(record))
    }
}
