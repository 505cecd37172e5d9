//! Single-record storage
//!
//! A singleton lives at `encode((2u64, name))` in its scope. Table prefixes
//! start with a one-byte status, so the two layouts never collide.

use super::codec::{pack, unpack};
use super::TableRecord;
use crate::key::{make_key, FullKey, SINGLETON_KEY_STATUS};
use crate::storage::KvSubstrate;
use crate::types::Name;
use crate::Result;
use std::marker::PhantomData;
use tracing::debug;

pub struct Singleton<'s, T, S: KvSubstrate + ?Sized> {
    kv: &'s S,
    scope: Name,
    name: Name,
    key: FullKey,
    _record: PhantomData<fn() -> T>,
}

impl<'s, T: TableRecord, S: KvSubstrate + ?Sized> Singleton<'s, T, S> {
    pub fn new(kv: &'s S, scope: Name, name: &str) -> Result<Self> {
        let name = Name::new(name)?;
        let key = FullKey::from_vec(make_key(&(SINGLETON_KEY_STATUS, name)).into_vec());
        Ok(Self {
            kv,
            scope,
            name,
            key,
            _record: PhantomData,
        })
    }

    pub fn name(&self) -> Name {
        self.name
    }

    pub fn key(&self) -> &FullKey {
        &self.key
    }

    pub fn exists(&self) -> Result<bool> {
        self.kv.contains(self.scope, self.key.as_bytes())
    }

    pub fn get(&self) -> Result<Option<T>> {
        match self.kv.read(self.scope, self.key.as_bytes())? {
            Some(payload) => Ok(Some(unpack(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn get_or_default(&self) -> Result<T>
    where
        T: Default,
    {
        Ok(self.get()?.unwrap_or_default())
    }

    /// Store `value`, billed to the scope
    pub fn set(&self, value: &T) -> Result<()> {
        let payload = pack(value)?;
        self.kv.set(self.scope, self.key.as_bytes(), &payload, self.scope)?;
        debug!(scope = %self.scope, name = %self.name, size = payload.len(), "set singleton");
        Ok(())
    }

    /// Returns whether a value was removed
    pub fn remove(&self) -> Result<bool> {
        if !self.exists()? {
            return Ok(false);
        }
        self.kv.erase(self.scope, self.key.as_bytes())?;
        Ok(true)
    }
}
