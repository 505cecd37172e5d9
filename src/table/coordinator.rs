//! Untyped put/erase protocol
//!
//! Works on full keys and raw payloads only. The typed `Table` supplies the
//! keys of the incoming record and a way to derive the keys of a stored
//! payload.
//!
//! `put` reads everything it needs, checks every write against the store's
//! size limits and decides one action per secondary before the first write.
//! A consistency violation or an oversized record therefore leaves the store
//! untouched.

use crate::key::FullKey;
use crate::storage::KvSubstrate;
use crate::types::Name;
use crate::{KvError, Result};
use tracing::debug;

/// Full key of a record under one secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SecondaryKey {
    pub(crate) index: Name,
    pub(crate) key: FullKey,
}

/// Every full key a record occupies
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordKeys {
    pub(crate) primary: FullKey,
    pub(crate) secondaries: Vec<SecondaryKey>,
}

/// What `put` does to one secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SecondaryAction {
    Insert,
    Keep,
    Replace { old: FullKey },
}

/// Result of a successful put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    /// No record with this primary key existed before
    pub inserted: bool,
    /// Secondary entries written (inserted or moved)
    pub secondary_writes: usize,
}

fn check_size(what: &str, size: usize, limit: Option<u32>) -> Result<()> {
    match limit {
        Some(limit) if size > limit as usize => Err(KvError::LimitExceeded(format!(
            "{} of {} bytes exceeds {}",
            what, size, limit
        ))),
        _ => Ok(()),
    }
}

/// Reject a record any of whose writes the store would refuse
fn check_limits<S: KvSubstrate + ?Sized>(kv: &S, keys: &RecordKeys, payload: &[u8]) -> Result<()> {
    let max_key = kv.max_key_size();
    let max_value = kv.max_value_size();
    check_size("key", keys.primary.len(), max_key)?;
    check_size("value", payload.len(), max_value)?;
    // secondary entries hold the primary key as their value
    check_size("value", keys.primary.len(), max_value)?;
    for sec in &keys.secondaries {
        check_size("key", sec.key.len(), max_key)?;
    }
    Ok(())
}

/// Decide the action for every secondary without writing anything
pub(crate) fn plan_put<S, F>(
    kv: &S,
    scope: Name,
    keys: &RecordKeys,
    payload: &[u8],
    old_keys: F,
) -> Result<(bool, Vec<SecondaryAction>)>
where
    S: KvSubstrate + ?Sized,
    F: FnOnce(&[u8]) -> Result<RecordKeys>,
{
    check_limits(kv, keys, payload)?;

    let old = match kv.read(scope, keys.primary.as_bytes())? {
        Some(payload) => Some(old_keys(&payload)?),
        None => None,
    };

    let mut actions = Vec::with_capacity(keys.secondaries.len());
    for (i, sec) in keys.secondaries.iter().enumerate() {
        let pointer = kv.read(scope, sec.key.as_bytes())?;
        let action = match (&old, pointer) {
            (None, Some(_)) => {
                return Err(KvError::DuplicateSecondaryKey { index: sec.index });
            }
            (None, None) => SecondaryAction::Insert,
            (Some(_), Some(pointer)) => {
                if pointer != keys.primary.as_bytes() {
                    return Err(KvError::SecondaryKeyConflict { index: sec.index });
                }
                SecondaryAction::Keep
            }
            (Some(old), None) => {
                let previous = old.secondaries.get(i).ok_or_else(|| {
                    KvError::SubstrateFailure(format!(
                        "stored record has no key for secondary index {}",
                        sec.index
                    ))
                })?;
                SecondaryAction::Replace {
                    old: previous.key.clone(),
                }
            }
        };
        actions.push(action);
    }

    Ok((old.is_none(), actions))
}

/// Store a record: secondaries first, primary last, all billed to `scope`
pub(crate) fn put<S, F>(kv: &S, scope: Name, keys: &RecordKeys, payload: &[u8], old_keys: F) -> Result<PutOutcome>
where
    S: KvSubstrate + ?Sized,
    F: FnOnce(&[u8]) -> Result<RecordKeys>,
{
    let (inserted, actions) = plan_put(kv, scope, keys, payload, old_keys)?;

    let pointer = keys.primary.as_bytes();
    let mut secondary_writes = 0;
    for (sec, action) in keys.secondaries.iter().zip(&actions) {
        match action {
            SecondaryAction::Keep => {}
            SecondaryAction::Insert => {
                kv.set(scope, sec.key.as_bytes(), pointer, scope)?;
                secondary_writes += 1;
            }
            SecondaryAction::Replace { old } => {
                kv.erase(scope, old.as_bytes())?;
                kv.set(scope, sec.key.as_bytes(), pointer, scope)?;
                secondary_writes += 1;
            }
        }
    }
    kv.set(scope, pointer, payload, scope)?;

    debug!(
        %scope,
        key = %keys.primary,
        inserted,
        secondary_writes,
        "put record"
    );
    Ok(PutOutcome {
        inserted,
        secondary_writes,
    })
}

/// Remove the record stored at `primary`, if any. Secondary keys are
/// derived from the stored payload.
pub(crate) fn erase<S, F>(kv: &S, scope: Name, primary: &FullKey, stored_keys: F) -> Result<bool>
where
    S: KvSubstrate + ?Sized,
    F: FnOnce(&[u8]) -> Result<RecordKeys>,
{
    let payload = match kv.read(scope, primary.as_bytes())? {
        Some(payload) => payload,
        None => return Ok(false),
    };
    let keys = stored_keys(&payload)?;

    for sec in &keys.secondaries {
        kv.erase(scope, sec.key.as_bytes())?;
    }
    kv.erase(scope, primary.as_bytes())?;

    debug!(%scope, key = %primary, secondaries = keys.secondaries.len(), "erased record");
    Ok(true)
}
