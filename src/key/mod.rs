//! Key codec
//!
//! - `PartialKey`: an encoded value without any table scoping
//! - `FullKey`: `prefix ++ partial_key`, the key actually stored in the substrate
//! - prefix: `encode((status, table, index))`, fixed at 17 bytes

mod encode;

pub use encode::{make_key, ToKey};

use crate::types::Name;
use crate::{KvError, Result};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Status byte of every prefix written by this version of the layout
pub const DEFAULT_KEY_STATUS: u8 = 1;

/// Status byte reserved for singletons (`encode((2u64, name))`)
pub const SINGLETON_KEY_STATUS: u64 = 2;

/// Length of every table/index prefix: status + two packed names
pub const PREFIX_LEN: usize = 1 + 8 + 8;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Encoded key bytes, not yet scoped to a table index
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartialKey(Vec<u8>);

impl PartialKey {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl Add for PartialKey {
    type Output = PartialKey;

    fn add(mut self, rhs: PartialKey) -> PartialKey {
        self.0.extend_from_slice(&rhs.0);
        self
    }
}

impl<'a> Add<&'a PartialKey> for PartialKey {
    type Output = PartialKey;

    fn add(mut self, rhs: &'a PartialKey) -> PartialKey {
        self.0.extend_from_slice(&rhs.0);
        self
    }
}

impl AddAssign<&PartialKey> for PartialKey {
    fn add_assign(&mut self, rhs: &PartialKey) {
        self.0.extend_from_slice(&rhs.0);
    }
}

impl AsRef<[u8]> for PartialKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The substrate key: table/index prefix followed by the encoded index key
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FullKey(Vec<u8>);

impl FullKey {
    pub fn new(prefix: &PartialKey, key: &PartialKey) -> Self {
        let mut bytes = Vec::with_capacity(prefix.len() + key.len());
        bytes.extend_from_slice(prefix.as_bytes());
        bytes.extend_from_slice(key.as_bytes());
        Self(bytes)
    }

    /// Wrap raw bytes read back from the substrate
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &PartialKey) -> bool {
        self.0.starts_with(prefix.as_bytes())
    }

    /// The part after `prefix`, if this key lives under it
    pub fn strip_prefix(&self, prefix: &PartialKey) -> Option<PartialKey> {
        self.0
            .strip_prefix(prefix.as_bytes())
            .map(|rest| PartialKey::from_vec(rest.to_vec()))
    }

    /// Lowercase hex, two characters per byte, no separators
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() % 2 != 0 {
            return Err(KvError::InvalidHex(format!("odd length {}", s.len())));
        }

        let mut out = Vec::with_capacity(s.len() / 2);
        for pair in s.as_bytes().chunks_exact(2) {
            let hi = hex_value(pair[0])?;
            let lo = hex_value(pair[1])?;
            out.push((hi << 4) | lo);
        }

        Ok(Self(out))
    }
}

impl fmt::Debug for FullKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FullKey({})", self.to_hex())
    }
}

impl fmt::Display for FullKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for FullKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0f) as usize] as char);
    }
    s
}

fn hex_value(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(KvError::InvalidHex(format!("invalid character '{}'", c as char))),
    }
}

/// Prefix shared by every entry of one index of one table
pub fn make_prefix(table: Name, index: Name, status: u8) -> PartialKey {
    make_key(&(status, table, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_prefix_is_fixed_width() {
        let a = make_prefix(name("t"), name("i"), DEFAULT_KEY_STATUS);
        let b = make_prefix(name("testtable"), name("fullname"), DEFAULT_KEY_STATUS);
        assert_eq!(a.len(), PREFIX_LEN);
        assert_eq!(b.len(), PREFIX_LEN);
        assert_eq!(a.as_bytes()[0], 1);
    }

    #[test]
    fn test_concatenation_is_associative() {
        let a = make_key(&1u32);
        let b = make_key("bee");
        let c = make_key(&Some(-3i16));
        assert_eq!((a.clone() + &b) + &c, a + (b + c));
    }

    #[test]
    fn test_full_key_layout() {
        let prefix = make_prefix(name("people"), name("id"), 1);
        let key = make_key(&7u64);
        let full = FullKey::new(&prefix, &key);
        assert_eq!(full.len(), PREFIX_LEN + 8);
        assert!(full.starts_with(&prefix));
        assert_eq!(full.strip_prefix(&prefix), Some(key));
    }

    #[test]
    fn test_hex_roundtrip() {
        let full = FullKey::from_vec(vec![0x00, 0x0f, 0xa0, 0xff, 0x42]);
        let hex = full.to_hex();
        assert_eq!(hex, "000fa0ff42");
        assert_eq!(FullKey::from_hex(&hex).unwrap(), full);
        assert_eq!(FullKey::from_hex("000FA0FF42").unwrap(), full);
        assert_eq!(FullKey::from_hex("").unwrap(), FullKey::default());
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(matches!(FullKey::from_hex("abc"), Err(KvError::InvalidHex(_))));
        assert!(matches!(FullKey::from_hex("zz"), Err(KvError::InvalidHex(_))));
    }

    #[test]
    fn test_prefixes_of_different_indices_do_not_overlap() {
        let p1 = make_prefix(name("people"), name("id"), 1);
        let p2 = make_prefix(name("people"), name("name"), 1);
        let k1 = FullKey::new(&p1, &make_key("zzzz"));
        assert!(!k1.starts_with(&p2));
    }
}
