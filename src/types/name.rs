//! Packed 64-bit names
//!
//! Scopes, tables and indices are addressed by short names packed into a
//! `u64` with a 5-bit alphabet (`.12345abcdefghijklmnopqrstuvwxyz`).
//! Up to 12 characters use 5 bits each; a 13th character gets the last
//! 4 bits and must therefore be one of `.12345abcdefghij`.
//!
//! Packing is order-preserving for names of the same shape, which keeps the
//! big-endian key encoding of a name sortable.

use crate::{KvError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Maximum number of characters in a name
pub const MAX_NAME_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(u64);

impl Name {
    /// Wrap an already packed value
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw packed value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The empty name (packs to zero)
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parse and pack a name
    pub fn new(s: &str) -> Result<Self> {
        if s.len() > MAX_NAME_LEN {
            return Err(KvError::InvalidName(format!(
                "'{}' is longer than {} characters",
                s, MAX_NAME_LEN
            )));
        }

        let mut value = 0u64;
        for (i, c) in s.bytes().enumerate() {
            let v = char_to_value(c).ok_or_else(|| {
                KvError::InvalidName(format!("'{}' contains invalid character '{}'", s, c as char))
            })?;

            if i < 12 {
                value |= (v & 0x1f) << (64 - 5 * (i as u64 + 1));
            } else {
                if v > 0x0f {
                    return Err(KvError::InvalidName(format!(
                        "thirteenth character of '{}' must be in [.1-5a-j]",
                        s
                    )));
                }
                value |= v & 0x0f;
            }
        }

        Ok(Self(value))
    }
}

fn char_to_value(c: u8) -> Option<u64> {
    match c {
        b'.' => Some(0),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        _ => None,
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [b'.'; MAX_NAME_LEN];
        let mut tmp = self.0;
        for i in 0..MAX_NAME_LEN {
            let mask = if i == 0 { 0x0f } else { 0x1f };
            buf[MAX_NAME_LEN - 1 - i] = CHARMAP[(tmp & mask) as usize];
            tmp >>= if i == 0 { 4 } else { 5 };
        }

        let end = buf.iter().rposition(|&c| c != b'.').map_or(0, |p| p + 1);
        // CHARMAP is ASCII
        f.write_str(std::str::from_utf8(&buf[..end]).map_err(|_| fmt::Error)?)
    }
}

impl FromStr for Name {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Name {
    type Error = KvError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl TryFrom<&str> for Name {
    type Error = KvError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.to_string()
    }
}

impl From<Name> for u64 {
    fn from(name: Name) -> Self {
        name.0
    }
}
