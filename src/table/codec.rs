//! Record payload codec
//!
//! Records are stored with bincode's default options (varint integers).
//! Plain records are written as the pair `(0u32, record)`; the leading tag is
//! reserved for schema evolution. Enum records are self-describing and are
//! written as-is. Since bincode writes an enum's variant index as the same
//! varint, a plain record stored today reads back as variant `0` of an enum
//! whose first variant wraps it.

use crate::{KvError, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Tag written ahead of every plain record
pub const RECORD_TAG: u32 = 0;

/// How a record type frames its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `(tag, record)`
    Tagged,
    /// The record alone; for enum records that carry their own discriminator
    SelfDescribing,
}

/// A record type that can be stored in a table
pub trait TableRecord: Serialize + DeserializeOwned + 'static {
    const FRAMING: Framing = Framing::Tagged;
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
}

/// Serialize a record into its stored payload
pub fn pack<T: TableRecord>(record: &T) -> Result<Vec<u8>> {
    let bytes = match T::FRAMING {
        Framing::Tagged => options().serialize(&(RECORD_TAG, record))?,
        Framing::SelfDescribing => options().serialize(record)?,
    };
    Ok(bytes)
}

/// Deserialize a stored payload
pub fn unpack<T: TableRecord>(bytes: &[u8]) -> Result<T> {
    match T::FRAMING {
        Framing::Tagged => {
            let found: u32 = options().allow_trailing_bytes().deserialize(bytes)?;
            if found != RECORD_TAG {
                return Err(KvError::SchemaTagMismatch {
                    expected: RECORD_TAG,
                    found,
                });
            }
            let (_, record): (u32, T) = options().deserialize(bytes)?;
            Ok(record)
        }
        Framing::SelfDescribing => Ok(options().deserialize(bytes)?),
    }
}

/// Size of the payload `pack` would produce
pub fn packed_size<T: TableRecord>(record: &T) -> Result<u64> {
    let size = match T::FRAMING {
        Framing::Tagged => options().serialized_size(&(RECORD_TAG, record))?,
        Framing::SelfDescribing => options().serialized_size(record)?,
    };
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: u64,
        owner: String,
    }

    impl TableRecord for Account {}

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AccountV2 {
        id: u64,
        owner: String,
        frozen: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum AnyAccount {
        V1(Account),
        V2(AccountV2),
    }

    impl TableRecord for AnyAccount {
        const FRAMING: Framing = Framing::SelfDescribing;
    }

    fn account() -> Account {
        Account {
            id: 7,
            owner: "alice".into(),
        }
    }

    #[test]
    fn test_tagged_payload() {
        let bytes = pack(&account()).unwrap();
        assert_eq!(bytes[0], 0);
        assert_eq!(packed_size(&account()).unwrap(), bytes.len() as u64);
        assert_eq!(unpack::<Account>(&bytes).unwrap(), account());
    }

    #[test]
    fn test_tag_mismatch() {
        let mut bytes = pack(&account()).unwrap();
        bytes[0] = 1;
        match unpack::<Account>(&bytes) {
            Err(KvError::SchemaTagMismatch { expected, found }) => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_plain_record_reads_as_first_variant() {
        let bytes = pack(&account()).unwrap();
        assert_eq!(unpack::<AnyAccount>(&bytes).unwrap(), AnyAccount::V1(account()));

        let v2 = AnyAccount::V2(AccountV2 {
            id: 7,
            owner: "alice".into(),
            frozen: true,
        });
        let bytes = pack(&v2).unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(unpack::<AnyAccount>(&bytes).unwrap(), v2);

        // a newer variant is not a plain record
        assert!(matches!(
            unpack::<Account>(&bytes),
            Err(KvError::SchemaTagMismatch { found: 1, .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = pack(&account()).unwrap();
        bytes.extend_from_slice(&[9, 9, 9]);
        assert!(matches!(unpack::<Account>(&bytes), Err(KvError::Serialization(_))));

        let mut bytes = pack(&AnyAccount::V1(account())).unwrap();
        bytes.push(9);
        assert!(matches!(unpack::<AnyAccount>(&bytes), Err(KvError::Serialization(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = pack(&account()).unwrap();
        assert!(matches!(
            unpack::<Account>(&bytes[..2]),
            Err(KvError::Serialization(_))
        ));
    }
}
