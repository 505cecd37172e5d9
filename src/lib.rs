//! MoteKV: indexed tables over a sorted key-value store
//!
//! ## Layers
//! - key: order-preserving key encoding, table/index prefixes
//! - storage: the `KvSubstrate` contract, RAII cursors, an in-memory store
//! - table: primary/secondary index maintenance, iterators, typed records
//!
//! ## Example
//! ```
//! use motekv::{MemoryKv, Name, TableBuilder, TableRecord};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User { id: u64, email: String }
//! impl TableRecord for User {}
//!
//! let kv = MemoryKv::new();
//! let mut users = TableBuilder::<User>::new("users");
//! users.primary("id", |u: &User| u.id);
//! let by_email = users.secondary("email", |u: &User| u.email.clone());
//! let users = users.build(Name::new("app").unwrap(), &kv).unwrap();
//!
//! users.put(&User { id: 1, email: "a@x".into() }).unwrap();
//! let found = users.index(by_email).unwrap().at("a@x").unwrap();
//! assert_eq!(found.id, 1);
//! ```

pub mod config;
pub mod key;
pub mod storage;
pub mod table;
pub mod types;

mod error;

pub use config::{KvConfig, KvLimits};
pub use error::{KvError, Result};
pub use key::{make_key, make_prefix, FullKey, PartialKey, ToKey};
pub use storage::{Cursor, CursorStatus, KvSubstrate, MemoryKv};
pub use table::{
    Framing, IndexIter, IndexRef, PutOutcome, RevIndexIter, Singleton, Table, TableBuilder, TableRecord,
};
pub use types::Name;
