//! Value types shared across the crate

mod name;

pub use name::{Name, MAX_NAME_LEN};
