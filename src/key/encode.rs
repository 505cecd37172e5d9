//! Order-preserving key encoding
//!
//! Byte-lexicographic order of two encodings equals the natural order of
//! the encoded values. The encoding is one-way: nothing here decodes keys.
//!
//! - unsigned integers: big-endian
//! - signed integers: big-endian with the sign bit flipped
//! - floats: sign bit flipped for positives, all bits flipped for negatives
//! - strings / byte strings: `0x00` escaped as `0x00 0x01`, terminated by `0x00 0x00`
//! - other sequences: `0x01` before every element, `0x00` terminator
//! - `Option`: `0x00` for `None`, `0x01` then the value
//! - tuples: plain concatenation (every component is self-delimiting)

use super::PartialKey;
use crate::types::Name;

/// Types that can be turned into a sortable binary key
pub trait ToKey {
    /// Append the encoding of `self` to `out`
    fn write_key(&self, out: &mut Vec<u8>);

    /// Encode a slice of values as one sequence.
    ///
    /// `u8` overrides this so that byte vectors use the string encoding.
    fn write_key_slice(items: &[Self], out: &mut Vec<u8>)
    where
        Self: Sized,
    {
        for item in items {
            out.push(0x01);
            item.write_key(out);
        }
        out.push(0x00);
    }

    fn to_key(&self) -> PartialKey {
        let mut out = Vec::new();
        self.write_key(&mut out);
        PartialKey::from_vec(out)
    }
}

/// Encode any `ToKey` value
pub fn make_key<K: ToKey + ?Sized>(value: &K) -> PartialKey {
    value.to_key()
}

fn write_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    out.reserve(bytes.len() + 2);
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(0x01);
        }
    }
    out.extend_from_slice(&[0x00, 0x00]);
}

macro_rules! impl_unsigned {
    ($($t:ty),*) => {$(
        impl ToKey for $t {
            fn write_key(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }
        }
    )*};
}

macro_rules! impl_signed {
    ($($t:ty => $u:ty),*) => {$(
        impl ToKey for $t {
            fn write_key(&self, out: &mut Vec<u8>) {
                let flipped = (*self as $u) ^ (1 as $u).rotate_right(1);
                out.extend_from_slice(&flipped.to_be_bytes());
            }
        }
    )*};
}

impl_unsigned!(u16, u32, u64, u128, usize);
impl_signed!(i8 => u8, i16 => u16, i32 => u32, i64 => u64, i128 => u128, isize => usize);

impl ToKey for u8 {
    fn write_key(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn write_key_slice(items: &[Self], out: &mut Vec<u8>) {
        write_escaped(items, out);
    }
}

impl ToKey for bool {
    fn write_key(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl ToKey for char {
    fn write_key(&self, out: &mut Vec<u8>) {
        (*self as u32).write_key(out);
    }
}

impl ToKey for f32 {
    fn write_key(&self, out: &mut Vec<u8>) {
        // -0.0 and +0.0 compare equal, so they share one encoding
        let v = if *self == 0.0 { 0.0f32 } else { *self };
        let bits = v.to_bits();
        let bits = if bits >> 31 == 1 { !bits } else { bits | (1 << 31) };
        out.extend_from_slice(&bits.to_be_bytes());
    }
}

impl ToKey for f64 {
    fn write_key(&self, out: &mut Vec<u8>) {
        let v = if *self == 0.0 { 0.0f64 } else { *self };
        let bits = v.to_bits();
        let bits = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
        out.extend_from_slice(&bits.to_be_bytes());
    }
}

impl ToKey for str {
    fn write_key(&self, out: &mut Vec<u8>) {
        write_escaped(self.as_bytes(), out);
    }
}

impl ToKey for String {
    fn write_key(&self, out: &mut Vec<u8>) {
        self.as_str().write_key(out);
    }
}

impl<T: ToKey> ToKey for [T] {
    fn write_key(&self, out: &mut Vec<u8>) {
        T::write_key_slice(self, out);
    }
}

impl<T: ToKey> ToKey for Vec<T> {
    fn write_key(&self, out: &mut Vec<u8>) {
        T::write_key_slice(self, out);
    }
}

impl<T: ToKey, const N: usize> ToKey for [T; N] {
    fn write_key(&self, out: &mut Vec<u8>) {
        T::write_key_slice(self, out);
    }
}

impl<T: ToKey> ToKey for Option<T> {
    fn write_key(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0x00),
            Some(v) => {
                out.push(0x01);
                v.write_key(out);
            }
        }
    }
}

impl<T: ToKey + ?Sized> ToKey for &T {
    fn write_key(&self, out: &mut Vec<u8>) {
        (**self).write_key(out);
    }
}

impl<T: ToKey + ?Sized> ToKey for Box<T> {
    fn write_key(&self, out: &mut Vec<u8>) {
        (**self).write_key(out);
    }
}

impl ToKey for () {
    fn write_key(&self, _out: &mut Vec<u8>) {}
}

impl ToKey for Name {
    fn write_key(&self, out: &mut Vec<u8>) {
        self.as_u64().write_key(out);
    }
}

/// An already encoded key passes through untouched
impl ToKey for PartialKey {
    fn write_key(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn to_key(&self) -> PartialKey {
        self.clone()
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: ToKey),+> ToKey for ($($name,)+) {
            #[allow(non_snake_case)]
            fn write_key(&self, out: &mut Vec<u8>) {
                let ($($name,)+) = self;
                $($name.write_key(out);)+
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
impl_tuple!(A, B, C, D, E);
impl_tuple!(A, B, C, D, E, F);
