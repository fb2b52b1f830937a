//! The opaque value codec (spec §9 design note): primitives, nullable
//! values via a one-byte is-nil prefix, length-prefixed sequences and maps,
//! structs encoded as their fields in declaration order.
//!
//! Grounded on the teacher's `codec::{Encodable, Decodable}` trait split
//! (encode writes into a `BytesMut`, decode reads from a `Cursor`); the wire
//! shapes for primitives and strings follow `encoding/encoder.go` and
//! `encoding/decoder.go` (little-endian, u32-length-prefixed strings). The
//! original's struct codec never actually implements `Decode` (every
//! generated `Decode` returns `nil` without touching the target) and has no
//! sequence/map/option support at all — both gaps are filled in here rather
//! than carried forward.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("unexpected end of buffer while decoding a value")]
    Eof,

    #[error("invalid UTF-8 in encoded string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("invalid boolean byte: {0}")]
    InvalidBool(u8),
}

pub type ValueResult<T> = Result<T, ValueError>;

pub trait Encode {
    fn encode(&self, buf: &mut BytesMut);
}

pub trait Decode: Sized {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self>;
}

fn need(cur: &Cursor<&[u8]>, n: usize) -> ValueResult<()> {
    if (cur.get_ref().len() as u64).saturating_sub(cur.position()) < n as u64 {
        Err(ValueError::Eof)
    } else {
        Ok(())
    }
}

impl Encode for bool {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(if *self { 1 } else { 0 });
    }
}

impl Decode for bool {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        need(cur, 1)?;
        match cur.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ValueError::InvalidBool(other)),
        }
    }
}

macro_rules! impl_int_codec {
    ($ty:ty, $size:expr, $put:ident, $get:ident) => {
        impl Encode for $ty {
            fn encode(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }
        }

        impl Decode for $ty {
            fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
                need(cur, $size)?;
                Ok(cur.$get())
            }
        }
    };
}

impl_int_codec!(u8, 1, put_u8, get_u8);
impl_int_codec!(i8, 1, put_i8, get_i8);
impl_int_codec!(u16, 2, put_u16_le, get_u16_le);
impl_int_codec!(i16, 2, put_i16_le, get_i16_le);
impl_int_codec!(u32, 4, put_u32_le, get_u32_le);
impl_int_codec!(i32, 4, put_i32_le, get_i32_le);
impl_int_codec!(u64, 8, put_u64_le, get_u64_le);
impl_int_codec!(i64, 8, put_i64_le, get_i64_le);
impl_int_codec!(f32, 4, put_f32_le, get_f32_le);
impl_int_codec!(f64, 8, put_f64_le, get_f64_le);

impl Encode for String {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        buf.put_slice(self.as_bytes());
    }
}

impl Decode for String {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        let len = u32::decode(cur)? as usize;
        need(cur, len)?;
        let mut raw = vec![0u8; len];
        cur.copy_to_slice(&mut raw);
        Ok(String::from_utf8(raw)?)
    }
}

/// Raw byte sequence, length-prefixed. Distinct from `Vec<u8>`'s generic
/// element-wise encoding so envelope bodies avoid per-byte overhead.
impl Encode for Bytes {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        buf.put_slice(self);
    }
}

impl Decode for Bytes {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        let len = u32::decode(cur)? as usize;
        need(cur, len)?;
        let mut raw = vec![0u8; len];
        cur.copy_to_slice(&mut raw);
        Ok(Bytes::from(raw))
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            None => buf.put_u8(0),
            Some(v) => {
                buf.put_u8(1);
                v.encode(buf);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        need(cur, 1)?;
        match cur.get_u8() {
            0 => Ok(None),
            _ => Ok(Some(T::decode(cur)?)),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        let len = u32::decode(cur)? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(T::decode(cur)?);
        }
        Ok(out)
    }
}

impl Encode for HashMap<String, String> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len() as u32);
        for (k, v) in self {
            k.encode(buf);
            v.encode(buf);
        }
    }
}

impl Decode for HashMap<String, String> {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        let len = u32::decode(cur)? as usize;
        let mut map = HashMap::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            let k = String::decode(cur)?;
            let v = String::decode(cur)?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

/// Convenience entry points mirroring the teacher's `Encodable::to_bytes`.
pub fn marshal<T: Encode>(value: &T) -> Bytes {
    let mut buf = BytesMut::new();
    value.encode(&mut buf);
    buf.freeze()
}

pub fn unmarshal<T: Decode>(data: &[u8]) -> ValueResult<T> {
    let mut cur = Cursor::new(data);
    T::decode(&mut cur)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trips() {
        let s = "hello world".to_string();
        let bytes = marshal(&s);
        let decoded: String = unmarshal(&bytes).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn option_none_and_some_round_trip() {
        let none: Option<u32> = None;
        let some: Option<u32> = Some(42);
        assert_eq!(unmarshal::<Option<u32>>(&marshal(&none)).unwrap(), None);
        assert_eq!(unmarshal::<Option<u32>>(&marshal(&some)).unwrap(), Some(42));
    }

    #[test]
    fn vec_and_map_round_trip() {
        let v = vec![1u32, 2, 3];
        assert_eq!(unmarshal::<Vec<u32>>(&marshal(&v)).unwrap(), v);

        let mut m = HashMap::new();
        m.insert("a".to_string(), "1".to_string());
        m.insert("b".to_string(), "2".to_string());
        assert_eq!(unmarshal::<HashMap<String, String>>(&marshal(&m)).unwrap(), m);
    }

    #[test]
    fn truncated_buffer_is_eof() {
        let mut cur = Cursor::new(&[1u8][..]);
        assert!(matches!(u32::decode(&mut cur), Err(ValueError::Eof)));
    }
}
