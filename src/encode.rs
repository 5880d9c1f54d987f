//! Serialize requests into the bytecode protocol.
use bytes::{BufMut, Bytes};

use crate::error::{Error, Result};

/// Length prefixes are signed on the wire; refuse anything that would not fit.
fn wire_len<T: TryFrom<usize>>(len: usize) -> Result<T> {
    T::try_from(len).map_err(|_| Error::EncodingError)
}

pub trait ToByte {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()>;
}

impl<'a, T: ToByte + 'a + ?Sized> ToByte for &'a T {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl ToByte for i8 {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        buffer.put_i8(*self);
        Ok(())
    }
}

impl ToByte for i16 {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        buffer.put_i16(*self);
        Ok(())
    }
}

impl ToByte for i32 {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl ToByte for i64 {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        buffer.put_i64(*self);
        Ok(())
    }
}

/// STRING: int16 length followed by utf8 bytes.
impl ToByte for str {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        buffer.put_i16(wire_len(self.len())?);
        buffer.put(self.as_bytes());
        Ok(())
    }
}

impl ToByte for String {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.as_str().encode(buffer)
    }
}

/// ARRAY: int32 count followed by each element.
impl<V: ToByte> ToByte for [V] {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_as_array(buffer, self, |buffer, x| x.encode(buffer))
    }
}

/// BYTES: int32 length followed by the raw bytes.
impl ToByte for [u8] {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        buffer.put_i32(wire_len(self.len())?);
        buffer.put(self);
        Ok(())
    }
}

impl ToByte for Bytes {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.as_ref().encode(buffer)
    }
}

/// NULLABLE_BYTES: a length of -1 stands for null.
impl ToByte for Option<Bytes> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match self {
            Some(xs) => xs.encode(buffer),
            None => (-1i32).encode(buffer),
        }
    }
}

/// NULLABLE_STRING: a length of -1 stands for null.
impl<'a> ToByte for Option<&'a str> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Some(xs) => xs.encode(buffer),
            None => (-1i16).encode(buffer),
        }
    }
}

/// Renders a slice of string-likes (`&str`, `String`) as a STRING array.
pub struct AsStrings<'a, T>(pub &'a [T]);

impl<'a, T: AsRef<str> + 'a> ToByte for AsStrings<'a, T> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_as_array(buffer, self.0, |buffer, x| x.as_ref().encode(buffer))
    }
}

/// Writes the int32 element count of `xs` and then each element via `f`.
pub fn encode_as_array<T, F, W>(buffer: &mut W, xs: &[T], mut f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    buffer.put_i32(wire_len(xs.len())?);
    for x in xs {
        f(buffer, x)?;
    }
    Ok(())
}

/// Encodes `value` on its own and writes it as a BYTES field.
///
/// Group membership embeds the consumer protocol (subscriptions and
/// assignments) as opaque bytes inside join and sync requests.
pub fn encode_embedded<V: ToByte, W: BufMut>(value: &V, buffer: &mut W) -> Result<()> {
    let mut embedded: Vec<u8> = Vec::with_capacity(64);
    value.encode(&mut embedded)?;
    embedded.as_slice().encode(buffer)
}
