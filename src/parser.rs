//! Deserialize data from the bytecode protocol.
use bytes::Bytes;
use nom::{
    bytes::complete::take,
    combinator::map,
    error::ErrorKind,
    multi::many_m_n,
    number::complete::{be_i16, be_i32, be_u8},
    IResult,
};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::error::{Error, KafkaCode, Result};

pub(crate) fn failure<O>(s: NomBytes, kind: ErrorKind) -> IResult<NomBytes, O> {
    Err(nom::Err::Error(nom::error::Error::new(s, kind)))
}

pub fn parse_kafka_code(s: NomBytes) -> IResult<NomBytes, KafkaCode> {
    map(be_i16, |n| {
        FromPrimitive::from_i16(n).unwrap_or(KafkaCode::Unknown)
    })(s)
}

/// Base 128 with the low seven bits first and the high bit as a continuation flag.
fn take_unsigned_varint(mut s: NomBytes, max_len: usize) -> IResult<NomBytes, u64> {
    let mut value = 0u64;
    for i in 0..max_len {
        let (rest, byte) = be_u8(s)?;
        s = rest;
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((s, value));
        }
    }
    failure(s, ErrorKind::TooLarge)
}

/// Zigzag encoded 32 bit varint, as used inside record batches.
pub fn take_varint(s: NomBytes) -> IResult<NomBytes, i32> {
    let (s, raw) = take_unsigned_varint(s, 5)?;
    let raw = raw as u32;
    Ok((s, ((raw >> 1) as i32) ^ -((raw & 1) as i32)))
}

/// Zigzag encoded 64 bit varint.
pub fn take_varlong(s: NomBytes) -> IResult<NomBytes, i64> {
    let (s, raw) = take_unsigned_varint(s, 10)?;
    Ok((s, ((raw >> 1) as i64) ^ -((raw & 1) as i64)))
}

pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i16(s)?;
    if length < 0 {
        return failure(s, ErrorKind::LengthValue);
    }
    let (s, string) = take(length as usize)(s)?;
    Ok((s, string.into_bytes()))
}

pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i16(s)?;
    if length == -1 {
        return Ok((s, None));
    }
    if length < 0 {
        return failure(s, ErrorKind::LengthValue);
    }
    let (s, string) = take(length as usize)(s)?;
    Ok((s, Some(string.into_bytes())))
}

pub fn parse_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i32(s)?;
    if length < 0 {
        return failure(s, ErrorKind::LengthValue);
    }
    let (s, bytes) = take(length as usize)(s)?;
    Ok((s, bytes.into_bytes()))
}

pub fn parse_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i32(s)?;
    if length == -1 {
        return Ok((s, None));
    }
    if length < 0 {
        return failure(s, ErrorKind::LengthValue);
    }
    let (s, bytes) = take(length as usize)(s)?;
    Ok((s, Some(bytes.into_bytes())))
}

/// Varint length prefixed bytes where -1 is null (record keys, values and headers).
pub fn parse_varint_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = take_varint(s)?;
    if length == -1 {
        return Ok((s, None));
    }
    if length < 0 {
        return failure(s, ErrorKind::LengthValue);
    }
    let (s, bytes) = take(length as usize)(s)?;
    Ok((s, Some(bytes.into_bytes())))
}

/// ARRAY with an int32 count; a null array (-1) parses as empty.
pub fn parse_array<O, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>>
where
    F: nom::Parser<NomBytes, O, nom::error::Error<NomBytes>> + Copy,
{
    move |s: NomBytes| {
        let (s, length) = be_i32(s)?;
        counted(s, length as i64, f)
    }
}

/// Same as [`parse_array`] but the count is a zigzag varint.
pub fn parse_varint_array<O, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>>
where
    F: nom::Parser<NomBytes, O, nom::error::Error<NomBytes>> + Copy,
{
    move |s: NomBytes| {
        let (s, length) = take_varint(s)?;
        counted(s, length as i64, f)
    }
}

fn counted<O, F>(s: NomBytes, length: i64, f: F) -> IResult<NomBytes, Vec<O>>
where
    F: nom::Parser<NomBytes, O, nom::error::Error<NomBytes>>,
{
    match length {
        -1 | 0 => Ok((s, vec![])),
        n if n < 0 => failure(s, ErrorKind::LengthValue),
        n => many_m_n(n as usize, n as usize, f)(s),
    }
}

/// Broker strings are utf8; anything else is reported rather than replaced.
pub fn to_string(bytes: &Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|err| {
        tracing::error!("Error converting from UTF8 {:?}", err);
        Error::DecodingUtf8Error
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn input(b: &'static [u8]) -> NomBytes {
        NomBytes::new(Bytes::from_static(b))
    }

    #[test]
    fn varint_single_byte() {
        let (rest, n) = take_varint(input(b"\x08\x01\x02")).unwrap();
        assert_eq!(n, 4);
        assert_eq!(rest.to_bytes(), Bytes::from_static(b"\x01\x02"));

        assert_eq!(take_varint(input(b"\x01")).unwrap().1, -1);
        assert_eq!(take_varint(input(b"\x00")).unwrap().1, 0);
    }

    #[test]
    fn varint_two_bytes() {
        assert_eq!(take_varint(input(b"\xa2\x03")).unwrap().1, 209);
        assert_eq!(take_varint(input(b"\x96\x01")).unwrap().1, 75);
        assert_eq!(take_varint(input(b"\xe5\x1d")).unwrap().1, -1907);
    }

    #[test]
    fn varlong_extremes() {
        let max = input(b"\xfe\xff\xff\xff\xff\xff\xff\xff\xff\x01\x04");
        let (rest, n) = take_varlong(max).unwrap();
        assert_eq!(n, i64::MAX);
        assert_eq!(rest.to_bytes(), Bytes::from_static(b"\x04"));

        let min = input(b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01");
        assert_eq!(take_varlong(min).unwrap().1, i64::MIN);
    }

    #[test]
    fn varint_that_never_ends_is_refused() {
        assert!(take_varint(input(b"\xff\xff\xff\xff\xff\xff")).is_err());
        assert!(take_varint(input(b"\xff")).is_err());
    }

    #[test]
    fn strings_and_nulls() {
        assert_eq!(
            parse_string(input(b"\x00\x04rust")).unwrap().1,
            Bytes::from_static(b"rust")
        );
        assert_eq!(parse_nullable_string(input(b"\xff\xff")).unwrap().1, None);
        assert_eq!(parse_nullable_bytes(input(b"\xff\xff\xff\xff")).unwrap().1, None);
        assert_eq!(
            parse_bytes(input(b"\x00\x00\x00\x02\x01\x02\x03")).unwrap().1,
            Bytes::from_static(b"\x01\x02")
        );
        assert!(parse_string(input(b"\x00\x09short")).is_err());
    }

    #[test]
    fn arrays() {
        let buf = input(&[
            0, 0, 0, 2, // array size
            0, 4, 114, 117, 115, 116, // string
            0, 4, 114, 117, 115, 116, // string
            0, 0, 0, // leftover input
        ]);
        let (rest, strings) = parse_array(parse_string)(buf).unwrap();
        assert_eq!(strings, vec![Bytes::from_static(b"rust"); 2]);
        assert_eq!(rest.to_bytes().len(), 3);

        assert!(parse_array(be_i32)(input(b"\xff\xff\xff\xff"))
            .unwrap()
            .1
            .is_empty());
    }

    #[test]
    fn varint_array_and_bytes() {
        // two headers worth of nullable varint bytes: "ab" and null
        let (_, values) = parse_varint_array(parse_varint_bytes)(input(b"\x04\x04ab\x01")).unwrap();
        assert_eq!(values, vec![Some(Bytes::from_static(b"ab")), None]);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        assert_eq!(
            to_string(&Bytes::from_static(b"\xff")),
            Err(Error::DecodingUtf8Error)
        );
        assert_eq!(to_string(&Bytes::from_static(b"ok")).unwrap(), "ok");
    }
}
