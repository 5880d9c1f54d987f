//! Record batches as they are stored in the log and returned by Fetch.
//!
//! ```text
//! RecordBatch =>
//!   baseOffset: int64
//!   batchLength: int32
//!   partitionLeaderEpoch: int32
//!   magic: int8 (2)
//!   crc: uint32 (CRC-32C of everything from attributes to the end)
//!   attributes: int16
//!     bit 0~2: compression (0 none, 1 gzip, 2 snappy, 3 lz4, 4 zstd)
//!     bit 3: timestampType
//!     bit 4: isTransactional
//!     bit 5: isControlBatch
//!   lastOffsetDelta: int32
//!   baseTimestamp: int64
//!   maxTimestamp: int64
//!   producerId: int64
//!   producerEpoch: int16
//!   baseSequence: int32
//!   records: [Record] (compressed as a whole when compression is set)
//!
//! Record =>
//!   length: varint
//!   attributes: int8
//!   timestampDelta: varlong
//!   offsetDelta: varint
//!   key: varint length, bytes
//!   value: varint length, bytes
//!   headers: [headerKey: varint length string, headerValue: varint length bytes]
//! ```
//!
//! A broker may cut the last batch of a fetch short when it hits the size
//! limit; that batch is dropped and fetched again from its base offset.

use std::io::Read;

use bytes::{Buf, Bytes};
use crc::{Crc, CRC_32_ISCSI};
use flate2::read::GzDecoder;
use nom::{
    bytes::complete::take,
    error::ErrorKind,
    multi::many_m_n,
    number::complete::{be_i16, be_i32, be_i64, be_i8, be_u32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{Error, Result},
    parser,
};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Base offset and batch length, the part `batchLength` does not count.
const LOG_OVERHEAD: usize = 12;
/// The crc covers everything after itself.
const CRC_COVERAGE_START: usize = 21;
const MAGIC: i8 = 2;

const COMPRESSION_MASK: i16 = 0x07;
const TRANSACTIONAL_FLAG: i16 = 0x10;
const CONTROL_FLAG: i16 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl TryFrom<i16> for Compression {
    type Error = Error;

    fn try_from(attributes: i16) -> Result<Self> {
        match attributes & COMPRESSION_MASK {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            codec => Err(Error::UnsupportedCompression(codec)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub base_offset: i64,
    pub partition_leader_epoch: i32,
    pub magic: i8,
    pub crc: u32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub base_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn is_control(&self) -> bool {
        self.attributes & CONTROL_FLAG != 0
    }

    pub fn is_transactional(&self) -> bool {
        self.attributes & TRANSACTIONAL_FLAG != 0
    }

    /// Offset of the last record the producer wrote into this batch.
    pub fn last_offset(&self) -> i64 {
        self.base_offset + self.last_offset_delta as i64
    }
}

/// A record with its offset and timestamp made absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub offset: i64,
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// Split the `records` field of a fetched partition into batches.
///
/// Control batches are left out. A trailing partial batch is ignored.
pub fn decode_batches(mut data: Bytes) -> Result<Vec<RecordBatch>> {
    let mut batches = vec![];
    while data.len() >= LOG_OVERHEAD {
        let mut prefix = &data[..LOG_OVERHEAD];
        let base_offset = prefix.get_i64();
        let batch_length = prefix.get_i32();
        if batch_length < 0 {
            return Err(Error::CorruptRecordBatch(base_offset));
        }
        let total = LOG_OVERHEAD + batch_length as usize;
        if data.len() < total {
            tracing::trace!(
                "Ignoring partial batch at offset {}, {} of {} bytes",
                base_offset,
                data.len(),
                total
            );
            break;
        }
        let batch = decode_batch(data.split_to(total))?;
        if batch.is_control() {
            tracing::trace!("Skipping control batch at offset {}", batch.base_offset);
            continue;
        }
        batches.push(batch);
    }
    Ok(batches)
}

fn decode_batch(batch: Bytes) -> Result<RecordBatch> {
    let (payload, (mut header, record_count)) = parse_batch_header(NomBytes::new(batch.clone()))
        .map_err(|err| {
            tracing::error!("ERROR: Failed parsing record batch header {:?}", err);
            Error::ParsingError(batch.clone())
        })?;

    if header.magic != MAGIC {
        return Err(Error::UnsupportedMagic(header.magic));
    }

    let computed = CASTAGNOLI.checksum(&batch[CRC_COVERAGE_START..]);
    if computed != header.crc {
        tracing::error!(
            "ERROR: Batch at offset {} has crc {:#x}, computed {:#x}",
            header.base_offset,
            header.crc,
            computed
        );
        return Err(Error::CorruptRecordBatch(header.base_offset));
    }

    if header.attributes & CONTROL_FLAG != 0 {
        return Ok(header);
    }

    let payload = match Compression::try_from(header.attributes)? {
        Compression::None => payload.into_bytes(),
        Compression::Gzip => {
            tracing::trace!("Decompressing batch at offset {} with gzip", header.base_offset);
            gunzip(&payload.into_bytes())?
        }
    };

    if record_count < 0 {
        return Err(Error::CorruptRecordBatch(header.base_offset));
    }
    let count = record_count as usize;
    let (_, raw) = many_m_n(count, count, parse_record)(NomBytes::new(payload)).map_err(|err| {
        tracing::error!(
            "ERROR: Failed parsing records of batch at offset {} {:?}",
            header.base_offset,
            err
        );
        Error::CorruptRecordBatch(header.base_offset)
    })?;

    header.records = raw
        .into_iter()
        .map(|r| Record {
            offset: header.base_offset + r.offset_delta as i64,
            timestamp: header.base_timestamp + r.timestamp_delta,
            key: r.key,
            value: r.value,
            headers: r.headers,
        })
        .collect();
    Ok(header)
}

fn gunzip(compressed: &[u8]) -> Result<Bytes> {
    let mut out = Vec::with_capacity(compressed.len() * 2);
    GzDecoder::new(compressed).read_to_end(&mut out)?;
    Ok(Bytes::from(out))
}

fn parse_batch_header(s: NomBytes) -> IResult<NomBytes, (RecordBatch, i32)> {
    let (s, base_offset) = be_i64(s)?;
    let (s, _batch_length) = be_i32(s)?;
    let (s, partition_leader_epoch) = be_i32(s)?;
    let (s, magic) = be_i8(s)?;
    let (s, crc) = be_u32(s)?;
    let (s, attributes) = be_i16(s)?;
    let (s, last_offset_delta) = be_i32(s)?;
    let (s, base_timestamp) = be_i64(s)?;
    let (s, max_timestamp) = be_i64(s)?;
    let (s, producer_id) = be_i64(s)?;
    let (s, producer_epoch) = be_i16(s)?;
    let (s, base_sequence) = be_i32(s)?;
    let (s, record_count) = be_i32(s)?;

    Ok((
        s,
        (
            RecordBatch {
                base_offset,
                partition_leader_epoch,
                magic,
                crc,
                attributes,
                last_offset_delta,
                base_timestamp,
                max_timestamp,
                producer_id,
                producer_epoch,
                base_sequence,
                records: vec![],
            },
            record_count,
        ),
    ))
}

struct RawRecord {
    timestamp_delta: i64,
    offset_delta: i32,
    key: Option<Bytes>,
    value: Option<Bytes>,
    headers: Vec<Header>,
}

fn parse_record(s: NomBytes) -> IResult<NomBytes, RawRecord> {
    let (s, length) = parser::take_varint(s)?;
    if length < 0 {
        return parser::failure(s, ErrorKind::LengthValue);
    }
    let (s, body) = take(length as usize)(s)?;
    let (_, record) = parse_record_body(body)?;
    Ok((s, record))
}

fn parse_record_body(s: NomBytes) -> IResult<NomBytes, RawRecord> {
    let (s, _attributes) = be_i8(s)?;
    let (s, timestamp_delta) = parser::take_varlong(s)?;
    let (s, offset_delta) = parser::take_varint(s)?;
    let (s, key) = parser::parse_varint_bytes(s)?;
    let (s, value) = parser::parse_varint_bytes(s)?;
    let (s, headers) = parser::parse_varint_array(parse_header)(s)?;

    Ok((
        s,
        RawRecord {
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        },
    ))
}

fn parse_header(s: NomBytes) -> IResult<NomBytes, Header> {
    let (s, key) = parser::parse_varint_bytes(s)?;
    let (s, value) = parser::parse_varint_bytes(s)?;
    Ok((
        s,
        Header {
            key: key.unwrap_or_default(),
            value,
        },
    ))
}
