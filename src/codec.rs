//! Decoding record values into transactions.
use std::fmt::Debug;

use bytes::Bytes;
use prost::Message;

/// Turns a record value into something structured.
///
/// Failing is an expected outcome, not an error of the consumer: the
/// record is still reported and marked.
pub trait Codec: Send + Sync + 'static {
    type Output: Debug + Send;

    fn decode(&self, payload: &Bytes) -> Result<Self::Output, DecodeError>;
}

/// A payload the codec could not make sense of. Keeps the raw bytes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("could not decode {} byte payload: {reason}", .raw.len())]
pub struct DecodeError {
    pub reason: String,
    pub raw: Bytes,
}

/// Transaction update as published by the upstream streaming service.
///
/// The transaction and its status metadata are nested messages of their
/// own; they are kept encoded.
#[derive(Clone, PartialEq, Message)]
pub struct SubscribeUpdateTransactionInfo {
    #[prost(bytes = "bytes", tag = "1")]
    pub signature: Bytes,
    #[prost(bool, tag = "2")]
    pub is_vote: bool,
    #[prost(bytes = "bytes", tag = "3")]
    pub transaction: Bytes,
    #[prost(bytes = "bytes", tag = "4")]
    pub meta: Bytes,
    #[prost(uint64, tag = "5")]
    pub index: u64,
}

pub type DecodedTransaction = SubscribeUpdateTransactionInfo;

/// Protobuf codec for [`SubscribeUpdateTransactionInfo`]. An empty value
/// decodes to the default message.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionCodec;

impl Codec for TransactionCodec {
    type Output = DecodedTransaction;

    fn decode(&self, payload: &Bytes) -> Result<DecodedTransaction, DecodeError> {
        SubscribeUpdateTransactionInfo::decode(payload.clone()).map_err(|err| DecodeError {
            reason: err.to_string(),
            raw: payload.clone(),
        })
    }
}
