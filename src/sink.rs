//! Where decode outcomes end up.
use std::fmt::Debug;

use crate::{broker::Record, codec::DecodeError};

/// Receives one outcome per record, in record order within a partition.
///
/// Called from the claim processors directly, so it must return promptly.
pub trait Sink<T>: Send + Sync + 'static {
    fn accept(&self, record: &Record, outcome: Result<T, DecodeError>);
}

/// Prints `tx: ...` and `err: ...` lines to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSink;

impl<T: Debug> Sink<T> for ConsoleSink {
    fn accept(&self, record: &Record, outcome: Result<T, DecodeError>) {
        match outcome {
            Ok(tx) => {
                tracing::debug!(
                    "Decoded {} partition {} offset {}",
                    record.topic,
                    record.partition,
                    record.offset
                );
                println!("tx: {:?}", tx);
            }
            Err(err) => {
                tracing::warn!(
                    "Could not decode {} partition {} offset {}: {}",
                    record.topic,
                    record.partition,
                    record.offset,
                    err
                );
                println!("err: {}", err);
            }
        }
    }
}
