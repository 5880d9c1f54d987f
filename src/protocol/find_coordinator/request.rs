//! Encoding and creation for Find Coordinator requests.
//!
//! ### Protocol Def
//! ```text
//! FindCoordinator Request (Version: 0) => key
//!   key => STRING
//! ```

use bytes::BufMut;

use crate::{encode::ToByte, error::Result, protocol::HeaderRequest};

const API_KEY_FIND_COORDINATOR: i16 = 10;
const API_VERSION: i16 = 0;

#[derive(Debug)]
pub struct FindCoordinatorRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The group id.
    pub key: &'a str,
}

impl<'a> FindCoordinatorRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str, key: &'a str) -> Self {
        Self {
            header: HeaderRequest::new(
                API_KEY_FIND_COORDINATOR,
                API_VERSION,
                correlation_id,
                client_id,
            ),
            key,
        }
    }
}

impl<'a> ToByte for FindCoordinatorRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding FindCoordinatorRequest {:?}", self);
        self.header.encode(buffer)?;
        self.key.encode(buffer)?;
        Ok(())
    }
}
