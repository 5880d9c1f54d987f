//! Connection & communication with a broker.
//!
//! Kafka uses a binary protocol over TCP. The protocol defines all APIs as
//! request response message pairs, every message prefixed with its size as
//! an int32. The server answers requests on one connection in the order they
//! were sent, so a connection here carries one exchange at a time: the
//! request is written and its response read while holding the stream lock.
//!
//! Responses are matched to their request through the correlation id. A
//! response carrying another id means the stream lost its framing, usually
//! because an earlier exchange was abandoned half way (its future dropped
//! on cancellation). Such a connection is marked broken and the owner
//! replaces it with a fresh one.
use std::{
    io::ErrorKind,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc,
    },
};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    encode::ToByte,
    error::{Error, Result},
    DEFAULT_CORRELATION_ID,
};

/// Reference counted TCP connection to a Kafka/Redpanda broker.
///
/// Clones share the stream. Usually held by [`KafkaBroker`](crate::broker::KafkaBroker),
/// which keeps one for the bootstrap broker, one for the group coordinator
/// and one per partition leader.
#[derive(Clone, Debug)]
pub struct BrokerConnection {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    addr: String,
    stream: Mutex<TcpStream>,
    correlation_id: AtomicI32,
    broken: AtomicBool,
    closed: CancellationToken,
}

impl BrokerConnection {
    /// Connect to the first reachable broker out of `bootstrap_addrs`.
    ///
    /// ### Example
    /// ```no_run
    /// # async fn run() -> txgroup::prelude::Result<()> {
    /// let conn = txgroup::prelude::BrokerConnection::new(vec!["localhost:9092".to_owned()]).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(bootstrap_addrs: Vec<String>) -> Result<Self> {
        if bootstrap_addrs.is_empty() {
            return Err(Error::MissingBrokerConfigOptions);
        }

        let mut propagated_err: Option<Error> = None;
        for addr in bootstrap_addrs {
            tracing::debug!("Connecting to {}", addr);
            match TcpStream::connect(addr.as_str()).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Self {
                        inner: Arc::new(Inner {
                            addr,
                            stream: Mutex::new(stream),
                            correlation_id: AtomicI32::new(DEFAULT_CORRELATION_ID),
                            broken: AtomicBool::new(false),
                            closed: CancellationToken::new(),
                        }),
                    });
                }
                Err(err) => {
                    tracing::warn!("Could not connect to {} {:?}", addr, err);
                    propagated_err = Some(Error::IoError(err.kind()));
                }
            }
        }
        Err(propagated_err.unwrap_or(Error::IoError(ErrorKind::NotFound)))
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// False once the stream lost its framing or was closed; the owner
    /// should connect again.
    pub fn is_usable(&self) -> bool {
        !self.inner.broken.load(Ordering::Acquire) && !self.inner.closed.is_cancelled()
    }

    /// Send one request and wait for its response.
    ///
    /// `build` receives the correlation id for this exchange and returns
    /// the request to encode. The returned bytes start with the response
    /// header, ready for the parsers in [`protocol`](crate::protocol).
    #[instrument(name = "network-exchange", level = "trace", skip_all, fields(addr = %self.inner.addr))]
    pub async fn request<R, F>(&self, build: F) -> Result<Bytes>
    where
        R: ToByte,
        F: FnOnce(i32) -> R,
    {
        if !self.is_usable() {
            return Err(Error::ConnectionClosed);
        }

        let correlation_id = self.inner.correlation_id.fetch_add(1, Ordering::Relaxed);
        let frame = {
            let req = build(correlation_id);
            frame(&req)?
        };

        let mut stream = tokio::select! {
            stream = self.inner.stream.lock() => stream,
            _ = self.inner.closed.cancelled() => return Err(Error::ConnectionClosed),
        };

        // Anything that leaves before the response is fully read, including
        // the future being dropped, leaves the stream mid frame.
        let mut guard = Poison::new(&self.inner.broken);
        let response = tokio::select! {
            res = exchange(&mut stream, &frame) => res?,
            _ = self.inner.closed.cancelled() => return Err(Error::ConnectionClosed),
        };

        let received = response
            .get(..4)
            .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| Error::ParsingError(response.clone()))?;
        if received != correlation_id {
            tracing::error!(
                "ERROR: {} answered correlation id {} to request {}",
                self.inner.addr,
                received,
                correlation_id
            );
            return Err(Error::CorrelationMismatch {
                expected: correlation_id,
                received,
            });
        }

        guard.disarm();
        Ok(response)
    }

    /// Shut the connection. In-flight exchanges return
    /// [`Error::ConnectionClosed`]; closing twice only logs.
    pub async fn close(&self) {
        if self.inner.closed.is_cancelled() {
            tracing::debug!("Connection to {} already closed", self.inner.addr);
            return;
        }
        self.inner.closed.cancel();

        // an exchange still holding the lock drops out through the token
        if let Ok(mut stream) = self.inner.stream.try_lock() {
            if let Err(err) = stream.shutdown().await {
                tracing::debug!("Shutting down {} {:?}", self.inner.addr, err);
            }
        }
        tracing::debug!("Closed connection to {}", self.inner.addr);
    }
}

/// Size prefix the encoded request.
fn frame<R: ToByte>(req: &R) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(64);
    buffer.extend_from_slice(&[0, 0, 0, 0]);
    req.encode(&mut buffer)?;

    let size = i32::try_from(buffer.len() - 4).map_err(|_| Error::EncodingError)?;
    size.encode(&mut &mut buffer[..])?;
    Ok(buffer)
}

async fn exchange(stream: &mut TcpStream, frame: &[u8]) -> Result<Bytes> {
    tracing::trace!("Sending bytes {}", frame.len());
    stream.write_all(frame).await.map_err(|err| {
        tracing::error!("ERROR: Writing to Socket {:?}", err);
        Error::from(err)
    })?;

    let length = stream.read_i32().await.map_err(|err| {
        tracing::error!("ERROR: Reading on Socket {:?}", err);
        Error::from(err)
    })?;
    let length = usize::try_from(length).map_err(|_| Error::IoError(ErrorKind::InvalidData))?;
    tracing::trace!("Reading {} bytes", length);

    let mut buf = BytesMut::zeroed(length);
    stream.read_exact(&mut buf).await.map_err(|err| {
        tracing::error!("ERROR: Reading on Socket {:?}", err);
        Error::from(err)
    })?;
    Ok(buf.freeze())
}

/// Marks the connection broken unless disarmed.
struct Poison<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl<'a> Poison<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Poison<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}
