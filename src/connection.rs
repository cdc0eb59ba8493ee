use crate::prelude::*;
use crate::protocol::LineDecoder;
use crate::validator;

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

const READ_BUFFER_SIZE: usize = 4096;

/// What happened to a single protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Stored(Unit),
    Malformed(DecodeError),
    Rejected(Rejection),
}

/// Handles one accepted device connection until the peer goes away.
pub struct Connection {
    peer: SocketAddr,
    registry: Arc<Registry>,
    store: Store,
    stats: Arc<Mutex<IngestStats>>,
    read_timeout: u64,
}

impl Connection {
    pub fn new(
        peer: SocketAddr,
        registry: Arc<Registry>,
        store: Store,
        stats: Arc<Mutex<IngestStats>>,
    ) -> Self {
        Self {
            peer,
            registry,
            store,
            stats,
            read_timeout: 0,
        }
    }

    /// Drop the connection after this many seconds without data, 0 disables.
    pub fn with_read_timeout(mut self, secs: u64) -> Self {
        self.read_timeout = secs;
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Reads until the peer closes (`Ok`) or the transport fails.
    ///
    /// Lines are handled in the order their bytes arrived. Bad lines are logged
    /// and skipped without closing the connection.
    pub async fn run<S>(&self, mut socket: S) -> Result<(), ConnectionFault>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let mut decoder = LineDecoder::new();

        loop {
            let len = if self.read_timeout > 0 {
                match tokio::time::timeout(
                    Duration::from_secs(self.read_timeout),
                    socket.read_buf(&mut buf),
                )
                .await
                {
                    Ok(result) => result?,
                    Err(_) => return Err(ConnectionFault::Timeout(self.read_timeout)),
                }
            } else {
                socket.read_buf(&mut buf).await?
            };

            if len == 0 {
                self.drain(&mut decoder, &mut buf, true);
                return Ok(());
            }

            self.drain(&mut decoder, &mut buf, false);
        }
    }

    fn drain(&self, decoder: &mut LineDecoder, buf: &mut BytesMut, eof: bool) {
        loop {
            let next = if eof {
                decoder.decode_eof(buf)
            } else {
                decoder.decode(buf)
            };

            match next {
                Ok(Some(line)) => {
                    self.process_line(&line);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("{}: framing error: {}", self.peer, e);
                    buf.clear();
                    break;
                }
            }
        }
    }

    /// Decodes, validates and stores one line.
    pub fn process_line(&self, line: &[u8]) -> LineOutcome {
        IngestStats::lock(&self.stats).lines_received += 1;

        let reading = match Reading::decode(line) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(
                    "{}: dropping malformed line {:?}: {}",
                    self.peer,
                    String::from_utf8_lossy(line),
                    e
                );
                IngestStats::lock(&self.stats).decode_errors += 1;
                return LineOutcome::Malformed(e);
            }
        };

        match validator::validate(&reading, &self.registry) {
            Ok(unit) => {
                debug!(
                    "{}: {} {} {}{}",
                    self.peer,
                    reading.device_id,
                    reading.timestamp,
                    reading.value,
                    unit.symbol()
                );
                self.store
                    .append_validated(&reading.device_id, reading.timestamp, reading.value, unit);
                IngestStats::lock(&self.stats).record_stored(&reading.device_id);
                LineOutcome::Stored(unit)
            }
            Err(rejection) => {
                warn!("{}: rejected reading: {}", self.peer, rejection);
                IngestStats::lock(&self.stats).record_rejection(&rejection);
                LineOutcome::Rejected(rejection)
            }
        }
    }
}
