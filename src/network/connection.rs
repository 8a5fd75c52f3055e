//! Connection Handler
//!
//! Serves one client: read a command, run it against the store, answer,
//! repeat until the peer goes away.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::datastore::Datastore;
use crate::error::{KvError, Result};
use crate::protocol::{read_command, write_response, Response};

/// A single client session
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    store: Arc<Datastore>,

    /// Peer address for logging
    peer: String,

    /// Commands answered so far
    served: u64,
}

impl Connection {
    /// Wrap an accepted stream
    pub fn new(stream: TcpStream, store: Arc<Datastore>) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Small request/response frames; don't let Nagle batch them
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            store,
            peer,
            served: 0,
        })
    }

    /// Configure socket timeouts; 0 leaves a direction unbounded
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let to_duration = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));

        self.reader
            .get_ref()
            .set_read_timeout(to_duration(read_ms))?;
        self.writer
            .get_ref()
            .set_write_timeout(to_duration(write_ms))?;
        Ok(())
    }

    /// Serve requests until the client disconnects or idles out
    ///
    /// A malformed frame is answered with an error response and ends the
    /// session, since the stream position can no longer be trusted.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!(peer = %self.peer, "Client connected");

        loop {
            let command = match read_command(&mut self.reader) {
                Ok(command) => command,
                Err(KvError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!(peer = %self.peer, served = self.served, "Client disconnected");
                    return Ok(());
                }
                // Windows reports an expired read timeout as TimedOut
                Err(KvError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    tracing::debug!(peer = %self.peer, served = self.served, "Client idle, closing");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "Bad request");
                    let _ = write_response(&mut self.writer, &Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!(
                peer = %self.peer,
                command = command.command_type().name(),
                key = command.key().unwrap_or(""),
                "Request"
            );
            let response = self.respond(self.store.execute(command));

            match write_response(&mut self.writer, &response) {
                Ok(()) => self.served += 1,
                Err(KvError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!(peer = %self.peer, "Client left before reading its response");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "Failed to send response");
                    return Err(e);
                }
            }
        }
    }

    /// Map a store result onto the wire status
    fn respond(&self, result: Result<Option<Vec<u8>>>) -> Response {
        match result {
            Ok(value) => Response::ok(value),
            Err(KvError::KeyNotFound) => Response::not_found(),
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "Command failed");
                Response::error(&e.to_string())
            }
        }
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer
    }
}

/// Peer closed or reset the connection
fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
