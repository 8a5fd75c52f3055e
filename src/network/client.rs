//! TCP Client
//!
//! Blocking client for the logkv wire protocol.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{KvError, Result};
use crate::protocol::{read_response, write_command, Command, Response, Status};

/// A connection to a logkv server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    /// Set read/write timeouts on the underlying socket
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let stream = self.reader.get_ref();
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Fetch a value; `None` if the server has no such key
    pub fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self.call(Command::Get {
            key: key.to_string(),
        })?;

        match response.status {
            Status::Ok => Ok(Some(response.payload.unwrap_or_default())),
            Status::NotFound => Ok(None),
            Status::Error => Err(server_error(response)),
        }
    }

    /// Store a value
    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let response = self.call(Command::Put {
            key: key.to_string(),
            value: value.to_vec(),
        })?;

        match response.status {
            Status::Ok => Ok(()),
            _ => Err(server_error(response)),
        }
    }

    /// Round-trip a PING
    pub fn ping(&mut self) -> Result<()> {
        let response = self.call(Command::Ping)?;
        match (response.status, response.payload.as_deref()) {
            (Status::Ok, Some(b"PONG")) => Ok(()),
            _ => Err(server_error(response)),
        }
    }

    fn call(&mut self, command: Command) -> Result<Response> {
        write_command(&mut self.writer, &command)?;
        read_response(&mut self.reader)
    }
}

fn server_error(response: Response) -> KvError {
    let message = response
        .message()
        .unwrap_or_else(|| format!("unexpected {:?} response", response.status));
    KvError::Protocol(message)
}
