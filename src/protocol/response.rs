//! Server responses

use crate::error::KvError;

/// Response status byte on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

impl TryFrom<u8> for Status {
    type Error = KvError;

    fn try_from(byte: u8) -> Result<Self, KvError> {
        match byte {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::NotFound),
            0x02 => Ok(Status::Error),
            other => Err(KvError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                other
            ))),
        }
    }
}

/// A response to one command
///
/// The payload is the value for a GET hit, `PONG` for a PING and the error
/// text for `Status::Error`. An empty payload decodes as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub payload: Option<Vec<u8>>,
}

impl Response {
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Payload as text, for error reporting
    pub fn message(&self) -> Option<String> {
        self.payload
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}
