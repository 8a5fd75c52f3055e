//! Client commands

use crate::error::KvError;

/// Command type byte on the wire
///
/// 0x03 is unassigned: the store has no delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Put = 0x02,
    Ping = 0x04,
}

impl CommandType {
    /// Upper-case name used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            CommandType::Get => "GET",
            CommandType::Put => "PUT",
            CommandType::Ping => "PING",
        }
    }
}

impl TryFrom<u8> for CommandType {
    type Error = KvError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(CommandType::Get),
            0x02 => Ok(CommandType::Put),
            0x04 => Ok(CommandType::Ping),
            other => Err(KvError::Protocol(format!(
                "Unknown command type: 0x{:02x}",
                other
            ))),
        }
    }
}

/// A decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch the current value of `key`
    Get { key: String },

    /// Store `value` under `key`
    Put { key: String, value: Vec<u8> },

    /// Liveness check, answered with `PONG`
    Ping,
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Put { .. } => CommandType::Put,
            Command::Ping => CommandType::Ping,
        }
    }

    /// Key the command addresses, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::Get { key } | Command::Put { key, .. } => Some(key),
            Command::Ping => None,
        }
    }
}
