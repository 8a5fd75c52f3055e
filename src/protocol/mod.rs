//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Frames
//!
//! Requests and responses share one framing: a tag byte, a big-endian u32
//! payload length, then the payload (at most `MAX_PAYLOAD_SIZE` bytes).
//!
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Tag (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! | Tag  | Request | Payload                              |
//! |------|---------|--------------------------------------|
//! | 0x01 | GET     | key_len (4) + key                    |
//! | 0x02 | PUT     | key_len (4) + key + value (the rest) |
//! | 0x04 | PING    | empty                                |
//!
//! | Tag  | Response  | Payload                          |
//! |------|-----------|----------------------------------|
//! | 0x00 | OK        | value, `PONG`, or empty          |
//! | 0x01 | NOT_FOUND | empty                            |
//! | 0x02 | ERROR     | UTF-8 message                    |
//!
//! Keys must be valid UTF-8; values are opaque bytes.

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
