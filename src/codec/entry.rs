//! Entry definition and whole-record encode/decode

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{KvError, Result};

/// Size of every length field (and of the checksum)
pub const LEN_SIZE: usize = 4;

/// Fixed bytes per record: Total + KeyLen + ValLen + CRC32
pub const RECORD_OVERHEAD: usize = 4 * LEN_SIZE;

/// Largest record accepted on write or trusted on read (64 MB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// A single key-value record as persisted in a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Never empty
    pub key: String,

    /// Opaque payload, may be empty
    pub value: Vec<u8>,
}

impl Entry {
    /// Build an entry, rejecting empty keys and oversized records
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(KvError::InvalidKey("key must not be empty".to_string()));
        }

        let entry = Self {
            key,
            value: value.into(),
        };

        let size = entry.encoded_len();
        if size > MAX_RECORD_SIZE {
            return Err(KvError::RecordTooLarge {
                size,
                max: MAX_RECORD_SIZE,
            });
        }

        Ok(entry)
    }

    /// Number of bytes `encode()` produces
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + self.key.len() + self.value.len()
    }

    /// Encode into the on-disk record layout
    pub fn encode(&self) -> Vec<u8> {
        let total = self.encoded_len();
        let mut buf = BytesMut::with_capacity(total);

        buf.put_u32_le((total - LEN_SIZE) as u32);
        buf.put_u32_le(self.key.len() as u32);
        buf.put_slice(self.key.as_bytes());
        buf.put_u32_le(self.value.len() as u32);
        buf.put_slice(&self.value);

        let crc = crc32fast::hash(&buf[LEN_SIZE..]);
        buf.put_u32_le(crc);

        buf.to_vec()
    }

    /// Decode exactly one record occupying the whole buffer
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LEN_SIZE {
            return Err(KvError::CorruptRecord(format!(
                "record of {} bytes is shorter than its length prefix",
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let declared = buf.get_u32_le() as usize;
        if declared != buf.remaining() {
            return Err(KvError::CorruptRecord(format!(
                "declared length {} but buffer holds {} bytes",
                declared,
                buf.remaining()
            )));
        }

        decode_body(buf)
    }
}

/// Decode a record body (everything after the `Total` prefix)
pub(crate) fn decode_body(body: &[u8]) -> Result<Entry> {
    if body.len() < RECORD_OVERHEAD - LEN_SIZE {
        return Err(KvError::CorruptRecord(format!(
            "record body of {} bytes is too short",
            body.len()
        )));
    }

    let (payload, mut crc_bytes) = body.split_at(body.len() - LEN_SIZE);
    let expected_crc = crc_bytes.get_u32_le();
    let actual_crc = crc32fast::hash(payload);
    if expected_crc != actual_crc {
        return Err(KvError::CorruptRecord(format!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            expected_crc, actual_crc
        )));
    }

    let mut buf = payload;
    let key_len = buf.get_u32_le() as usize;
    if buf.remaining() < key_len + LEN_SIZE {
        return Err(KvError::CorruptRecord(format!(
            "key length {} overruns record",
            key_len
        )));
    }
    let key_bytes = buf[..key_len].to_vec();
    buf.advance(key_len);

    let value_len = buf.get_u32_le() as usize;
    if buf.remaining() != value_len {
        return Err(KvError::CorruptRecord(format!(
            "value length {} but {} bytes remain",
            value_len,
            buf.remaining()
        )));
    }

    let key = String::from_utf8(key_bytes)
        .map_err(|e| KvError::CorruptRecord(format!("key is not valid UTF-8: {}", e)))?;
    if key.is_empty() {
        return Err(KvError::CorruptRecord("empty key".to_string()));
    }

    Ok(Entry {
        key,
        value: buf.to_vec(),
    })
}
