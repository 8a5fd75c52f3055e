//! Streaming decode
//!
//! Reads records straight from a `Read` source positioned at a record start,
//! without the caller knowing the record length up front.

use std::io::{ErrorKind, Read};

use crate::error::{KvError, Result};

use super::entry::{decode_body, LEN_SIZE, MAX_RECORD_SIZE, RECORD_OVERHEAD};

/// Read one record and return only its value
///
/// Consumes exactly the bytes of that record: the length prefix, the key
/// (discarded), the value length, the value and the checksum.
pub fn read_value<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let total = match read_prefix(reader)? {
        Some(total) => total,
        None => {
            return Err(KvError::CorruptRecord(
                "no record at offset (end of data)".to_string(),
            ))
        }
    };

    let mut hasher = crc32fast::Hasher::new();

    let key_len = read_u32_hashed(reader, &mut hasher)? as usize;
    if key_len + RECORD_OVERHEAD - LEN_SIZE > total {
        return Err(KvError::CorruptRecord(format!(
            "key length {} overruns record of {} bytes",
            key_len, total
        )));
    }
    let mut key = vec![0u8; key_len];
    read_exact(reader, &mut key)?;
    hasher.update(&key);
    drop(key);

    let value_len = read_u32_hashed(reader, &mut hasher)? as usize;
    if key_len + value_len + RECORD_OVERHEAD - LEN_SIZE != total {
        return Err(KvError::CorruptRecord(format!(
            "field lengths ({} + {}) disagree with record length {}",
            key_len, value_len, total
        )));
    }
    let mut value = vec![0u8; value_len];
    read_exact(reader, &mut value)?;
    hasher.update(&value);

    let mut crc = [0u8; LEN_SIZE];
    read_exact(reader, &mut crc)?;
    let expected = u32::from_le_bytes(crc);
    let actual = hasher.finalize();
    if expected != actual {
        return Err(KvError::CorruptRecord(format!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            expected, actual
        )));
    }

    Ok(value)
}

/// Read one whole record
///
/// Returns `Ok(None)` on a clean end of input at a record boundary and
/// `CorruptRecord` when the input ends partway through a record.
pub fn read_entry<R: Read>(reader: &mut R) -> Result<Option<super::Entry>> {
    let total = match read_prefix(reader)? {
        Some(total) => total,
        None => return Ok(None),
    };

    let mut body = vec![0u8; total];
    read_exact(reader, &mut body)?;

    decode_body(&body).map(Some)
}

/// Read the `Total` prefix, distinguishing clean EOF from a torn prefix
fn read_prefix<R: Read>(reader: &mut R) -> Result<Option<usize>> {
    let mut prefix = [0u8; LEN_SIZE];
    let mut filled = 0;

    while filled < LEN_SIZE {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(KvError::Io(e)),
        }
    }

    match filled {
        0 => Ok(None),
        LEN_SIZE => {
            let total = u32::from_le_bytes(prefix) as usize;
            if total < RECORD_OVERHEAD - LEN_SIZE || total > MAX_RECORD_SIZE {
                return Err(KvError::CorruptRecord(format!(
                    "implausible record length {}",
                    total
                )));
            }
            Ok(Some(total))
        }
        partial => Err(KvError::CorruptRecord(format!(
            "truncated length prefix ({} of {} bytes)",
            partial, LEN_SIZE
        ))),
    }
}

fn read_u32_hashed<R: Read>(reader: &mut R, hasher: &mut crc32fast::Hasher) -> Result<u32> {
    let mut bytes = [0u8; LEN_SIZE];
    read_exact(reader, &mut bytes)?;
    hasher.update(&bytes);
    Ok(u32::from_le_bytes(bytes))
}

/// `read_exact` where running out of input means a torn record
fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            KvError::CorruptRecord("record truncated".to_string())
        } else {
            KvError::Io(e)
        }
    })
}
