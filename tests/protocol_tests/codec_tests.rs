//! Protocol Codec Tests
//!
//! Tests for command and response framing on the wire.

use std::io::Cursor;

use logkv::protocol::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, Command, Response, Status,
};
use logkv::KvError;

// =============================================================================
// Command Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_get() {
    let cmd = Command::Get {
        key: "hello".to_string(),
    };
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_put_with_binary_value() {
    let cmd = Command::Put {
        key: "blob".to_string(),
        value: (0..=255).collect(),
    };
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_put_empty_value() {
    let cmd = Command::Put {
        key: "key".to_string(),
        value: vec![],
    };
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    match decoded {
        Command::Put { key, value } => {
            assert_eq!(key, "key");
            assert!(value.is_empty());
        }
        _ => panic!("Expected PUT command"),
    }
}

#[test]
fn test_encode_decode_ping() {
    let decoded = decode_command(&encode_command(&Command::Ping)).unwrap();
    assert_eq!(decoded, Command::Ping);
}

// =============================================================================
// Response Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_response_ok() {
    let resp = Response::ok(Some(b"value".to_vec()));
    let decoded = decode_response(&encode_response(&resp)).unwrap();

    assert_eq!(decoded.status, Status::Ok);
    assert_eq!(decoded.payload, Some(b"value".to_vec()));
}

#[test]
fn test_encode_decode_response_not_found() {
    let decoded = decode_response(&encode_response(&Response::not_found())).unwrap();

    assert_eq!(decoded.status, Status::NotFound);
    assert_eq!(decoded.payload, None);
}

#[test]
fn test_encode_decode_response_error() {
    let resp = Response::error("something went wrong");
    let decoded = decode_response(&encode_response(&resp)).unwrap();

    assert_eq!(decoded.status, Status::Error);
    assert_eq!(decoded.payload, Some(b"something went wrong".to_vec()));
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_incomplete_header() {
    let bytes = [0x01, 0x00, 0x00]; // Only 3 bytes, need 5
    let err = decode_command(&bytes).unwrap_err();
    assert!(err.to_string().contains("Incomplete command header"));
}

#[test]
fn test_incomplete_payload() {
    // Header says 10 bytes payload, but only 5 provided
    let bytes = [0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x05, 0x68];
    let err = decode_command(&bytes).unwrap_err();
    assert!(err.to_string().contains("Incomplete"));
}

#[test]
fn test_unknown_command_type() {
    // 0x03 used to be DELETE; the store has no deletes
    let bytes = [0x03, 0x00, 0x00, 0x00, 0x00];
    let err = decode_command(&bytes).unwrap_err();
    assert!(err.to_string().contains("Unknown command type"));
}

#[test]
fn test_unknown_response_status() {
    let bytes = [0xFF, 0x00, 0x00, 0x00, 0x00];
    let err = decode_response(&bytes).unwrap_err();
    assert!(err.to_string().contains("Unknown response status"));
}

#[test]
fn test_get_missing_key_length() {
    let bytes = [0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00]; // Only 2 bytes payload
    assert!(matches!(decode_command(&bytes), Err(KvError::Protocol(_))));
}

#[test]
fn test_key_must_be_utf8() {
    // GET with key_len 2 and key [0xFF, 0xFE]
    let bytes = [0x01, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x02, 0xFF, 0xFE];
    let err = decode_command(&bytes).unwrap_err();
    assert!(err.to_string().contains("not UTF-8"));
}

#[test]
fn test_get_with_trailing_bytes() {
    let mut bytes = encode_command(&Command::Get {
        key: "k".to_string(),
    });
    bytes.push(0x00);
    bytes[4] += 1; // payload length now covers the stray byte

    assert!(matches!(decode_command(&bytes), Err(KvError::Protocol(_))));
}

#[test]
fn test_ping_with_unexpected_payload() {
    let bytes = [0x04, 0x00, 0x00, 0x00, 0x05, 0x68, 0x65, 0x6C, 0x6C, 0x6F];
    let err = decode_command(&bytes).unwrap_err();
    assert!(err.to_string().contains("unexpected payload"));
}

#[test]
fn test_oversized_payload_rejected_before_reading() {
    // Header announces 32 MB; nothing else follows
    let bytes = [0x02, 0x02, 0x00, 0x00, 0x00];
    let mut cursor = Cursor::new(bytes.to_vec());
    let err = read_command(&mut cursor).unwrap_err();
    assert!(err.to_string().contains("Payload too large"));
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_stream_multiple_commands() {
    let commands = vec![
        Command::Ping,
        Command::Put {
            key: "k1".to_string(),
            value: b"v1".to_vec(),
        },
        Command::Get {
            key: "k1".to_string(),
        },
    ];

    let mut buffer = Vec::new();
    for cmd in &commands {
        write_command(&mut buffer, cmd).unwrap();
    }

    let mut cursor = Cursor::new(buffer);
    for expected in &commands {
        assert_eq!(&read_command(&mut cursor).unwrap(), expected);
    }
}

#[test]
fn test_stream_multiple_responses() {
    let responses = vec![
        Response::ok(Some(b"data".to_vec())),
        Response::not_found(),
        Response::error("oops"),
        Response::ok(None),
    ];

    let mut buffer = Vec::new();
    for resp in &responses {
        write_response(&mut buffer, resp).unwrap();
    }

    let mut cursor = Cursor::new(buffer);
    for expected in &responses {
        assert_eq!(&read_response(&mut cursor).unwrap(), expected);
    }
}

#[test]
fn test_stream_truncated_command_is_io_error() {
    let mut bytes = encode_command(&Command::Get {
        key: "truncated".to_string(),
    });
    bytes.truncate(bytes.len() - 3);

    let mut cursor = Cursor::new(bytes);
    assert!(matches!(read_command(&mut cursor), Err(KvError::Io(_))));
}

// =============================================================================
// Wire Format Verification Tests
// =============================================================================

#[test]
fn test_wire_format_get() {
    let encoded = encode_command(&Command::Get {
        key: "test".to_string(),
    });

    // Expected: [0x01][0x00 0x00 0x00 0x08][0x00 0x00 0x00 0x04][t e s t]
    //           cmd   payload_len(8)       key_len(4)          key
    assert_eq!(encoded[0], 0x01);
    assert_eq!(&encoded[1..5], &[0x00, 0x00, 0x00, 0x08]);
    assert_eq!(&encoded[5..9], &[0x00, 0x00, 0x00, 0x04]);
    assert_eq!(&encoded[9..13], b"test");
}

#[test]
fn test_wire_format_put() {
    let encoded = encode_command(&Command::Put {
        key: "k".to_string(),
        value: b"vv".to_vec(),
    });

    // [0x02][len 7][key_len 1][k][v v]
    assert_eq!(encoded[0], 0x02);
    assert_eq!(&encoded[1..5], &[0x00, 0x00, 0x00, 0x07]);
    assert_eq!(&encoded[5..9], &[0x00, 0x00, 0x00, 0x01]);
    assert_eq!(&encoded[9..], b"kvv");
}

#[test]
fn test_wire_format_response_ok() {
    let encoded = encode_response(&Response::ok(Some(b"hi".to_vec())));

    // Expected: [0x00][0x00 0x00 0x00 0x02][h i]
    assert_eq!(encoded[0], 0x00);
    assert_eq!(&encoded[1..5], &[0x00, 0x00, 0x00, 0x02]);
    assert_eq!(&encoded[5..7], b"hi");
}
