//! Single-byte control codes used by rcp.
//!
//! Every checkpoint of the rcp handshake is a single byte: `0x00` means
//! success, anything else is a failure reported by the peer. By rcp
//! convention `0x01` is a warning and `0x02` a fatal error, both followed
//! by a human readable message line.

use crate::error::ProtocolError;

/// Acknowledgement / success byte.
pub const ACK: u8 = 0x00;

/// Warning record prefix.
pub const WARNING: u8 = 0x01;

/// Fatal error record prefix.
pub const FATAL: u8 = 0x02;

/// Record sent by the client to end an rcp sink session.
pub const END_OF_SESSION: &[u8] = b"E\n";

/// Checks that a control byte is an acknowledgement.
pub fn check_ack(byte: u8) -> Result<(), ProtocolError> {
    if byte == ACK {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedControl(byte))
    }
}

/// Returns whether a record starts with an rcp error prefix.
pub fn is_error_record(record: &[u8]) -> bool {
    matches!(record.first(), Some(&WARNING) | Some(&FATAL))
}

/// Extracts the message carried by an rcp error record.
///
/// The prefix byte and trailing newline are stripped; invalid UTF-8 is
/// replaced rather than rejected since the text is only used for display.
pub fn error_message(record: &[u8]) -> String {
    let body = record.get(1..).unwrap_or_default();
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    String::from_utf8_lossy(body).trim().to_string()
}
