//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or parsing rsh/rcp protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("field `{0}` contains a NUL byte")]
    NulInField(&'static str),

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("unexpected record type {0:#04x}, expected 'C'")]
    UnexpectedRecord(u8),

    #[error("malformed file header: {0:?}")]
    MalformedHeader(String),

    #[error("invalid file mode: {0:?}")]
    InvalidMode(String),

    #[error("invalid file size: {0:?}")]
    InvalidSize(String),

    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("record exceeds {max} bytes without a newline")]
    RecordTooLong { max: usize },

    #[error("unexpected control byte {0:#04x}, expected 0x00")]
    UnexpectedControl(u8),

    #[error("connection closed early: expected {expected} bytes, received {received}")]
    UnexpectedEof { expected: u64, received: u64 },
}
