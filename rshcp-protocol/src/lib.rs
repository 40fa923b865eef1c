//! # rshcp-protocol
//!
//! Wire protocol implementation for the BSD remote shell (rsh) and
//! remote copy (rcp) protocols.
//!
//! This crate provides:
//! - NUL-separated request frames shared by rsh and rcp
//! - The rcp `C<mode> <size> <name>` file header record
//! - Control byte handling for the rcp acknowledgement handshake
//! - Protocol constants and error types
//!
//! Nothing in this crate performs I/O.

pub mod control;
pub mod error;
pub mod frame;
pub mod header;

pub use control::{check_ack, ACK, END_OF_SESSION};
pub use error::ProtocolError;
pub use frame::{RcpDirection, RequestFrame};
pub use header::{base_name, FileHeader, DEFAULT_FILE_MODE, MAX_HEADER_LEN};

use std::ops::RangeInclusive;

/// Traditional port of the rsh/rcp daemon (`shell/tcp`).
pub const DEFAULT_PORT: u16 = 514;

/// Local source ports an rsh client may bind, tried from the top down.
///
/// Daemons only trust requests coming from a port in this range.
pub const PRIVILEGED_PORTS: RangeInclusive<u16> = 512..=1023;

/// Default maximum number of output lines returned by rsh.
pub const DEFAULT_MAX_LINES: usize = 1000;

/// Default maximum number of output bytes captured by rsh.
pub const DEFAULT_MAX_BYTES: usize = 100_000;
