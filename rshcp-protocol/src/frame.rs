//! Request frame shared by rsh and rcp.
//!
//! Frame layout (every field terminated by a single NUL byte):
//!
//! ```text
//! +-----+------------+-----+-------------+-----+---------+-----+
//! | NUL | local_user | NUL | remote_user | NUL | command | NUL |
//! +-----+------------+-----+-------------+-----+---------+-----+
//! ```
//!
//! The leading empty field is the stderr port: it is always empty here,
//! so the daemon multiplexes stderr onto the same connection.
//! rcp uses the same frame with `rcp -f <path>` (send a file to us) or
//! `rcp -t <path>` (receive a file from us) as the command.

use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};

/// Field separator and terminator.
pub const NUL: u8 = 0x00;

/// Which side of an rcp transfer the remote end plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcpDirection {
    /// Remote sends a file (`rcp -f`).
    Source,
    /// Remote receives a file (`rcp -t`).
    Sink,
}

impl RcpDirection {
    /// Returns the command flag for this direction.
    pub fn flag(&self) -> &'static str {
        match self {
            RcpDirection::Source => "-f",
            RcpDirection::Sink => "-t",
        }
    }

    /// Builds the remote command line for a transfer of `path`.
    pub fn command(&self, path: &str) -> String {
        format!("rcp {} {}", self.flag(), path)
    }
}

/// An rsh/rcp request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Account name on the client host.
    pub local_user: String,
    /// Account name on the server host.
    pub remote_user: String,
    /// Command line executed by the remote shell.
    pub command: String,
}

impl RequestFrame {
    pub fn new(
        local_user: impl Into<String>,
        remote_user: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            local_user: local_user.into(),
            remote_user: remote_user.into(),
            command: command.into(),
        }
    }

    /// Creates the frame that starts an rcp transfer of `path`.
    pub fn rcp(
        local_user: impl Into<String>,
        remote_user: impl Into<String>,
        direction: RcpDirection,
        path: &str,
    ) -> Self {
        Self::new(local_user, remote_user, direction.command(path))
    }

    /// Returns the encoded length of the frame.
    pub fn encoded_len(&self) -> usize {
        4 + self.local_user.len() + self.remote_user.len() + self.command.len()
    }

    /// Encodes the frame into bytes.
    ///
    /// NUL is the field separator, so a field containing one would shift
    /// every following field on the daemon side; such frames are refused.
    /// Both user names must be non-empty; the command may be empty.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        check_user("local_user", &self.local_user)?;
        check_user("remote_user", &self.remote_user)?;
        check_nul("command", &self.command)?;

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(NUL);
        buf.put_slice(self.local_user.as_bytes());
        buf.put_u8(NUL);
        buf.put_slice(self.remote_user.as_bytes());
        buf.put_u8(NUL);
        buf.put_slice(self.command.as_bytes());
        buf.put_u8(NUL);
        Ok(buf)
    }
}

fn check_user(name: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::EmptyField(name));
    }
    check_nul(name, value)
}

fn check_nul(name: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.as_bytes().contains(&NUL) {
        return Err(ProtocolError::NulInField(name));
    }
    Ok(())
}
