//! Client error types.

use rshcp_protocol::ProtocolError;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Protocol step during which a session error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Writing the request frame.
    Request,
    /// Reading rsh command output.
    Output,
    /// Waiting for the daemon to accept the request.
    BeginAck,
    /// Reading or writing the file header record.
    Header,
    /// Waiting for the peer to accept the file header.
    HeaderAck,
    /// Transferring file contents.
    Payload,
    /// Exchanging the end-of-file marker.
    EndOfFile,
    /// Ending the rcp session.
    SessionEnd,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Request => write!(f, "sending request"),
            Stage::Output => write!(f, "reading command output"),
            Stage::BeginAck => write!(f, "waiting for request acknowledgement"),
            Stage::Header => write!(f, "exchanging file header"),
            Stage::HeaderAck => write!(f, "waiting for file header acknowledgement"),
            Stage::Payload => write!(f, "transferring file contents"),
            Stage::EndOfFile => write!(f, "exchanging end-of-file marker"),
            Stage::SessionEnd => write!(f, "ending session"),
        }
    }
}

/// Errors establishing a connection to the daemon.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no address found for {0}")]
    NoAddress(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {0} timed out")]
    Timeout(SocketAddr),

    #[error(
        "could not connect from a privileged port after {attempts} attempts \
         (need appropriate privileges){}",
        .last_error.as_ref().map(|e| format!(": {}", e)).unwrap_or_default()
    )]
    Privilege {
        attempts: usize,
        last_error: Option<std::io::Error>,
    },
}

/// Errors building a [`RemoteTarget`](crate::RemoteTarget).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must not contain a NUL byte")]
    ContainsNul(&'static str),

    #[error("port must be between 1 and 65535")]
    InvalidPort,

    #[error("invalid username@hostname format: {0:?}")]
    InvalidUserHost(String),
}

/// rsh execution errors.
#[derive(Debug, Error)]
pub enum RshError {
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectError),

    #[error("invalid request: {0}")]
    Request(#[from] ProtocolError),

    #[error("I/O error while {stage}: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
}

/// rcp transfer errors.
#[derive(Debug, Error)]
pub enum RcpError {
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectError),

    #[error("remote rejected request while {stage}: {message}")]
    RemoteAccess { stage: Stage, message: String },

    #[error("protocol error while {stage}: {source}")]
    Protocol {
        stage: Stage,
        #[source]
        source: ProtocolError,
    },

    #[error("I/O error while {stage}: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
}

impl RcpError {
    pub(crate) fn protocol(stage: Stage, source: ProtocolError) -> Self {
        RcpError::Protocol { stage, source }
    }

    pub(crate) fn io(stage: Stage, source: std::io::Error) -> Self {
        RcpError::Io { stage, source }
    }

    /// Returns the protocol step the error occurred in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RcpError::Connection(_) => None,
            RcpError::RemoteAccess { stage, .. }
            | RcpError::Protocol { stage, .. }
            | RcpError::Io { stage, .. } => Some(*stage),
        }
    }

    /// Returns whether the daemon explicitly refused the request.
    pub fn is_remote_access(&self) -> bool {
        matches!(self, RcpError::RemoteAccess { .. })
    }
}

impl RshError {
    pub(crate) fn io(stage: Stage, source: std::io::Error) -> Self {
        RshError::Io { stage, source }
    }
}
