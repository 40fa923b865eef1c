//! # rshcp-client
//!
//! Async client for rshd: remote command execution (rsh) and single-file
//! transfer (rcp).
//!
//! This crate provides:
//! - Connection establishment, including binding a privileged source port
//! - Bounded capture of rsh command output with line and byte limits
//! - rcp read and write sessions with strict acknowledgement checking
//! - A `Client` facade bundling the connection settings for both

pub mod client;
pub mod connection;
pub mod error;
pub mod rcp;
pub mod rsh;
pub mod target;

#[cfg(test)]
mod testutils;

pub use client::Client;
pub use connection::{connect, privileged_ports, ConnectMode, Connection, ConnectionConfig};
pub use error::{ConnectError, RcpError, RshError, Stage, TargetError};
pub use rsh::ExecOutput;
pub use target::{parse_user_host, ExecRequest, RemoteTarget};
