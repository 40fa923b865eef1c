//! High-level client API.

use crate::connection::ConnectionConfig;
use crate::error::{RcpError, RshError};
use crate::rcp;
use crate::rsh::{self, ExecOutput};
use crate::target::{ExecRequest, RemoteTarget};
use bytes::Bytes;

/// Client for rsh command execution and rcp file transfer.
///
/// Holds only connection settings; every call opens its own connection and
/// closes it before returning, so a `Client` can be shared between tasks.
#[derive(Debug, Clone)]
pub struct Client {
    rsh: ConnectionConfig,
    rcp: ConnectionConfig,
}

impl Client {
    /// Creates a client with the standard settings: rsh from a privileged
    /// source port, rcp over a plain connection.
    pub fn new() -> Self {
        Self {
            rsh: ConnectionConfig::privileged(),
            rcp: ConnectionConfig::plain(),
        }
    }

    /// Sets the connection settings used for rsh.
    pub fn with_rsh_config(mut self, config: ConnectionConfig) -> Self {
        self.rsh = config;
        self
    }

    /// Sets the connection settings used for rcp.
    pub fn with_rcp_config(mut self, config: ConnectionConfig) -> Self {
        self.rcp = config;
        self
    }

    pub fn rsh_config(&self) -> &ConnectionConfig {
        &self.rsh
    }

    pub fn rcp_config(&self) -> &ConnectionConfig {
        &self.rcp
    }

    /// Runs a command and returns its bounded output.
    pub async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput, RshError> {
        rsh::execute(request, &self.rsh).await
    }

    /// Reads a remote file.
    pub async fn read_file(
        &self,
        target: &RemoteTarget,
        remote_path: &str,
    ) -> Result<Bytes, RcpError> {
        rcp::read_file(target, remote_path, &self.rcp).await
    }

    /// Creates or replaces a remote file.
    pub async fn write_file(
        &self,
        target: &RemoteTarget,
        remote_path: &str,
        content: &[u8],
    ) -> Result<(), RcpError> {
        rcp::write_file(target, remote_path, content, &self.rcp).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
