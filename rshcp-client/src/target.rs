//! Remote endpoints and rsh requests.

use crate::error::TargetError;
use rshcp_protocol::{RcpDirection, RequestFrame, DEFAULT_MAX_BYTES, DEFAULT_MAX_LINES};

/// A remote host together with the account pair the request runs as.
///
/// Built once per request and never modified; both user names are
/// guaranteed non-empty and NUL-free so frames built from them are valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    hostname: String,
    port: u16,
    remote_user: String,
    local_user: String,
}

impl RemoteTarget {
    /// Creates a target after validating every field.
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        remote_user: impl Into<String>,
        local_user: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let hostname = hostname.into();
        let remote_user = remote_user.into();
        let local_user = local_user.into();

        check("hostname", &hostname)?;
        check("remote user", &remote_user)?;
        check("local user", &local_user)?;
        if port == 0 {
            return Err(TargetError::InvalidPort);
        }

        Ok(Self {
            hostname,
            port,
            remote_user,
            local_user,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn remote_user(&self) -> &str {
        &self.remote_user
    }

    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    /// Returns `hostname:port` for logging.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Builds the rsh request frame running `command` as this target's users.
    pub fn exec_frame(&self, command: &str) -> RequestFrame {
        RequestFrame::new(&*self.local_user, &*self.remote_user, command)
    }

    /// Builds the frame that starts an rcp transfer of `path`.
    pub fn rcp_frame(&self, direction: RcpDirection, path: &str) -> RequestFrame {
        RequestFrame::rcp(&*self.local_user, &*self.remote_user, direction, path)
    }
}

fn check(field: &'static str, value: &str) -> Result<(), TargetError> {
    if value.is_empty() {
        return Err(TargetError::Empty(field));
    }
    if value.contains('\0') {
        return Err(TargetError::ContainsNul(field));
    }
    Ok(())
}

/// Splits `user@host` into its parts.
///
/// A bare `host` runs as `ambient_user`. More than one `@`, or an empty
/// user or host, is rejected.
pub fn parse_user_host(input: &str, ambient_user: &str) -> Result<(String, String), TargetError> {
    let invalid = || TargetError::InvalidUserHost(input.to_string());

    let parts: Vec<&str> = input.split('@').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((ambient_user.to_string(), host.to_string())),
        [user, host] if !user.is_empty() && !host.is_empty() => {
            Ok((user.to_string(), host.to_string()))
        }
        _ => Err(invalid()),
    }
}

/// A command to run through rsh with bounds on the captured output.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Where and as whom the command runs.
    pub target: RemoteTarget,
    /// Command line passed to the remote shell.
    pub command: String,
    /// Maximum number of lines returned (0 = default).
    pub max_lines: usize,
    /// Maximum number of bytes captured (0 = default).
    pub max_bytes: usize,
    /// Keep the last lines instead of the first ones.
    pub tail: bool,
}

impl ExecRequest {
    pub fn new(target: RemoteTarget, command: impl Into<String>) -> Self {
        Self {
            target,
            command: command.into(),
            max_lines: DEFAULT_MAX_LINES,
            max_bytes: DEFAULT_MAX_BYTES,
            tail: false,
        }
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_tail(mut self, tail: bool) -> Self {
        self.tail = tail;
        self
    }

    /// Line bound with the default substituted for 0.
    pub fn line_limit(&self) -> usize {
        if self.max_lines == 0 {
            DEFAULT_MAX_LINES
        } else {
            self.max_lines
        }
    }

    /// Byte bound with the default substituted for 0.
    pub fn byte_limit(&self) -> usize {
        if self.max_bytes == 0 {
            DEFAULT_MAX_BYTES
        } else {
            self.max_bytes
        }
    }
}
