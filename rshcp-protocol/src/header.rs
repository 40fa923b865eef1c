//! The rcp file header record.
//!
//! Before the payload of a single file both ends exchange one text line:
//!
//! ```text
//! C<mode> <size> <name>\n
//! ```
//!
//! `mode` is the permission bits in octal (four digits when we write it),
//! `size` the decimal payload length and `name` the file's base name. The
//! name is the rest of the line and may contain spaces.

use crate::error::ProtocolError;

/// Permission bits used for files we upload.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Highest permission value representable in a header.
pub const MAX_MODE: u32 = 0o7777;

/// Upper bound on a header record, newline included.
pub const MAX_HEADER_LEN: usize = 4096;

/// Record type of a single file copy.
pub const COPY_RECORD: u8 = b'C';

/// Metadata describing one file in an rcp transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Unix permission bits.
    pub mode: u32,
    /// Exact payload length in bytes.
    pub size: u64,
    /// Base name of the file, without any path separator.
    pub name: String,
}

impl FileHeader {
    /// Creates a header after validating mode and name.
    pub fn new(mode: u32, size: u64, name: impl Into<String>) -> Result<Self, ProtocolError> {
        if mode > MAX_MODE {
            return Err(ProtocolError::InvalidMode(format!("{:o}", mode)));
        }
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { mode, size, name })
    }

    /// Creates the header announcing an upload of `size` bytes to `remote_path`.
    ///
    /// Only the final path segment goes on the wire; the directory part
    /// travels in the `rcp -t` command.
    pub fn for_upload(remote_path: &str, size: u64) -> Result<Self, ProtocolError> {
        let name = base_name(remote_path)
            .ok_or_else(|| ProtocolError::InvalidFileName(remote_path.to_string()))?;
        Self::new(DEFAULT_FILE_MODE, size, name)
    }

    /// Encodes the header record, trailing newline included.
    pub fn encode(&self) -> Vec<u8> {
        format!("C{:04o} {} {}\n", self.mode, self.size, self.name).into_bytes()
    }

    /// Parses a header record as received from the wire.
    ///
    /// A single trailing newline is accepted and stripped.
    pub fn parse(record: &[u8]) -> Result<Self, ProtocolError> {
        let record = record.strip_suffix(b"\n").unwrap_or(record);

        let (&kind, rest) = record
            .split_first()
            .ok_or_else(|| ProtocolError::MalformedHeader(String::new()))?;
        if kind != COPY_RECORD {
            return Err(ProtocolError::UnexpectedRecord(kind));
        }

        let rest = std::str::from_utf8(rest)
            .map_err(|_| ProtocolError::MalformedHeader(String::from_utf8_lossy(record).into()))?;

        let mut parts = rest.splitn(3, ' ');
        let (mode, size, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(mode), Some(size), Some(name)) => (mode, size, name),
            _ => return Err(ProtocolError::MalformedHeader(rest.to_string())),
        };

        Self::new(parse_mode(mode)?, parse_size(size)?, name)
    }
}

/// Returns the final segment of a `/`-separated path.
///
/// Trailing separators are ignored. Returns `None` when nothing names a
/// file (empty path, `/`, `.` or `..`).
pub fn base_name(path: &str) -> Option<&str> {
    let name = path.trim_end_matches('/').rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

fn parse_mode(s: &str) -> Result<u32, ProtocolError> {
    if s.is_empty() || !s.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return Err(ProtocolError::InvalidMode(s.to_string()));
    }
    match u32::from_str_radix(s, 8) {
        Ok(mode) if mode <= MAX_MODE => Ok(mode),
        _ => Err(ProtocolError::InvalidMode(s.to_string())),
    }
}

fn parse_size(s: &str) -> Result<u64, ProtocolError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidSize(s.to_string()));
    }
    s.parse()
        .map_err(|_| ProtocolError::InvalidSize(s.to_string()))
}

fn validate_name(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\n')
    {
        return Err(ProtocolError::InvalidFileName(name.to_string()));
    }
    Ok(())
}
