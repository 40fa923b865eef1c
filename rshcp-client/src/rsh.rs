//! Remote command execution over rsh.
//!
//! The client sends one request frame and then simply reads: the daemon
//! streams the command's stdout and stderr back on the same connection
//! and closes it when the command exits. There is no framing and no exit
//! status in the reply.

use crate::connection::{connect, Connection, ConnectionConfig};
use crate::error::{RshError, Stage};
use crate::target::ExecRequest;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

/// Size of each socket read while capturing output.
pub const OUTPUT_CHUNK_SIZE: usize = 4096;

/// Captured command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Output bytes after the byte and line bounds were applied.
    pub output: Bytes,
    /// Whether a bound cut the output short.
    pub truncated: bool,
}

/// Runs `request` on its target.
///
/// Never retried: the remote command may not be idempotent.
pub async fn execute(
    request: &ExecRequest,
    config: &ConnectionConfig,
) -> Result<ExecOutput, RshError> {
    let frame = request.target.exec_frame(&request.command).encode()?;

    tracing::debug!(
        "Executing on {} as {}: {}",
        request.target.authority(),
        request.target.remote_user(),
        request.command
    );
    let conn = connect(&request.target, config).await?;
    execute_on(conn, &frame, request).await
}

/// Runs an encoded request over an established connection, then closes it.
pub async fn execute_on<S>(
    mut conn: Connection<S>,
    frame: &[u8],
    request: &ExecRequest,
) -> Result<ExecOutput, RshError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = run(&mut conn, frame, request).await;
    conn.close().await;
    result
}

async fn run<S>(
    conn: &mut Connection<S>,
    frame: &[u8],
    request: &ExecRequest,
) -> Result<ExecOutput, RshError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.send(frame)
        .await
        .map_err(|e| RshError::io(Stage::Request, e))?;

    let max_bytes = request.byte_limit();
    let (output, byte_limited) = capture(conn, max_bytes).await?;

    if output.is_empty() {
        return Ok(ExecOutput {
            output: Bytes::new(),
            truncated: false,
        });
    }

    let (output, line_limited) = limit_lines(&output, request.line_limit(), request.tail);
    tracing::debug!(
        "Captured {} bytes from {}{}",
        output.len(),
        conn.peer(),
        if byte_limited || line_limited {
            " (truncated)"
        } else {
            ""
        }
    );

    Ok(ExecOutput {
        output,
        truncated: byte_limited || line_limited,
    })
}

/// Reads output until the stream ends or more than `max_bytes` arrive.
///
/// Returns the first `max_bytes` bytes and whether anything past them was
/// dropped. A read error ends the output like a close does, unless nothing
/// has been received yet; then it is reported.
async fn capture<S>(
    conn: &mut Connection<S>,
    max_bytes: usize,
) -> Result<(BytesMut, bool), RshError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut output = BytesMut::with_capacity(max_bytes.min(64 * OUTPUT_CHUNK_SIZE));
    let mut chunk = vec![0u8; OUTPUT_CHUNK_SIZE];

    loop {
        match conn.read_chunk(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let take = n.min(max_bytes - output.len());
                output.extend_from_slice(&chunk[..take]);
                if take < n {
                    return Ok((output, true));
                }
            }
            Err(e) if output.is_empty() => return Err(RshError::io(Stage::Output, e)),
            Err(e) => {
                tracing::debug!(
                    "Read error after {} bytes, ending output: {}",
                    output.len(),
                    e
                );
                break;
            }
        }
    }

    Ok((output, false))
}

/// Keeps at most `max_lines` newline-separated pieces of `output`.
///
/// Pieces are taken from the front, or from the back when `tail` is set,
/// and joined again with `\n`. Returns whether anything was dropped.
pub fn limit_lines(output: &[u8], max_lines: usize, tail: bool) -> (Bytes, bool) {
    let lines: Vec<&[u8]> = output.split(|b| *b == b'\n').collect();
    if lines.len() <= max_lines {
        return (Bytes::copy_from_slice(output), false);
    }

    let kept = if tail {
        &lines[lines.len() - max_lines..]
    } else {
        &lines[..max_lines]
    };
    (Bytes::from(kept.join(&b'\n')), true)
}
