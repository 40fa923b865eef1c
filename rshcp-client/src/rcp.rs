//! Single-file transfers over rcp.
//!
//! After the request frame the remote `rcp` runs as source (`-f`) or sink
//! (`-t`) and both ends step through a fixed sequence of records and
//! single-byte acknowledgements:
//!
//! ```text
//! read  (rcp -f)                      write (rcp -t)
//!   <- 0x00  request accepted           <- 0x00 0x00  request accepted
//!   <- C<mode> <size> <name>\n          -> C0644 <size> <name>\n
//!   -> 0x00                             <- 0x00
//!   <- <size bytes> 0x00                -> <size bytes> 0x00
//!   -> 0x00                             <- 0x00
//!                                       -> E\n
//!                                       <- 0x00
//! ```
//!
//! Any deviation aborts the transfer; nothing is retried.

use crate::connection::{connect, Connection, ConnectionConfig};
use crate::error::{RcpError, Stage};
use crate::target::RemoteTarget;
use bytes::Bytes;
use rshcp_protocol::control::{error_message, is_error_record};
use rshcp_protocol::{
    check_ack, FileHeader, ProtocolError, RcpDirection, ACK, END_OF_SESSION, MAX_HEADER_LEN,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Message used when the daemon refuses a request without explanation.
const ACCESS_DENIED: &str = "remote file not found or access denied";

/// Fetches the contents of `remote_path`.
pub async fn read_file(
    target: &RemoteTarget,
    remote_path: &str,
    config: &ConnectionConfig,
) -> Result<Bytes, RcpError> {
    let frame = target
        .rcp_frame(RcpDirection::Source, remote_path)
        .encode()
        .map_err(|e| RcpError::protocol(Stage::Request, e))?;

    tracing::debug!("Reading {} from {}", remote_path, target.authority());
    let conn = connect(target, config).await?;
    receive_on(conn, &frame).await
}

/// Replaces the contents of `remote_path` with `content`.
///
/// On error the state of the remote file is unknown.
pub async fn write_file(
    target: &RemoteTarget,
    remote_path: &str,
    content: &[u8],
    config: &ConnectionConfig,
) -> Result<(), RcpError> {
    let frame = target
        .rcp_frame(RcpDirection::Sink, remote_path)
        .encode()
        .map_err(|e| RcpError::protocol(Stage::Request, e))?;
    let header = FileHeader::for_upload(remote_path, content.len() as u64)
        .map_err(|e| RcpError::protocol(Stage::Header, e))?;

    tracing::debug!(
        "Writing {} bytes to {} on {}",
        content.len(),
        remote_path,
        target.authority()
    );
    let conn = connect(target, config).await?;
    send_on(conn, &frame, header, content).await
}

/// Runs a read session on an established connection, then closes it.
pub async fn receive_on<S>(mut conn: Connection<S>, frame: &[u8]) -> Result<Bytes, RcpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = RcpTransfer::new(&mut conn).receive(frame).await;
    conn.close().await;
    result
}

/// Runs a write session on an established connection, then closes it.
pub async fn send_on<S>(
    mut conn: Connection<S>,
    frame: &[u8],
    header: FileHeader,
    content: &[u8],
) -> Result<(), RcpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = RcpTransfer::new(&mut conn)
        .send_file(frame, header, content)
        .await;
    conn.close().await;
    result
}

/// State of one transfer; lives for a single read or write call.
pub struct RcpTransfer<'a, S> {
    conn: &'a mut Connection<S>,
    header: Option<FileHeader>,
    transferred: u64,
}

impl<'a, S> RcpTransfer<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: &'a mut Connection<S>) -> Self {
        Self {
            conn,
            header: None,
            transferred: 0,
        }
    }

    /// Header of the file being transferred, once known.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Payload bytes moved so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Runs the source side of the daemon: request, header, payload.
    pub async fn receive(mut self, frame: &[u8]) -> Result<Bytes, RcpError> {
        self.send(Stage::Request, frame).await?;
        self.expect_accept(Stage::BeginAck).await?;

        let header = self.read_header().await?;
        tracing::debug!(
            "Receiving {} ({} bytes, mode {:04o}) from {}",
            header.name,
            header.size,
            header.mode,
            self.conn.peer()
        );
        let size = header.size;
        self.header = Some(header);
        self.send(Stage::Header, &[ACK]).await?;

        let payload = self
            .conn
            .read_up_to(size)
            .await
            .map_err(|e| RcpError::io(Stage::Payload, e))?;
        self.transferred = payload.len() as u64;
        if self.transferred < size {
            return Err(RcpError::protocol(
                Stage::Payload,
                ProtocolError::UnexpectedEof {
                    expected: size,
                    received: self.transferred,
                },
            ));
        }

        self.expect_ack(Stage::EndOfFile).await?;
        self.send(Stage::SessionEnd, &[ACK]).await?;

        Ok(payload.freeze())
    }

    /// Runs the sink side of the daemon: request, header, payload, end.
    pub async fn send_file(
        mut self,
        frame: &[u8],
        header: FileHeader,
        content: &[u8],
    ) -> Result<(), RcpError> {
        self.send(Stage::Request, frame).await?;
        self.expect_accept(Stage::BeginAck).await?;
        self.expect_accept(Stage::BeginAck).await?;

        self.send(Stage::Header, &header.encode()).await?;
        self.header = Some(header);
        self.expect_ack(Stage::HeaderAck).await?;

        self.send(Stage::Payload, content).await?;
        self.transferred = content.len() as u64;
        self.send(Stage::EndOfFile, &[ACK]).await?;
        self.expect_ack(Stage::EndOfFile).await?;

        self.send(Stage::SessionEnd, END_OF_SESSION).await?;
        self.expect_ack(Stage::SessionEnd).await?;

        tracing::debug!(
            "Sent {} bytes to {}",
            self.transferred,
            self.conn.peer()
        );
        Ok(())
    }

    async fn send(&mut self, stage: Stage, data: &[u8]) -> Result<(), RcpError> {
        self.conn
            .send(data)
            .await
            .map_err(|e| RcpError::io(stage, e))
    }

    async fn read_control(&mut self, stage: Stage) -> Result<u8, RcpError> {
        match self.conn.read_byte().await {
            Ok(Some(byte)) => Ok(byte),
            Ok(None) => Err(RcpError::protocol(
                stage,
                ProtocolError::UnexpectedEof {
                    expected: 1,
                    received: 0,
                },
            )),
            Err(e) => Err(RcpError::io(stage, e)),
        }
    }

    /// Reads an acknowledgement the daemon uses to accept or refuse a request.
    async fn expect_accept(&mut self, stage: Stage) -> Result<(), RcpError> {
        let byte = self.read_control(stage).await?;
        if byte != ACK {
            tracing::debug!("Request refused by {} ({:#04x})", self.conn.peer(), byte);
            return Err(RcpError::RemoteAccess {
                stage,
                message: ACCESS_DENIED.to_string(),
            });
        }
        Ok(())
    }

    async fn expect_ack(&mut self, stage: Stage) -> Result<(), RcpError> {
        let byte = self.read_control(stage).await?;
        check_ack(byte).map_err(|e| RcpError::protocol(stage, e))
    }

    async fn read_header(&mut self) -> Result<FileHeader, RcpError> {
        let record = self
            .conn
            .read_record(MAX_HEADER_LEN)
            .await
            .map_err(|e| RcpError::io(Stage::Header, e))?;

        if is_error_record(&record) {
            return Err(RcpError::RemoteAccess {
                stage: Stage::Header,
                message: error_message(&record),
            });
        }
        if !record.ends_with(b"\n") {
            let source = if record.len() >= MAX_HEADER_LEN {
                ProtocolError::RecordTooLong {
                    max: MAX_HEADER_LEN,
                }
            } else {
                ProtocolError::UnexpectedEof {
                    expected: record.len() as u64 + 1,
                    received: record.len() as u64,
                }
            };
            return Err(RcpError::protocol(Stage::Header, source));
        }

        FileHeader::parse(&record).map_err(|e| RcpError::protocol(Stage::Header, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{frame_command, read_frame, spawn_daemon, test_target, MemoryRcpd};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn plain() -> ConnectionConfig {
        ConnectionConfig::plain()
    }

    fn mock_conn(mock: tokio_test::io::Mock) -> Connection<tokio_test::io::Mock> {
        Connection::new(mock, "mock")
    }

    const READ_FRAME: &[u8] = b"\0alice\0bob\0rcp -f /etc/motd\0";
    const WRITE_FRAME: &[u8] = b"\0alice\0bob\0rcp -t /tmp/out.txt\0";

    #[tokio::test]
    async fn test_receive_exact_sequence() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0")
            .read(b"C0644 5 motd\n")
            .write(b"\0")
            .read(b"hello\0")
            .write(b"\0")
            .build();
        let data = receive_on(mock_conn(mock), READ_FRAME).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_receive_payload_containing_control_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0C0600 4 bin\n")
            .write(b"\0")
            .read(b"\0\n\x01\0\0")
            .write(b"\0")
            .build();
        let mut conn = mock_conn(mock);

        let data = RcpTransfer::new(&mut conn).receive(READ_FRAME).await.unwrap();
        assert_eq!(&data[..], b"\0\n\x01\0");
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_rejected() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\x01")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        assert!(err.is_remote_access());
        assert_eq!(err.stage(), Some(Stage::BeginAck));
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_error_record() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0\x01rcp: /etc/motd: No such file or directory\n")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        match err {
            RcpError::RemoteAccess { stage, message } => {
                assert_eq!(stage, Stage::Header);
                assert_eq!(message, "rcp: /etc/motd: No such file or directory");
            }
            other => panic!("unexpected error: {other}"),
        }
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_malformed_header() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0C0644 lots motd\n")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                stage: Stage::Header,
                source: ProtocolError::InvalidSize(_)
            }
        ));
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_directory_record_rejected() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0D0755 0 etc\n")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                source: ProtocolError::UnexpectedRecord(b'D'),
                ..
            }
        ));
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_truncated_payload() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0C0644 10 motd\n")
            .write(b"\0")
            .read(b"only4")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        match err {
            RcpError::Protocol {
                stage: Stage::Payload,
                source: ProtocolError::UnexpectedEof { expected, received },
            } => {
                assert_eq!(expected, 10);
                assert_eq!(received, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_bad_end_marker() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0C0644 2 motd\n")
            .write(b"\0")
            .read(b"hi\x02")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                stage: Stage::EndOfFile,
                source: ProtocolError::UnexpectedControl(2)
            }
        ));
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_missing_end_marker() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0C0644 2 motd\n")
            .write(b"\0")
            .read(b"hi")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                stage: Stage::EndOfFile,
                source: ProtocolError::UnexpectedEof { .. }
            }
        ));
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_unterminated_header() {
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0C0644 2 mo")
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                stage: Stage::Header,
                source: ProtocolError::UnexpectedEof { .. }
            }
        ));
        conn.close().await;
    }

    #[tokio::test]
    async fn test_receive_oversized_header() {
        let mut record = vec![b'C'];
        record.extend(std::iter::repeat(b'7').take(MAX_HEADER_LEN + 10));
        let mock = tokio_test::io::Builder::new()
            .write(READ_FRAME)
            .read(b"\0")
            .read(&record)
            .build();
        let mut conn = mock_conn(mock);

        let err = RcpTransfer::new(&mut conn)
            .receive(READ_FRAME)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                source: ProtocolError::RecordTooLong { .. },
                ..
            }
        ));
        drop(conn);
    }

    #[tokio::test]
    async fn test_send_file_exact_sequence() {
        let mock = tokio_test::io::Builder::new()
            .write(WRITE_FRAME)
            .read(b"\0")
            .read(b"\0")
            .write(b"C0644 11 out.txt\n")
            .read(b"\0")
            .write(b"hello world")
            .write(b"\0")
            .read(b"\0")
            .write(b"E\n")
            .read(b"\0")
            .build();
        let mut conn = mock_conn(mock);
        let header = FileHeader::for_upload("/tmp/out.txt", 11).unwrap();

        let transfer = RcpTransfer::new(&mut conn);
        assert!(transfer.header().is_none());
        assert_eq!(transfer.transferred(), 0);
        transfer
            .send_file(WRITE_FRAME, header, b"hello world")
            .await
            .unwrap();
        conn.close().await;
    }

    #[tokio::test]
    async fn test_send_file_begin_refused() {
        for script in [&b"\x01"[..], &b"\0\x01"[..]] {
            let mut builder = tokio_test::io::Builder::new();
            builder.write(WRITE_FRAME);
            for byte in script {
                builder.read(std::slice::from_ref(byte));
            }
            let mut conn = mock_conn(builder.build());
            let header = FileHeader::for_upload("/tmp/out.txt", 1).unwrap();

            let err = RcpTransfer::new(&mut conn)
                .send_file(WRITE_FRAME, header, b"x")
                .await
                .unwrap_err();
            assert!(err.is_remote_access());
            assert_eq!(err.stage(), Some(Stage::BeginAck));
            conn.close().await;
        }
    }

    #[tokio::test]
    async fn test_send_file_nack_at_each_checkpoint() {
        // (acks before the failing one, stage of the failing checkpoint)
        let cases = [
            (0, Stage::HeaderAck),
            (1, Stage::EndOfFile),
            (2, Stage::SessionEnd),
        ];
        for (acked, stage) in cases {
            let mut builder = tokio_test::io::Builder::new();
            builder.write(WRITE_FRAME).read(b"\0\0").write(b"C0644 2 out.txt\n");
            if acked == 0 {
                builder.read(b"\x02");
            } else {
                builder.read(b"\0").write(b"hi").write(b"\0");
                if acked == 1 {
                    builder.read(b"\x01");
                } else {
                    builder.read(b"\0").write(b"E\n").read(b"\x01");
                }
            }
            let mut conn = mock_conn(builder.build());
            let header = FileHeader::for_upload("/tmp/out.txt", 2).unwrap();

            let err = RcpTransfer::new(&mut conn)
                .send_file(WRITE_FRAME, header, b"hi")
                .await
                .unwrap_err();
            match err {
                RcpError::Protocol {
                    stage: got,
                    source: ProtocolError::UnexpectedControl(_),
                } => assert_eq!(got, stage),
                other => panic!("unexpected error at {stage}: {other}"),
            }
            conn.close().await;
        }
    }

    #[tokio::test]
    async fn test_read_file_over_socket() {
        let (target, daemon) = spawn_daemon(|mut stream| async move {
            let frame = read_frame(&mut stream).await;
            assert_eq!(frame_command(&frame), "rcp -f /var/log/app.log");
            stream.write_all(b"\0C0640 6 app.log\n").await.unwrap();
            assert_eq!(stream.read_u8().await.unwrap(), 0);
            stream.write_all(b"ready\n\0").await.unwrap();
            assert_eq!(stream.read_u8().await.unwrap(), 0);
        })
        .await;

        let data = read_file(&target, "/var/log/app.log", &plain()).await.unwrap();
        assert_eq!(&data[..], b"ready\n");
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_nack_closes_connection() {
        let (target, daemon) = spawn_daemon(|mut stream| async move {
            read_frame(&mut stream).await;
            stream.write_all(b"\0\0").await.unwrap();
            let mut header = [0u8; 16];
            stream.read_exact(&mut header).await.unwrap();
            assert_eq!(&header, b"C0644 3 out.txt\n");
            stream.write_all(b"\x02").await.unwrap();
            // The client hangs up instead of sending data.
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            assert!(rest.is_empty());
        })
        .await;

        let err = write_file(&target, "/tmp/out.txt", b"abc", &plain())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                stage: Stage::HeaderAck,
                ..
            }
        ));
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let rcpd = MemoryRcpd::default();
        let (target, daemon) = rcpd.spawn().await;

        let err = read_file(&target, "/nope", &plain()).await.unwrap_err();
        assert!(err.is_remote_access());
        daemon.abort();
    }

    #[tokio::test]
    async fn test_round_trip_empty_and_large() {
        let rcpd = MemoryRcpd::default();
        let (target, daemon) = rcpd.spawn().await;

        write_file(&target, "/tmp/empty", b"", &plain()).await.unwrap();
        assert_eq!(rcpd.get("/tmp/empty"), Some(Vec::new()));
        let data = read_file(&target, "/tmp/empty", &plain()).await.unwrap();
        assert!(data.is_empty());

        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        write_file(&target, "/tmp/big.bin", &content, &plain())
            .await
            .unwrap();
        let data = read_file(&target, "/tmp/big.bin", &plain()).await.unwrap();
        assert_eq!(&data[..], &content[..]);

        daemon.abort();
    }

    #[tokio::test]
    async fn test_write_rejects_path_without_file_name() {
        let err = write_file(&test_target(1), "/", b"x", &plain())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RcpError::Protocol {
                stage: Stage::Header,
                source: ProtocolError::InvalidFileName(_)
            }
        ));
    }
}
