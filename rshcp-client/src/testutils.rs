//! In-process daemons for exercising the clients over real sockets.

use crate::target::RemoteTarget;
use rshcp_protocol::FileHeader;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Accepts one connection on a fresh local port and hands it to `handler`.
pub async fn spawn_daemon<F, Fut>(handler: F) -> (RemoteTarget, JoinHandle<()>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        handler(stream).await;
    });
    (test_target(port), handle)
}

pub fn test_target(port: u16) -> RemoteTarget {
    RemoteTarget::new("127.0.0.1", port, "bob", "alice").unwrap()
}

/// Reads a request frame: four NUL-terminated fields.
pub async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut frame = Vec::new();
    let mut nuls = 0;
    while nuls < 4 {
        let byte = stream.read_u8().await.unwrap();
        if byte == 0 {
            nuls += 1;
        }
        frame.push(byte);
    }
    frame
}

/// Returns the command field of a request frame.
pub fn frame_command(frame: &[u8]) -> String {
    let fields: Vec<&[u8]> = frame.split(|b| *b == 0).collect();
    String::from_utf8(fields[3].to_vec()).unwrap()
}

async fn read_line(stream: &mut TcpStream) -> Vec<u8> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await.unwrap();
        line.push(byte);
        if byte == b'\n' {
            return line;
        }
    }
}

/// A well-behaved rcp daemon keeping files in memory.
#[derive(Clone, Default)]
pub struct MemoryRcpd {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryRcpd {
    /// Serves connections on a fresh local port until the task is aborted.
    pub async fn spawn(&self) -> (RemoteTarget, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let daemon = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                daemon.serve(stream).await;
            }
        });
        (test_target(port), handle)
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    async fn serve(&self, mut stream: TcpStream) {
        let frame = read_frame(&mut stream).await;
        let command = frame_command(&frame);

        if let Some(path) = command.strip_prefix("rcp -f ") {
            let Some(data) = self.get(path) else {
                stream.write_all(&[1]).await.unwrap();
                return;
            };
            let header = FileHeader::for_upload(path, data.len() as u64).unwrap();
            stream.write_all(&[0]).await.unwrap();
            stream.write_all(&header.encode()).await.unwrap();
            assert_eq!(stream.read_u8().await.unwrap(), 0);
            stream.write_all(&data).await.unwrap();
            stream.write_all(&[0]).await.unwrap();
            assert_eq!(stream.read_u8().await.unwrap(), 0);
        } else if let Some(path) = command.strip_prefix("rcp -t ") {
            stream.write_all(&[0, 0]).await.unwrap();
            let header = FileHeader::parse(&read_line(&mut stream).await).unwrap();
            stream.write_all(&[0]).await.unwrap();
            let mut data = vec![0u8; header.size as usize];
            stream.read_exact(&mut data).await.unwrap();
            assert_eq!(stream.read_u8().await.unwrap(), 0);
            stream.write_all(&[0]).await.unwrap();
            assert_eq!(read_line(&mut stream).await, b"E\n");
            self.files.lock().unwrap().insert(path.to_string(), data);
            stream.write_all(&[0]).await.unwrap();
        } else {
            stream.write_all(&[1]).await.unwrap();
        }
    }
}
