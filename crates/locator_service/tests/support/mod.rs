#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use locator_core::test_helpers::in_memory_locator;
use locator_core::LocatorConfig;
use locator_service::{LocatorServer, LocatorService, ServiceReply};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A server on an ephemeral port, stopped when dropped.
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RunningServer {
    pub async fn start(config: LocatorConfig) -> Self {
        let locator = in_memory_locator(config).expect("locator");
        let service = Arc::new(LocatorService::new(
            Arc::new(locator),
            Duration::from_millis(2_000),
        ));
        Self::start_with(service).await
    }

    pub async fn start_with(service: Arc<LocatorService>) -> Self {
        let server = LocatorServer::bind("127.0.0.1:0", service)
            .await
            .expect("bind to ephemeral port");
        let addr = server.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_until(async {
                    let _ = rx.await;
                })
                .await
                .expect("server run");
        });
        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    pub async fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        Client {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await.expect("server task");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn send_raw(&mut self, line: &str) -> ServiceReply {
        self.send_bytes(format!("{line}\n").as_bytes()).await
    }

    /// Write raw bytes (terminator included) and read one reply line.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> ServiceReply {
        self.writer.write_all(bytes).await.expect("write request");
        let reply = self
            .lines
            .next_line()
            .await
            .expect("read reply")
            .expect("server closed the connection");
        serde_json::from_str(&reply).expect("reply should be JSON")
    }

    pub async fn send(&mut self, request: Value) -> ServiceReply {
        self.send_raw(&request.to_string()).await
    }
}
