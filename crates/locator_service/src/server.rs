//! Newline-delimited JSON over TCP.
//!
//! Each connection is read line by line; every line is one [`ServiceRequest`] and gets exactly
//! one [`ServiceReply`] line back, in order. A malformed line, including invalid UTF-8 or a
//! line longer than [`MAX_LINE_BYTES`], is answered with a 400 and the connection stays open.
//!
//! [`ServiceRequest`]: crate::contract::ServiceRequest
//! [`ServiceReply`]: crate::contract::ServiceReply

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::contract::ServiceReply;
use crate::handlers::LocatorService;

/// Longest accepted request line, excluding the terminator.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

pub struct LocatorServer {
    listener: TcpListener,
    service: Arc<LocatorService>,
}

impl LocatorServer {
    pub async fn bind(addr: &str, service: Arc<LocatorService>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves. Open connections are left to finish on
    /// their own tasks.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(component = "server", %addr, "locator_server_listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(value) => value,
                        Err(error) => {
                            warn!(component = "server", error = %error, "accept_failed");
                            continue;
                        }
                    };
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(error) = serve_connection(stream, service).await {
                            warn!(component = "server", %peer, error = %error, "connection_failed");
                        }
                    });
                }
                () = &mut shutdown => {
                    info!(component = "server", %addr, "locator_server_stopping");
                    return Ok(());
                }
            }
        }
    }
}

impl std::fmt::Debug for LocatorServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocatorServer")
            .field("listener", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

async fn serve_connection(stream: TcpStream, service: Arc<LocatorService>) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    debug!(component = "server", %peer, "connection_opened");

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        let (reply, at_eof) = match read_frame(&mut reader, &mut buf).await? {
            Frame::Eof => break,
            Frame::Line(line) if line.trim().is_empty() => continue,
            Frame::Line(line) => (Arc::clone(&service).handle_line_async(line).await, false),
            Frame::Rejected { message, at_eof } => {
                warn!(component = "server", %peer, reason = %message, "malformed_request");
                (ServiceReply::malformed(message), at_eof)
            }
        };
        writer.write_all(&encode_reply(&reply)).await?;
        if at_eof {
            break;
        }
    }

    debug!(component = "server", %peer, "connection_closed");
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Frame {
    Line(String),
    /// A line that cannot be decoded; `at_eof` is set when the peer closed mid-line.
    Rejected { message: String, at_eof: bool },
    Eof,
}

/// Read one `\n`-terminated line of at most [`MAX_LINE_BYTES`]. Oversized lines are drained up
/// to their terminator so the next request starts cleanly.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }

    if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_BYTES {
        let at_eof = !drain_line(reader).await?;
        return Ok(Frame::Rejected {
            message: format!("request line exceeds {MAX_LINE_BYTES} bytes"),
            at_eof,
        });
    }

    let mut line = buf.as_slice();
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest.strip_suffix(b"\r").unwrap_or(rest);
    }
    match std::str::from_utf8(line) {
        Ok(text) => Ok(Frame::Line(text.to_string())),
        Err(error) => Ok(Frame::Rejected {
            message: format!("request line is not valid UTF-8: {error}"),
            at_eof: false,
        }),
    }
}

/// Discard input through the next `\n`. Returns `false` if the peer closed first.
async fn drain_line<R>(reader: &mut R) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let read = (&mut *reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut scratch)
            .await?;
        if read == 0 {
            return Ok(false);
        }
        if scratch.last() == Some(&b'\n') {
            return Ok(true);
        }
    }
}

/// Sent when a reply fails to serialize.
const FALLBACK_REPLY: &[u8] = concat!(
    r#"{"status_code":500,"ok":false,"#,
    r#""message":"reply encoding failed","error":"internal_error"}"#
)
.as_bytes();

fn encode_reply(reply: &ServiceReply) -> Vec<u8> {
    let mut bytes = match serde_json::to_vec(reply) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(component = "server", error = %error, "reply_encoding_failed");
            FALLBACK_REPLY.to_vec()
        }
    };
    bytes.push(b'\n');
    bytes
}
