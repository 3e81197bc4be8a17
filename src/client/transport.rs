// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persistent RTSP connection: request/response framing over a
//! plaintext-or-TLS byte stream, CSeq dispatch, and interleaved-frame
//! demultiplexing.
//!
//! Polymorphic over `{plaintext-TCP, TLS-TCP}` via the [`AsyncStream`] trait
//! object: this crate ships the plaintext TCP implementation here, and a TLS
//! stream (eg `tokio_rustls::client::TlsStream`) satisfies the same trait
//! without any change to this module. The only capability this module asks
//! of the underlying socket is a connected, byte-oriented stream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use crate::error::{Error, ErrorInt};
use crate::proto::interleaved::{Demuxer, Frame};
use crate::proto::message::{Headers, Method, Request, Response, ResponseParser};
use crate::{ConnectionContext, RtspMessageContext};

/// A connected, byte-oriented duplex stream: satisfied by a plain
/// [`TcpStream`] or, e.g., a `tokio_rustls` `TlsStream`. This is the only
/// capability the transport requires of the underlying socket.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Connection lifecycle state. Terminal is [`State::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

struct Pending {
    tx: oneshot::Sender<Result<Response, Error>>,
}

struct Shared {
    conn_ctx: ConnectionContext,
    pending: std::sync::Mutex<HashMap<u32, Pending>>,
    sinks: std::sync::Mutex<HashMap<u8, mpsc::Sender<Bytes>>>,
    state: std::sync::Mutex<State>,
    next_cseq: AtomicU32,
}

/// Removes a CSeq's pending-request entry when dropped, so cancelling
/// `send_request` (dropping its future mid-`.await`) doesn't leak an entry
/// that no response will ever arrive to satisfy.
struct PendingGuard<'a> {
    shared: &'a Shared,
    cseq: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().unwrap().remove(&self.cseq);
    }
}

/// An open RTSP connection: the single owner of the read side. All readers
/// (response waiters, interleaved-channel sinks) receive their data through
/// it rather than touching the socket directly.
pub struct Connection {
    shared: Arc<Shared>,
    write_half: AsyncMutex<tokio::io::WriteHalf<Box<dyn AsyncStream>>>,
    read_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Opens a TCP connection to `addr`, with a fixed connect timeout.
    pub async fn connect(addr: SocketAddr) -> Result<Self, Error> {
        let stream = tokio::time::timeout(DEFAULT_CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                wrap!(ErrorInt::ConnectError {
                    address: addr,
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                })
            })?
            .map_err(|source| wrap!(ErrorInt::ConnectError { address: addr, source }))?;
        let local_addr = stream
            .local_addr()
            .map_err(|source| wrap!(ErrorInt::ConnectError { address: addr, source }))?;
        Self::from_stream(Box::new(stream), local_addr, addr)
    }

    /// Wraps an already-established byte stream (plaintext or TLS) as a
    /// connection and starts its read loop.
    pub fn from_stream(
        stream: Box<dyn AsyncStream>,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
    ) -> Result<Self, Error> {
        let conn_ctx = ConnectionContext::new(local_addr, peer_addr);
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared {
            conn_ctx,
            pending: std::sync::Mutex::new(HashMap::new()),
            sinks: std::sync::Mutex::new(HashMap::new()),
            state: std::sync::Mutex::new(State::Open),
            next_cseq: AtomicU32::new(1),
        });
        log::debug!("[{}] connection open", conn_ctx);
        let read_task = tokio::spawn(read_loop(shared.clone(), read_half));
        Ok(Connection {
            shared,
            write_half: AsyncMutex::new(write_half),
            read_task,
        })
    }

    pub fn conn_ctx(&self) -> ConnectionContext {
        self.shared.conn_ctx
    }

    pub fn state(&self) -> State {
        *self.shared.state.lock().unwrap()
    }

    /// Registers an mpsc sink for interleaved frames on `channel_id`; the
    /// read loop delivers matching frames here in arrival order. Dropping
    /// the returned receiver is equivalent to unregistering.
    pub fn register_interleaved_sink(&self, channel_id: u8, capacity: usize) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(capacity);
        self.shared.sinks.lock().unwrap().insert(channel_id, tx);
        rx
    }

    pub fn unregister_interleaved_sink(&self, channel_id: u8) {
        self.shared.sinks.lock().unwrap().remove(&channel_id);
    }

    /// Sends a request and awaits its response, failing after `timeout` if
    /// none arrives. CSeq is assigned here, monotonically, and is never
    /// reused even after a timeout.
    pub async fn send_request(
        &self,
        method: Method,
        url: &str,
        headers: Headers,
        body: Bytes,
        timeout: Duration,
    ) -> Result<Response, Error> {
        if self.state() != State::Open {
            bail!(ErrorInt::ConnectionClosed {
                conn_ctx: self.shared.conn_ctx
            });
        }
        let cseq = self.shared.next_cseq.fetch_add(1, Ordering::SeqCst);
        let mut request = Request::new(method, url.to_owned(), cseq);
        request.headers = headers;
        request.body = body;

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap()
            .insert(cseq, Pending { tx });
        let _guard = PendingGuard {
            shared: &self.shared,
            cseq,
        };

        {
            let raw = request.serialize();
            let mut w = self.write_half.lock().await;
            if let Err(source) = w.write_all(&raw).await {
                bail!(ErrorInt::WriteError {
                    conn_ctx: self.shared.conn_ctx,
                    source,
                });
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => bail!(ErrorInt::ConnectionClosed {
                conn_ctx: self.shared.conn_ctx
            }),
            Err(_) => bail!(ErrorInt::Timeout {
                cseq,
                msg: format!("{:?}", timeout),
            }),
        }
    }

    /// Writes `payload` as one `$`-framed interleaved data frame on
    /// `channel_id`, e.g. an outbound RTCP receiver report on a TCP
    /// interleaved track. Shares the same write mutex as `send_request` so
    /// the two never interleave mid-frame on the wire.
    pub async fn send_interleaved_frame(&self, channel_id: u8, payload: &[u8]) -> Result<(), Error> {
        let raw = crate::proto::interleaved::frame(channel_id, payload);
        let mut w = self.write_half.lock().await;
        w.write_all(&raw).await.map_err(|source| {
            wrap!(ErrorInt::WriteError {
                conn_ctx: self.shared.conn_ctx,
                source,
            })
        })
    }

    /// Half-closes the write side and marks the connection closed. The read
    /// task notices the resulting EOF and fails any stragglers.
    pub async fn close(&self) {
        log::debug!("[{}] closing connection", self.shared.conn_ctx);
        *self.shared.state.lock().unwrap() = State::Closing;
        let mut w = self.write_half.lock().await;
        let _ = w.shutdown().await;
        *self.shared.state.lock().unwrap() = State::Closed;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

async fn read_loop(shared: Arc<Shared>, mut read_half: tokio::io::ReadHalf<Box<dyn AsyncStream>>) {
    let mut demux = Demuxer::new();
    let mut parser = ResponseParser::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut pos: u64 = 0;

    loop {
        let n = match read_half.read(&mut chunk).await {
            Ok(0) => {
                fail_all(
                    &shared,
                    wrap!(ErrorInt::ConnectionClosed {
                        conn_ctx: shared.conn_ctx
                    }),
                );
                return;
            }
            Ok(n) => n,
            Err(source) => {
                fail_all(
                    &shared,
                    wrap!(ErrorInt::ReadError {
                        conn_ctx: shared.conn_ctx,
                        source,
                    }),
                );
                return;
            }
        };
        pos += n as u64;
        demux.push(&chunk[..n]);

        loop {
            if demux.starts_frame() {
                match demux.next_frame() {
                    Ok(Some(frame)) => dispatch_frame(&shared, frame),
                    Ok(None) => break,
                    Err(description) => {
                        fail_all(
                            &shared,
                            wrap!(ErrorInt::RtspFramingError {
                                conn_ctx: shared.conn_ctx,
                                msg_ctx: RtspMessageContext::new(pos),
                                description,
                            }),
                        );
                        return;
                    }
                }
            } else {
                // Response bytes and interleaved-frame bytes share the same
                // buffer; hand it to the response parser and put back
                // whatever it didn't consume (eg a `$` frame that arrived
                // in the same read as the tail of a response).
                let mut scratch = std::mem::take(demux.buf_mut());
                let result = parser.parse(&mut scratch);
                *demux.buf_mut() = scratch;
                match result {
                    Ok(Some(response)) => dispatch_response(&shared, response),
                    Ok(None) => break,
                    Err(description) => {
                        fail_all(
                            &shared,
                            wrap!(ErrorInt::RtspResponseError {
                                conn_ctx: shared.conn_ctx,
                                msg_ctx: RtspMessageContext::new(pos),
                                description,
                            }),
                        );
                        return;
                    }
                }
            }
        }
    }
}

fn dispatch_response(shared: &Shared, response: Response) {
    let cseq = match response.cseq {
        Some(c) => c,
        None => return,
    };
    // 1xx is informational and must not complete the waiting request future.
    if !response.is_final() {
        return;
    }
    if let Some(pending) = shared.pending.lock().unwrap().remove(&cseq) {
        let _ = pending.tx.send(Ok(response));
    }
}

fn dispatch_frame(shared: &Shared, frame: Frame) {
    let sinks = shared.sinks.lock().unwrap();
    if let Some(tx) = sinks.get(&frame.channel_id) {
        // Dropping when the consumer is slow (or absent) keeps the
        // connection's read loop from ever blocking on a stalled sink.
        let _ = tx.try_send(frame.payload);
    }
}

fn fail_all(shared: &Shared, err: Error) {
    log::warn!("[{}] failing all pending requests: {}", shared.conn_ctx, err);
    *shared.state.lock().unwrap() = State::Closed;
    let mut pending = shared.pending.lock().unwrap();
    for (_, p) in pending.drain() {
        let _ = p.tx.send(Err(err.clone()));
    }
}
