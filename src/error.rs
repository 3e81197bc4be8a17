// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.
//!
//! All fallible operations in this crate return [`Error`], a cheap-to-clone
//! wrapper around an [`ErrorInt`]. Cloning is needed because a single fatal
//! error (eg a dropped connection) must be observable by every pending
//! request future and by the session's own state.

use std::sync::Arc;

use crate::{ConnectionContext, RtspMessageContext};

/// An error from this crate.
///
/// Implements [`std::error::Error`] and is cheaply [`Clone`]-able: internally
/// it's an [`Arc`] around the real error detail, so the same fatal error can
/// be delivered to many pending request futures at once.
#[derive(Clone)]
pub struct Error(pub(crate) Arc<ErrorInt>);

impl Error {
    /// Returns whether this error is expected to be transient: a timeout
    /// local to one request, as opposed to something that kills the session.
    pub fn is_timeout(&self) -> bool {
        matches!(&*self.0, ErrorInt::Timeout { .. })
    }

    /// Returns whether this represents a cancellation rather than a true failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(&*self.0, ErrorInt::Cancelled)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<ErrorInt> for Error {
    fn from(e: ErrorInt) -> Self {
        Error(Arc::new(e))
    }
}

/// The full detail of an [`Error`]; see the taxonomy in the crate's design
/// documentation. Every variant that can be attributed to a connection or
/// message carries enough context (via [`ConnectionContext`] /
/// [`RtspMessageContext`]) to be matched against a packet capture.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorInt {
    #[error("error connecting to {address}: {source}")]
    ConnectError {
        address: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("[{conn_ctx}] read error: {source}")]
    ReadError {
        conn_ctx: ConnectionContext,
        #[source]
        source: std::io::Error,
    },

    #[error("[{conn_ctx}] write error: {source}")]
    WriteError {
        conn_ctx: ConnectionContext,
        #[source]
        source: std::io::Error,
    },

    #[error("[{conn_ctx}] connection closed")]
    ConnectionClosed { conn_ctx: ConnectionContext },

    #[error("[{conn_ctx}/{msg_ctx}] malformed RTSP message: {description}")]
    RtspFramingError {
        conn_ctx: ConnectionContext,
        msg_ctx: RtspMessageContext,
        description: String,
    },

    #[error("[{conn_ctx}/{msg_ctx}] RTSP response parse error: {description}")]
    RtspResponseError {
        conn_ctx: ConnectionContext,
        msg_ctx: RtspMessageContext,
        description: String,
    },

    #[error("[{conn_ctx}/{msg_ctx}] RTSP request {cseq} got status {status}: {description}")]
    RtspStatusError {
        conn_ctx: ConnectionContext,
        msg_ctx: RtspMessageContext,
        cseq: u32,
        status: u16,
        description: String,
    },

    #[error("[{conn_ctx}] authentication failed: {description}")]
    AuthError {
        conn_ctx: ConnectionContext,
        description: String,
    },

    #[error("request (CSeq={cseq}) timed out after {msg}")]
    Timeout { cseq: u32, msg: String },

    #[error("[{conn_ctx}/{msg_ctx}] RTSP data message (channel={channel_id}, stream={stream_id}) error: {description}")]
    RtspDataMessageError {
        conn_ctx: ConnectionContext,
        msg_ctx: RtspMessageContext,
        channel_id: u8,
        stream_id: usize,
        description: String,
    },

    #[error("[{conn_ctx}/{msg_ctx}] RTP packet error (channel={channel_id}, stream={stream_id}, ssrc={ssrc:08x}, seq={sequence_number:04x}): {description}")]
    RtpPacketError {
        conn_ctx: ConnectionContext,
        msg_ctx: RtspMessageContext,
        channel_id: u8,
        stream_id: usize,
        ssrc: u32,
        sequence_number: u16,
        description: String,
    },

    #[error("illegal request for current session state: {description}")]
    IllegalStateError { description: String },

    #[error("SDP parse error: {description}")]
    SdpParseError { description: String },

    #[error("operation cancelled")]
    Cancelled,
}
