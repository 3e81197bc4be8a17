// SPDX-License-Identifier: MIT OR Apache-2.0

//! The client-side RTSP API: connect, negotiate tracks, play, and receive.
//!
//! [`session::Session`] is the entry point. It owns one [`transport::Connection`]
//! and drives the RTSP request/response exchange plus the paired RTP/RTCP
//! traffic for however many tracks `SETUP` negotiates.

pub mod rtcp;
pub mod rtp;
pub mod session;
pub mod track;
pub mod transport;
mod udp;

pub use crate::auth::Credentials;
pub use rtp::Packet;
pub use session::{Event, Session, SessionOptions, SessionState};
pub use track::{Track, TransportDescriptor, TransportPreference};
pub use transport::{AsyncStream, Connection};
