// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire-format codecs: RTSP request/response framing, RTP, RTCP, and the
//! interleaved-channel demultiplexer.

pub(crate) mod interleaved;
pub(crate) mod message;
pub(crate) mod rtcp;
pub(crate) mod rtp;
