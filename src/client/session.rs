// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RTSP session state machine: `OPTIONS` discovery, `DESCRIBE`/SDP,
//! per-track `SETUP`, `PLAY`/`PAUSE`/`RECORD`/`TEARDOWN`, keep-alive, and the
//! cooperative loop that pumps RTP/RTCP once playing.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::auth;
use crate::error::{Error, ErrorInt};
use crate::proto::message::{Headers, Method};
use crate::sdp;
use crate::url::RtspUrl;
use crate::RtspMessageContext;

use super::rtcp;
use super::rtp;
use super::track::{Track, TransportDescriptor, TransportPreference};
use super::transport::{self, Connection};
use super::udp::UdpPair;

/// `INIT -> DESCRIBED -> READY -> PLAYING -> { PAUSED | RECORDING | ENDED |
/// ERRORED }`, renamed from the overview's shouted form to this crate's
/// idiom. Illegal method-for-state calls are rejected locally, without
/// touching the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Described,
    Ready,
    Playing,
    Paused,
    Recording,
    Ended,
    Errored,
}

/// Options governing how a [`Session`] negotiates and authenticates.
#[derive(Clone)]
pub struct SessionOptions {
    pub creds: Option<auth::Credentials>,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            creds: None,
            user_agent: "camrtsp".to_owned(),
            request_timeout: transport::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// A decoded event produced while [`Session::run_until_teardown`] pumps the
/// transport.
#[derive(Debug)]
pub enum Event {
    Rtp { track_index: usize, packet: rtp::Packet },
    SenderReport { track_index: usize },
    Bye { track_index: usize },
}

enum RawChannel {
    Tcp(mpsc::Receiver<Bytes>),
    Udp(UdpSocket),
}

impl RawChannel {
    async fn recv(&mut self) -> Option<Bytes> {
        match self {
            RawChannel::Tcp(rx) => rx.recv().await,
            RawChannel::Udp(sock) => {
                let mut buf = vec![0u8; 2048];
                match sock.recv(&mut buf).await {
                    Ok(n) => {
                        buf.truncate(n);
                        Some(Bytes::from(buf))
                    }
                    Err(_) => None,
                }
            }
        }
    }

    async fn send(&mut self, raw: &[u8], remote: Option<SocketAddr>) -> Result<(), Error> {
        if let (RawChannel::Udp(sock), Some(addr)) = (self, remote) {
            sock.send_to(raw, addr).await.map_err(|source| {
                wrap!(ErrorInt::WriteError {
                    conn_ctx: crate::ConnectionContext::dummy(),
                    source,
                })
            })?;
        }
        Ok(())
    }
}

struct TrackChannels {
    rtp: RawChannel,
    rtcp: RawChannel,
}

/// An RTSP session: one transport, one negotiated set of tracks, and the
/// receive-side bookkeeping for each.
pub struct Session {
    conn: Connection,
    url: RtspUrl,
    creds: Option<auth::Credentials>,
    digest_state: auth::DigestState,
    challenge: Option<auth::Challenge>,
    user_agent: String,
    request_timeout: Duration,
    state: SessionState,
    session_id: Option<String>,
    timeout: Duration,
    content_base: Option<url::Url>,
    tracks: Vec<Track>,
    next_interleaved_channel: u8,
    channels: Vec<Option<TrackChannels>>,
    receivers: Vec<Option<rtp::RtpReceiver>>,
    rtcp_inbound: Vec<rtcp::InboundState>,
    local_ssrc: u32,
    cname: String,
    supports_get_parameter: bool,
    auth_failures: u8,
    started_at: Instant,
}

impl Session {
    /// Resolves `url`'s host and opens the RTSP transport. Does not send
    /// any requests yet; call [`Self::options`] and/or [`Self::describe`]
    /// next.
    pub async fn connect(url: &str, options: SessionOptions) -> Result<Self, Error> {
        let parsed = RtspUrl::parse(url).map_err(|description| {
            wrap!(ErrorInt::RtspFramingError {
                conn_ctx: crate::ConnectionContext::dummy(),
                msg_ctx: RtspMessageContext::dummy(),
                description,
            })
        })?;
        let lookup_target = format!("{}:{}", parsed.host(), parsed.port());
        let mut addrs = tokio::net::lookup_host(lookup_target.as_str()).await.map_err(|source| {
            wrap!(ErrorInt::ConnectError {
                address: SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), parsed.port()),
                source,
            })
        })?;
        let addr = addrs.next().ok_or_else(|| {
            wrap!(ErrorInt::ConnectError {
                address: SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), parsed.port()),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
            })
        })?;
        let conn = Connection::connect(addr).await?;
        let mut rng = rand::thread_rng();
        Ok(Session {
            conn,
            url: parsed,
            creds: options.creds,
            digest_state: auth::DigestState::default(),
            challenge: None,
            user_agent: options.user_agent,
            request_timeout: options.request_timeout,
            state: SessionState::Init,
            session_id: None,
            timeout: Duration::from_secs(60),
            content_base: None,
            tracks: Vec::new(),
            next_interleaved_channel: 0,
            channels: Vec::new(),
            receivers: Vec::new(),
            rtcp_inbound: Vec::new(),
            local_ssrc: rng.gen(),
            cname: format!("camrtsp@{:08x}", rng.gen::<u32>()),
            supports_get_parameter: true,
            auth_failures: 0,
            started_at: Instant::now(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn keepalive_interval(&self) -> Duration {
        std::cmp::min(self.timeout / 2, Duration::from_secs(30))
    }

    fn apply_common_headers(&mut self, headers: &mut Headers, method: Method, url: &str) {
        headers.set("User-Agent", self.user_agent.clone());
        if let Some(session_id) = self.session_id.clone() {
            headers.set("Session", session_id);
        }
        if let (Some(challenge), Some(creds)) = (self.challenge.clone(), self.creds.clone()) {
            let authz = auth::authorization(&creds, &challenge, &method.to_string(), url, &mut self.digest_state);
            headers.set("Authorization", authz);
        }
    }

    /// Issues one request, transparently retrying exactly once on a 401 with
    /// a fresh `Authorization` header. Two consecutive 401s are fatal to the
    /// session (RFC 2326's model offers no mid-session credential rotation).
    async fn request(
        &mut self,
        method: Method,
        url: &str,
        mut headers: Headers,
        body: Bytes,
    ) -> Result<crate::proto::message::Response, Error> {
        self.apply_common_headers(&mut headers, method, url);
        let response = self
            .conn
            .send_request(method, url, headers, body.clone(), self.request_timeout)
            .await?;
        if response.status != 401 {
            self.auth_failures = 0;
            return Ok(response);
        }

        let challenge = response
            .headers
            .get("www-authenticate")
            .and_then(auth::parse_www_authenticate);
        let challenge = match challenge {
            Some(c) => c,
            None => {
                self.state = SessionState::Errored;
                bail!(ErrorInt::AuthError {
                    conn_ctx: self.conn.conn_ctx(),
                    description: "401 response carried no WWW-Authenticate header".to_owned(),
                });
            }
        };
        self.challenge = Some(challenge);
        self.auth_failures += 1;
        log::debug!("[{}] 401, retrying {} with fresh Authorization", self.conn.conn_ctx(), method);
        if self.creds.is_none() || self.auth_failures >= 2 {
            self.state = SessionState::Errored;
            bail!(ErrorInt::AuthError {
                conn_ctx: self.conn.conn_ctx(),
                description: "credentials rejected (two consecutive 401s)".to_owned(),
            });
        }

        let mut retry_headers = Headers::new();
        self.apply_common_headers(&mut retry_headers, method, url);
        let retried = self
            .conn
            .send_request(method, url, retry_headers, body, self.request_timeout)
            .await?;
        if retried.status == 401 {
            self.auth_failures += 1;
            self.state = SessionState::Errored;
            bail!(ErrorInt::AuthError {
                conn_ctx: self.conn.conn_ctx(),
                description: "credentials rejected (two consecutive 401s)".to_owned(),
            });
        }
        self.auth_failures = 0;
        Ok(retried)
    }

    /// Best-effort `OPTIONS`. A non-2xx response (even 501) still counts as
    /// liveness and does not fail the call; only a transport-level timeout
    /// does.
    pub async fn options(&mut self) -> Result<(), Error> {
        let url = self.url.without_credentials().to_string();
        match self.request(Method::Options, &url, Headers::new(), Bytes::new()).await {
            Ok(resp) => {
                if let Some(public) = resp.headers.get("public") {
                    self.supports_get_parameter = public
                        .split(',')
                        .any(|m| Method::parse(m.trim()) == Some(Method::GetParameter));
                }
                Ok(())
            }
            Err(e) if e.is_timeout() => Err(e),
            Err(_) => Ok(()),
        }
    }

    /// `DESCRIBE`s the session URL and parses the SDP body into [`Track`]s.
    pub async fn describe(&mut self) -> Result<(), Error> {
        if self.state != SessionState::Init {
            bail!(ErrorInt::IllegalStateError {
                description: format!("DESCRIBE illegal in state {:?}", self.state),
            });
        }
        let url = self.url.without_credentials().to_string();
        let mut headers = Headers::new();
        headers.set("Accept", "application/sdp");
        let resp = self.request(Method::Describe, &url, headers, Bytes::new()).await?;
        if !resp.is_success() {
            bail!(ErrorInt::RtspStatusError {
                conn_ctx: self.conn.conn_ctx(),
                msg_ctx: RtspMessageContext::dummy(),
                cseq: resp.cseq.unwrap_or(0),
                status: resp.status,
                description: "DESCRIBE failed".to_owned(),
            });
        }
        let text = std::str::from_utf8(&resp.body)
            .map_err(|_| wrap!(ErrorInt::SdpParseError { description: "non-UTF-8 SDP body".to_owned() }))?;
        let description = sdp::parse(text).map_err(|description| wrap!(ErrorInt::SdpParseError { description }))?;

        let base = resp
            .headers
            .get("content-base")
            .or_else(|| resp.headers.get("content-location"))
            .map(|s| s.to_owned());
        let base_url = match base {
            Some(b) => url::Url::parse(&b).map_err(|e| {
                wrap!(ErrorInt::SdpParseError {
                    description: format!("invalid Content-Base {:?}: {}", b, e),
                })
            })?,
            None => self.url.without_credentials(),
        };
        self.content_base = Some(base_url.clone());

        self.tracks = description
            .media
            .iter()
            .map(|m| {
                let control = m
                    .control
                    .as_deref()
                    .or(description.control.as_deref())
                    .unwrap_or("*");
                let resolved = sdp::resolve_control(&base_url, control).unwrap_or_else(|_| base_url.clone());
                Track::new(resolved.to_string(), m)
            })
            .collect();
        self.channels = self.tracks.iter().map(|_| None).collect();
        self.receivers = self.tracks.iter().map(|_| None).collect();
        self.rtcp_inbound = self.tracks.iter().map(|_| rtcp::InboundState::default()).collect();
        self.state = SessionState::Described;
        Ok(())
    }

    /// Negotiates transport for one track, binding UDP ports or registering
    /// interleaved channels before the request is sent.
    pub async fn setup(&mut self, index: usize, pref: TransportPreference) -> Result<(), Error> {
        if !matches!(self.state, SessionState::Described | SessionState::Ready) {
            bail!(ErrorInt::IllegalStateError {
                description: format!("SETUP illegal in state {:?}", self.state),
            });
        }
        let track_url = self
            .tracks
            .get(index)
            .ok_or_else(|| wrap!(ErrorInt::IllegalStateError { description: "no such track".to_owned() }))?
            .control_url
            .clone();

        let (transport_header, raw_channels) = match pref {
            TransportPreference::Udp => {
                let ip = self.conn.conn_ctx().local_addr.ip();
                let pair = UdpPair::for_ip(ip).await?;
                let header = format!("RTP/AVP;unicast;client_port={}-{}", pair.rtp_port, pair.rtp_port + 1);
                (
                    header,
                    TrackChannels {
                        rtp: RawChannel::Udp(pair.rtp_socket),
                        rtcp: RawChannel::Udp(pair.rtcp_socket),
                    },
                )
            }
            TransportPreference::TcpInterleaved => {
                let rtp_channel = self.next_interleaved_channel;
                let rtcp_channel = rtp_channel + 1;
                self.next_interleaved_channel += 2;
                let header = format!("RTP/AVP/TCP;unicast;interleaved={}-{}", rtp_channel, rtcp_channel);
                (
                    header,
                    TrackChannels {
                        rtp: RawChannel::Tcp(self.conn.register_interleaved_sink(rtp_channel, 256)),
                        rtcp: RawChannel::Tcp(self.conn.register_interleaved_sink(rtcp_channel, 32)),
                    },
                )
            }
        };

        let mut headers = Headers::new();
        headers.set("Transport", transport_header);
        let resp = self.request(Method::Setup, &track_url, headers, Bytes::new()).await?;
        if !resp.is_success() {
            bail!(ErrorInt::RtspStatusError {
                conn_ctx: self.conn.conn_ctx(),
                msg_ctx: RtspMessageContext::dummy(),
                cseq: resp.cseq.unwrap_or(0),
                status: resp.status,
                description: "SETUP failed".to_owned(),
            });
        }

        if self.session_id.is_none() {
            if let Some(session_header) = resp.headers.get("session") {
                let (token, timeout) = parse_session_header(session_header);
                self.session_id = Some(token);
                if let Some(t) = timeout {
                    self.timeout = Duration::from_secs(t);
                }
            }
        }

        let descriptor = resp
            .headers
            .get("transport")
            .and_then(parse_transport_response)
            .unwrap_or(match pref {
                TransportPreference::Udp => TransportDescriptor::Udp {
                    client_rtp_port: 0,
                    client_rtcp_port: 0,
                    server_rtp_port: None,
                    server_rtcp_port: None,
                    ssrc: None,
                },
                TransportPreference::TcpInterleaved => {
                    TransportDescriptor::TcpInterleaved { rtp_channel: 0, rtcp_channel: 0 }
                }
            });
        self.tracks[index].transport = Some(descriptor);
        self.channels[index] = Some(raw_channels);
        let clock_rate = self.tracks[index]
            .clock_rate
            .unwrap_or_else(|| std::num::NonZeroU32::new(90_000).unwrap());
        self.receivers[index] = Some(rtp::RtpReceiver::new(index, clock_rate));
        self.state = SessionState::Ready;
        Ok(())
    }

    /// `PLAY`s from the current position (`npt=0.000-` on first play).
    /// Seeds each track's timeline from `RTP-Info`, if present.
    pub async fn play(&mut self) -> Result<(), Error> {
        if !matches!(self.state, SessionState::Ready | SessionState::Paused) {
            bail!(ErrorInt::IllegalStateError {
                description: format!("PLAY illegal in state {:?}", self.state),
            });
        }
        let url = self.url.without_credentials().to_string();
        let mut headers = Headers::new();
        headers.set("Range", "npt=0.000-");
        let resp = self.request(Method::Play, &url, headers, Bytes::new()).await?;
        if !resp.is_success() {
            bail!(ErrorInt::RtspStatusError {
                conn_ctx: self.conn.conn_ctx(),
                msg_ctx: RtspMessageContext::dummy(),
                cseq: resp.cseq.unwrap_or(0),
                status: resp.status,
                description: "PLAY failed".to_owned(),
            });
        }
        if let Some(rtp_info) = resp.headers.get("rtp-info").map(|s| s.to_owned()) {
            for entry in rtp_info.split(',') {
                let mut url_match = None;
                let mut rtptime = None;
                for field in entry.split(';') {
                    let field = field.trim();
                    if let Some(v) = field.strip_prefix("url=") {
                        url_match = Some(v.to_owned());
                    } else if let Some(v) = field.strip_prefix("rtptime=") {
                        rtptime = v.parse::<u32>().ok();
                    }
                }
                if let (Some(u), Some(rtptime)) = (url_match, rtptime) {
                    if let Some(idx) = self.tracks.iter().position(|t| t.control_url == u) {
                        if let Some(recv) = self.receivers.get_mut(idx).and_then(|r| r.as_mut()) {
                            recv.seed_start_timestamp(rtptime);
                        }
                    }
                }
            }
        }
        self.state = SessionState::Playing;
        Ok(())
    }

    /// `PAUSE`s a playing session; a subsequent [`Self::play`] resumes
    /// without re-running `SETUP`.
    pub async fn pause(&mut self) -> Result<(), Error> {
        if self.state != SessionState::Playing {
            bail!(ErrorInt::IllegalStateError {
                description: "PAUSE is only legal while Playing".to_owned(),
            });
        }
        let url = self.url.without_credentials().to_string();
        let resp = self.request(Method::Pause, &url, Headers::new(), Bytes::new()).await?;
        if !resp.is_success() {
            bail!(ErrorInt::RtspStatusError {
                conn_ctx: self.conn.conn_ctx(),
                msg_ctx: RtspMessageContext::dummy(),
                cseq: resp.cseq.unwrap_or(0),
                status: resp.status,
                description: "PAUSE failed".to_owned(),
            });
        }
        self.state = SessionState::Paused;
        Ok(())
    }

    /// Issues `RECORD` instead of `PLAY`. This is a thin wire-level
    /// operation, symmetrical with `play()`: it does not stand up a
    /// recording pipeline (no local storage, no sending media upstream).
    pub async fn record(&mut self) -> Result<(), Error> {
        if !matches!(self.state, SessionState::Ready | SessionState::Paused) {
            bail!(ErrorInt::IllegalStateError {
                description: format!("RECORD illegal in state {:?}", self.state),
            });
        }
        let url = self.url.without_credentials().to_string();
        let resp = self.request(Method::Record, &url, Headers::new(), Bytes::new()).await?;
        if !resp.is_success() {
            bail!(ErrorInt::RtspStatusError {
                conn_ctx: self.conn.conn_ctx(),
                msg_ctx: RtspMessageContext::dummy(),
                cseq: resp.cseq.unwrap_or(0),
                status: resp.status,
                description: "RECORD failed".to_owned(),
            });
        }
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Always attempted on close, even from [`SessionState::Errored`];
    /// best-effort, so its failure doesn't prevent resource release.
    pub async fn teardown(&mut self) -> Result<(), Error> {
        let url = self.url.without_credentials().to_string();
        let result = self.request(Method::Teardown, &url, Headers::new(), Bytes::new()).await;
        self.state = SessionState::Ended;
        self.conn.close().await;
        result.map(|_| ())
    }

    /// Sends one keep-alive (`GET_PARAMETER` if the server advertised it in
    /// `OPTIONS`'s `Public` header, else `OPTIONS`). Any response, even a
    /// non-2xx one, demonstrates liveness; only a transport error or
    /// timeout is fatal.
    pub async fn send_keepalive(&mut self) -> Result<(), Error> {
        let method = if self.supports_get_parameter {
            Method::GetParameter
        } else {
            Method::Options
        };
        let url = self.url.without_credentials().to_string();
        match self.request(method, &url, Headers::new(), Bytes::new()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                log::warn!("[{}] keep-alive failed, session errored: {}", self.conn.conn_ctx(), e);
                self.state = SessionState::Errored;
                Err(e)
            }
        }
    }

    /// Builds and sends one outbound compound RR+SDES packet for every
    /// track with inbound RTP seen so far.
    pub async fn send_receiver_reports(&mut self) -> Result<(), Error> {
        let mut blocks = Vec::new();
        for idx in 0..self.tracks.len() {
            let lsr = self.rtcp_inbound[idx].last_sr_middle32;
            let dlsr = self.rtcp_inbound[idx].delay_since_last_sr();
            if let Some(stats) = self.receivers.get_mut(idx).and_then(|r| r.as_mut()).and_then(|r| r.stats_mut()) {
                blocks.push(stats.to_report_block(lsr, dlsr));
            }
        }
        if blocks.is_empty() {
            return Ok(());
        }
        log::trace!("[{}] sending RR+SDES for {} track(s)", self.conn.conn_ctx(), blocks.len());
        let raw = rtcp::build_receiver_report(self.local_ssrc, &self.cname, &blocks);
        self.send_rtcp_raw(&raw).await
    }

    async fn send_rtcp_raw(&mut self, raw: &Bytes) -> Result<(), Error> {
        let peer_ip = self.conn.conn_ctx().peer_addr.ip();
        for idx in 0..self.tracks.len() {
            let transport = match &self.tracks[idx].transport {
                Some(t) => t.clone(),
                None => continue,
            };
            match transport {
                TransportDescriptor::TcpInterleaved { rtcp_channel, .. } => {
                    self.conn.send_interleaved_frame(rtcp_channel, raw).await?;
                }
                TransportDescriptor::Udp { server_rtcp_port: Some(port), .. } => {
                    if let Some(Some(channels)) = self.channels.get_mut(idx) {
                        channels.rtcp.send(raw, Some(SocketAddr::new(peer_ip, port))).await?;
                    }
                }
                TransportDescriptor::Udp { server_rtcp_port: None, .. } => {}
            }
        }
        Ok(())
    }

    /// Pulls one raw datagram/frame off any registered track channel,
    /// tagging it with the originating track index and whether it arrived
    /// on the RTCP sub-channel.
    async fn recv_raw(&mut self) -> Option<(usize, bool, Bytes)> {
        let mut futures: Vec<Pin<Box<dyn Future<Output = Option<Bytes>> + Send + '_>>> = Vec::new();
        let mut tags = Vec::new();
        for (idx, channels) in self.channels.iter_mut().enumerate() {
            if let Some(channels) = channels {
                futures.push(Box::pin(channels.rtp.recv()));
                tags.push((idx, false));
                futures.push(Box::pin(channels.rtcp.recv()));
                tags.push((idx, true));
            }
        }
        if futures.is_empty() {
            return None;
        }
        let (result, index, _) = futures::future::select_all(futures).await;
        let (track_idx, is_rtcp) = tags[index];
        result.map(|data| (track_idx, is_rtcp, data))
    }

    /// Drives the session once playing: keep-alive timer, per-track RTCP
    /// emission, and inbound RTP/RTCP dispatch, calling `on_event` for each
    /// decoded item. Returns once the transport is closed (eg after a
    /// caller-issued `teardown()` on another handle, which isn't possible
    /// with `&mut self` here — so in practice this runs until a transport
    /// error, which `on_event`'s caller should treat as "call teardown and
    /// stop").
    pub async fn run_until_teardown(&mut self, mut on_event: impl FnMut(Event)) -> Result<(), Error> {
        let mut keepalive = tokio::time::interval(self.keepalive_interval().max(Duration::from_millis(1)));
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut rtcp_deadline = tokio::time::sleep(rtcp::next_interval(rtcp::MIN_RTCP_INTERVAL));
        tokio::pin!(rtcp_deadline);

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    self.send_keepalive().await?;
                }
                () = &mut rtcp_deadline => {
                    self.send_receiver_reports().await?;
                    rtcp_deadline.as_mut().reset(tokio::time::Instant::now() + rtcp::next_interval(rtcp::MIN_RTCP_INTERVAL));
                }
                maybe = self.recv_raw() => {
                    match maybe {
                        None => return Ok(()),
                        Some((idx, true, data)) => {
                            if let Ok(packets) = crate::proto::rtcp::parse_compound(&data) {
                                let left = packets.iter().any(|p| matches!(p, crate::proto::rtcp::Packet::Bye(_)));
                                self.rtcp_inbound[idx].apply(&packets);
                                on_event(Event::SenderReport { track_index: idx });
                                if left {
                                    on_event(Event::Bye { track_index: idx });
                                }
                            }
                        }
                        Some((idx, false, data)) => {
                            let clock_rate = self.tracks[idx]
                                .clock_rate
                                .unwrap_or_else(|| std::num::NonZeroU32::new(90_000).unwrap());
                            let arrival = (self.started_at.elapsed().as_secs_f64() * clock_rate.get() as f64) as u32;
                            let ctx = crate::PacketContext::dummy();
                            if let Some(recv) = self.receivers.get_mut(idx).and_then(|r| r.as_mut()) {
                                if let Some(packet) = recv.receive(ctx, data, arrival) {
                                    on_event(Event::Rtp { track_index: idx, packet });
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn parse_session_header(value: &str) -> (String, Option<u64>) {
    let mut parts = value.split(';');
    let token = parts.next().unwrap_or("").trim().to_owned();
    let timeout = parts.find_map(|p| p.trim().strip_prefix("timeout=").and_then(|v| v.parse().ok()));
    (token, timeout)
}

fn parse_transport_response(value: &str) -> Option<TransportDescriptor> {
    let is_interleaved = value.to_ascii_lowercase().contains("interleaved=");
    if is_interleaved {
        let interleaved = value.split(';').find_map(|p| p.trim().strip_prefix("interleaved="))?;
        let (a, b) = interleaved.split_once('-')?;
        Some(TransportDescriptor::TcpInterleaved {
            rtp_channel: a.parse().ok()?,
            rtcp_channel: b.parse().ok()?,
        })
    } else {
        let mut client_rtp_port = 0;
        let mut client_rtcp_port = 0;
        let mut server_rtp_port = None;
        let mut server_rtcp_port = None;
        let mut ssrc = None;
        for part in value.split(';') {
            let part = part.trim();
            if let Some(v) = part.strip_prefix("client_port=") {
                if let Some((a, b)) = v.split_once('-') {
                    client_rtp_port = a.parse().unwrap_or(0);
                    client_rtcp_port = b.parse().unwrap_or(0);
                }
            } else if let Some(v) = part.strip_prefix("server_port=") {
                if let Some((a, b)) = v.split_once('-') {
                    server_rtp_port = a.parse().ok();
                    server_rtcp_port = b.parse().ok();
                }
            } else if let Some(v) = part.strip_prefix("ssrc=") {
                ssrc = u32::from_str_radix(v, 16).ok();
            }
        }
        Some(TransportDescriptor::Udp {
            client_rtp_port,
            client_rtcp_port,
            server_rtp_port,
            server_rtcp_port,
            ssrc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_header_with_timeout() {
        let (token, timeout) = parse_session_header("12345678;timeout=60");
        assert_eq!(token, "12345678");
        assert_eq!(timeout, Some(60));
    }

    #[test]
    fn parses_session_header_without_timeout() {
        let (token, timeout) = parse_session_header("abcdef");
        assert_eq!(token, "abcdef");
        assert_eq!(timeout, None);
    }

    #[test]
    fn parses_udp_transport_response() {
        let value = "RTP/AVP;unicast;client_port=50000-50001;server_port=6000-6001;ssrc=1A2B3C4D";
        let descriptor = parse_transport_response(value).unwrap();
        match descriptor {
            TransportDescriptor::Udp {
                client_rtp_port,
                client_rtcp_port,
                server_rtp_port,
                server_rtcp_port,
                ssrc,
            } => {
                assert_eq!(client_rtp_port, 50000);
                assert_eq!(client_rtcp_port, 50001);
                assert_eq!(server_rtp_port, Some(6000));
                assert_eq!(server_rtcp_port, Some(6001));
                assert_eq!(ssrc, Some(0x1A2B3C4D));
            }
            _ => panic!("expected udp"),
        }
    }

    #[test]
    fn parses_tcp_interleaved_transport_response() {
        let value = "RTP/AVP/TCP;unicast;interleaved=0-1";
        let descriptor = parse_transport_response(value).unwrap();
        match descriptor {
            TransportDescriptor::TcpInterleaved { rtp_channel, rtcp_channel } => {
                assert_eq!(rtp_channel, 0);
                assert_eq!(rtcp_channel, 1);
            }
            _ => panic!("expected tcp interleaved"),
        }
    }
}
