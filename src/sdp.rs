// SPDX-License-Identifier: MIT OR Apache-2.0

//! A narrow SDP parser: just enough of
//! [RFC 8866](https://datatracker.ietf.org/doc/html/rfc8866) to drive `SETUP`.
//!
//! This module only extracts the handful of fields `SETUP` needs: per-`m=`
//! media type, payload type, clock rate (from `a=rtpmap:`), and
//! `a=control:`. Codec-specific format parameters (`a=fmtp:`) are left
//! opaque, consistent with depacketization being out of scope for this
//! crate.

use url::Url;

/// One `m=` line plus the attributes this crate cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub rtp_payload_type: u8,
    pub encoding_name: Option<String>,
    pub clock_rate: Option<u32>,
    pub control: Option<String>,
}

/// The subset of a parsed SDP session description SETUP needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDescription {
    /// Session-level `a=control:`, if present.
    pub control: Option<String>,
    pub media: Vec<MediaDescription>,
}

fn split_once(s: &str, delim: char) -> Option<(&str, &str)> {
    let i = s.find(delim)?;
    Some((&s[..i], &s[i + 1..]))
}

/// Parses a `DESCRIBE` response body of content-type `application/sdp`.
pub fn parse(body: &str) -> Result<SessionDescription, String> {
    let mut session_control = None;
    let mut media = Vec::new();
    // Index into `media` of the `m=` line currently being filled in, or
    // `None` while still processing session-level (pre-`m=`) lines.
    let mut current: Option<usize> = None;

    for raw_line in body.split(['\n']) {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (kind, value) = split_once(line, '=').ok_or_else(|| {
            format!("SDP line missing '=': {:?}", line)
        })?;

        match kind {
            "m" => {
                // media-field = media SP port ["/" integer] SP proto 1*(SP fmt)
                let mut parts = value.split_whitespace();
                let media_type = parts
                    .next()
                    .ok_or_else(|| format!("empty m= line: {:?}", line))?;
                let _port = parts.next();
                let proto = parts
                    .next()
                    .ok_or_else(|| format!("m= line missing proto: {:?}", line))?;
                if !proto.contains("RTP") {
                    return Err(format!("unsupported m= proto {:?} (expected RTP-based)", proto));
                }
                let fmt = parts
                    .next()
                    .ok_or_else(|| format!("m= line missing payload type: {:?}", line))?;
                let rtp_payload_type: u8 = fmt
                    .parse()
                    .map_err(|_| format!("invalid RTP payload type {:?}", fmt))?;
                media.push(MediaDescription {
                    media: media_type.to_owned(),
                    rtp_payload_type,
                    encoding_name: None,
                    clock_rate: None,
                    control: None,
                });
                current = Some(media.len() - 1);
            }
            "a" => {
                let (key, val) = split_once(value, ':').unwrap_or((value, ""));
                match current {
                    None => {
                        if key == "control" {
                            session_control = Some(val.to_owned());
                        }
                    }
                    Some(idx) => {
                        let m = &mut media[idx];
                        match key {
                            "control" => m.control = Some(val.to_owned()),
                            "rtpmap" => {
                                // rtpmap-value = payload-type SP encoding-name "/" clock-rate ["/" params]
                                if let Some((pt_str, rest)) = split_once(val, ' ') {
                                    if pt_str.parse::<u8>() == Ok(m.rtp_payload_type) {
                                        let (name, rate_and_params) =
                                            split_once(rest, '/').unwrap_or((rest, ""));
                                        let rate_str = rate_and_params
                                            .split('/')
                                            .next()
                                            .unwrap_or(rate_and_params);
                                        m.encoding_name = Some(name.to_owned());
                                        m.clock_rate = rate_str.parse().ok();
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(SessionDescription {
        control: session_control,
        media,
    })
}

/// Resolves a media or session `a=control:` attribute against a base URL,
/// per [RFC 2326 Appendix C.1.1](https://datatracker.ietf.org/doc/html/rfc2326#appendix-C.1.1):
/// the base is `Content-Base` if present, else `Content-Location`, else the
/// request URL.
pub fn resolve_control(base_url: &Url, control: &str) -> Result<Url, String> {
    if control == "*" {
        return Ok(base_url.clone());
    }
    base_url
        .join(control)
        .map_err(|e| format!("unable to join base url {} with control {:?}: {}", base_url, control, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
v=0\r
o=- 0 0 IN IP4 127.0.0.1\r
s=No Name\r
c=IN IP4 127.0.0.1\r
t=0 0\r
a=control:*\r
m=video 0 RTP/AVP 96\r
a=rtpmap:96 H264/90000\r
a=fmtp:96 packetization-mode=1\r
a=control:trackID=0\r
m=audio 0 RTP/AVP 97\r
a=rtpmap:97 MPEG4-GENERIC/48000/2\r
a=control:trackID=1\r
";

    #[test]
    fn parses_two_tracks() {
        let sdp = parse(SAMPLE).unwrap();
        assert_eq!(sdp.control.as_deref(), Some("*"));
        assert_eq!(sdp.media.len(), 2);

        let video = &sdp.media[0];
        assert_eq!(video.media, "video");
        assert_eq!(video.rtp_payload_type, 96);
        assert_eq!(video.encoding_name.as_deref(), Some("H264"));
        assert_eq!(video.clock_rate, Some(90_000));
        assert_eq!(video.control.as_deref(), Some("trackID=0"));

        let audio = &sdp.media[1];
        assert_eq!(audio.media, "audio");
        assert_eq!(audio.rtp_payload_type, 97);
        assert_eq!(audio.encoding_name.as_deref(), Some("MPEG4-GENERIC"));
        assert_eq!(audio.clock_rate, Some(48_000));
        assert_eq!(audio.control.as_deref(), Some("trackID=1"));
    }

    #[test]
    fn control_resolves_relative_to_content_base() {
        let base = Url::parse("rtsp://cam/video.sdp/").unwrap();
        let resolved = resolve_control(&base, "trackID=0").unwrap();
        assert_eq!(resolved.as_str(), "rtsp://cam/video.sdp/trackID=0");
    }

    #[test]
    fn rejects_non_rtp_proto() {
        let bad = "m=video 0 UDP 96\r\n";
        assert!(parse(bad).is_err());
    }
}
