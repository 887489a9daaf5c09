//! SDP (Session Description Protocol) for RAOP
//!
//! The ANNOUNCE request carries an SDP body describing the ALAC stream and,
//! when encryption is negotiated, the wrapped AES key and IV.

use std::fmt::Write as _;

mod builder;
mod parser;


pub use builder::{AnnounceParams, SdpBuilder};
pub use parser::{SdpParseError, SdpParser};

/// ALAC format parameters advertised to the receiver
///
/// frames per packet, compatible version, bit depth, history mult,
/// initial history, rice limit, channels, max run, max frame bytes,
/// average bitrate, sample rate
pub const ALAC_FMTP: &str = "352 0 16 40 10 14 2 255 0 0 44100";

/// Ordered `a=` attribute list
pub type Attributes = Vec<(String, Option<String>)>;

/// SDP session description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    /// Protocol version (v=)
    pub version: u8,
    /// Origin (o=)
    pub origin: Option<SdpOrigin>,
    /// Session name (s=)
    pub session_name: String,
    /// Connection address (c=)
    pub connection: Option<String>,
    /// Timing (t=)
    pub timing: Option<(u64, u64)>,
    /// Media descriptions (m=)
    pub media: Vec<MediaDescription>,
    /// Session-level attributes (a=)
    pub attributes: Attributes,
}

/// SDP origin field (o=)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpOrigin {
    /// Username
    pub username: String,
    /// Session ID
    pub session_id: String,
    /// Session version
    pub session_version: String,
    /// Unicast address
    pub unicast_address: String,
}

/// SDP media description (m=)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    /// Media type (audio)
    pub media_type: String,
    /// Port number
    pub port: u16,
    /// Protocol (RTP/AVP)
    pub protocol: String,
    /// Format list (payload types)
    pub formats: Vec<String>,
    /// Media-level attributes in wire order
    pub attributes: Attributes,
}

impl SessionDescription {
    /// First attribute with `name`, media level first
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.media
            .iter()
            .flat_map(|m| m.attributes.iter())
            .chain(self.attributes.iter())
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// `a=rsaaeskey` value
    #[must_use]
    pub fn rsaaeskey(&self) -> Option<&str> {
        self.attribute("rsaaeskey")
    }

    /// `a=aesiv` value
    #[must_use]
    pub fn aesiv(&self) -> Option<&str> {
        self.attribute("aesiv")
    }

    /// Encode with CRLF line endings
    #[must_use]
    pub fn encode(&self) -> String {
        fn ip_kind(addr: &str) -> &'static str {
            if addr.contains(':') { "IP6" } else { "IP4" }
        }

        let mut out = format!("v={}\r\n", self.version);
        if let Some(o) = &self.origin {
            let _ = write!(
                out,
                "o={} {} {} IN {} {}\r\n",
                o.username,
                o.session_id,
                o.session_version,
                ip_kind(&o.unicast_address),
                o.unicast_address
            );
        }
        let _ = write!(out, "s={}\r\n", self.session_name);
        if let Some(addr) = &self.connection {
            let _ = write!(out, "c=IN {} {addr}\r\n", ip_kind(addr));
        }
        if let Some((start, stop)) = self.timing {
            let _ = write!(out, "t={start} {stop}\r\n");
        }
        push_attributes(&mut out, &self.attributes);
        for m in &self.media {
            let _ = write!(
                out,
                "m={} {} {} {}\r\n",
                m.media_type,
                m.port,
                m.protocol,
                m.formats.join(" ")
            );
            push_attributes(&mut out, &m.attributes);
        }
        out
    }
}

fn push_attributes(out: &mut String, attributes: &Attributes) {
    for (name, value) in attributes {
        match value {
            Some(value) => {
                let _ = write!(out, "a={name}:{value}\r\n");
            }
            None => {
                let _ = write!(out, "a={name}\r\n");
            }
        }
    }
}
