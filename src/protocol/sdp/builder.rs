use base64::Engine as _;

use super::{ALAC_FMTP, MediaDescription, SdpOrigin, SessionDescription};
use crate::protocol::crypto::b64;

/// Builder for SDP session descriptions
pub struct SdpBuilder {
    sdp: SessionDescription,
    current_media: Option<MediaDescription>,
}

impl Default for SdpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SdpBuilder {
    /// Create a new SDP builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            sdp: SessionDescription::default(),
            current_media: None,
        }
    }

    /// Set origin
    #[must_use]
    pub fn origin(
        mut self,
        username: &str,
        session_id: &str,
        session_version: &str,
        addr: &str,
    ) -> Self {
        self.sdp.origin = Some(SdpOrigin {
            username: username.to_string(),
            session_id: session_id.to_string(),
            session_version: session_version.to_string(),
            unicast_address: addr.to_string(),
        });
        self
    }

    /// Set session name
    #[must_use]
    pub fn session_name(mut self, name: &str) -> Self {
        self.sdp.session_name = name.to_string();
        self
    }

    /// Set connection address
    #[must_use]
    pub fn connection(mut self, addr: &str) -> Self {
        self.sdp.connection = Some(addr.to_string());
        self
    }

    /// Set timing (0 0 for live streams)
    #[must_use]
    pub fn timing(mut self, start: u64, stop: u64) -> Self {
        self.sdp.timing = Some((start, stop));
        self
    }

    /// Start a media section
    #[must_use]
    pub fn media(mut self, media_type: &str, port: u16, protocol: &str, formats: &[&str]) -> Self {
        if let Some(media) = self.current_media.take() {
            self.sdp.media.push(media);
        }

        self.current_media = Some(MediaDescription {
            media_type: media_type.to_string(),
            port,
            protocol: protocol.to_string(),
            formats: formats.iter().map(ToString::to_string).collect(),
            attributes: Vec::new(),
        });

        self
    }

    /// Append an attribute to the open media section, or the session
    #[must_use]
    pub fn attribute(mut self, name: &str, value: Option<&str>) -> Self {
        let entry = (name.to_string(), value.map(String::from));
        match self.current_media.as_mut() {
            Some(media) => media.attributes.push(entry),
            None => self.sdp.attributes.push(entry),
        }
        self
    }

    /// Build the SDP
    #[must_use]
    pub fn build(mut self) -> SessionDescription {
        if let Some(media) = self.current_media.take() {
            self.sdp.media.push(media);
        }
        self.sdp
    }
}

/// Inputs for the ANNOUNCE body
#[derive(Debug, Clone)]
pub struct AnnounceParams<'a> {
    /// Random numeric session id for the origin line
    pub session_id: u32,
    /// Local address of the control connection
    pub client_ip: &'a str,
    /// Receiver address
    pub server_ip: &'a str,
    /// RSA-OAEP wrapped AES key
    pub wrapped_key: Option<&'a [u8]>,
    /// AES IV
    pub iv: Option<&'a [u8]>,
}

impl AnnounceParams<'_> {
    /// Build the ALAC stream description
    ///
    /// Key lines are emitted only when both key and IV are present.
    #[must_use]
    pub fn to_sdp(&self) -> SessionDescription {
        let mut builder = SdpBuilder::new()
            .origin("iTunes", &self.session_id.to_string(), "0", self.client_ip)
            .session_name("iTunes")
            .connection(self.server_ip)
            .timing(0, 0)
            .media("audio", 0, "RTP/AVP", &["96"])
            .attribute("rtpmap", Some("96 AppleLossless"))
            .attribute("fmtp", Some(&format!("96 {ALAC_FMTP}")));

        if let (Some(key), Some(iv)) = (self.wrapped_key, self.iv) {
            builder = builder
                .attribute("rsaaeskey", Some(&b64::RAOP.encode(key)))
                .attribute("aesiv", Some(&b64::RAOP.encode(iv)));
        }

        builder.build()
    }
}
