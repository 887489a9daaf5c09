/// Well-known RTSP header names
pub mod names {
    pub const CSEQ: &str = "CSeq";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const SESSION: &str = "Session";
    pub const TRANSPORT: &str = "Transport";
    pub const USER_AGENT: &str = "User-Agent";
    pub const DACP_ID: &str = "DACP-ID";
    pub const CLIENT_INSTANCE: &str = "Client-Instance";
    pub const RANGE: &str = "Range";
    pub const RTP_INFO: &str = "RTP-Info";
}

/// RAOP-specific header names
pub mod raop {
    /// Apple challenge for authentication
    pub const APPLE_CHALLENGE: &str = "Apple-Challenge";
    /// Apple response to challenge
    pub const APPLE_RESPONSE: &str = "Apple-Response";
    /// Sender device identifier
    pub const APPLE_DEVICE_ID: &str = "Apple-Device-ID";
    /// Audio latency in samples
    pub const AUDIO_LATENCY: &str = "Audio-Latency";
    /// Audio jack status
    pub const AUDIO_JACK_STATUS: &str = "Audio-Jack-Status";
}

/// RTSP header collection
///
/// Keys are unique under ASCII case folding. Insertion order is kept so
/// encoded requests are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Create empty headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header (case-insensitive key storage)
    ///
    /// An existing header with the same name keeps its position and takes the
    /// new value and casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .inner
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(slot) => *slot = (name, value),
            None => self.inner.push((name, value)),
        }
    }

    /// Get header value (case-insensitive)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Remove a header, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .inner
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.inner.remove(idx).1)
    }

    /// Check if header exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get `CSeq` value
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.get(names::CSEQ)?.trim().parse().ok()
    }

    /// Get Content-Length value
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.trim().parse().ok()
    }

    /// Get Content-Type value
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE)
    }

    /// Get Session ID, without any `;timeout=` parameters
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.get(names::SESSION)
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|s| !s.is_empty())
    }

    /// Iterate over all headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}
