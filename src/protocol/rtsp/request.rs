use super::{Headers, Method, headers::names};

/// An RTSP request message
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// RTSP method
    pub method: Method,
    /// Request URI (e.g., "rtsp://192.168.1.10/stream" or "*")
    pub uri: String,
    /// Request headers
    pub headers: Headers,
    /// Request body (may be empty)
    pub body: Vec<u8>,
}

impl RtspRequest {
    /// Create a new request
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Create a builder for constructing requests
    pub fn builder(method: Method, uri: impl Into<String>) -> RtspRequestBuilder {
        RtspRequestBuilder::new(method, uri)
    }

    /// `CSeq` carried by this request
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.headers.cseq()
    }

    /// Encode request to bytes
    ///
    /// Lines end in CRLF; `Content-Length` is emitted whenever a body is present.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(256 + self.body.len());

        output.extend_from_slice(self.method.as_str().as_bytes());
        output.push(b' ');
        output.extend_from_slice(self.uri.as_bytes());
        output.extend_from_slice(b" RTSP/1.0\r\n");

        for (name, value) in self
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(names::CONTENT_LENGTH))
        {
            output.extend_from_slice(name.as_bytes());
            output.extend_from_slice(b": ");
            output.extend_from_slice(value.as_bytes());
            output.extend_from_slice(b"\r\n");
        }

        if !self.body.is_empty() {
            let len_header = format!("{}: {}\r\n", names::CONTENT_LENGTH, self.body.len());
            output.extend_from_slice(len_header.as_bytes());
        }

        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);

        output
    }
}

/// Builder for RTSP requests
#[derive(Debug)]
pub struct RtspRequestBuilder {
    request: RtspRequest,
}

impl RtspRequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            request: RtspRequest::new(method, uri),
        }
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    /// Set CSeq header
    #[must_use]
    pub fn cseq(self, seq: u32) -> Self {
        self.header(names::CSEQ, seq.to_string())
    }

    /// Set Content-Type header
    #[must_use]
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(names::CONTENT_TYPE, content_type)
    }

    /// Set User-Agent header
    #[must_use]
    pub fn user_agent(self, agent: &str) -> Self {
        self.header(names::USER_AGENT, agent)
    }

    /// Set session ID header
    #[must_use]
    pub fn session(self, session_id: &str) -> Self {
        self.header(names::SESSION, session_id)
    }

    /// Set body as raw bytes
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.request.body = body;
        self
    }

    /// Build the request
    #[must_use]
    pub fn build(self) -> RtspRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encode_simple() {
        let request = RtspRequest::builder(Method::Options, "*")
            .cseq(1)
            .user_agent("test/1.0")
            .build();

        let encoded = request.encode();
        let encoded_str = String::from_utf8_lossy(&encoded);

        assert!(encoded_str.starts_with("OPTIONS * RTSP/1.0\r\n"));
        assert!(encoded_str.contains("CSeq: 1\r\n"));
        assert!(encoded_str.contains("User-Agent: test/1.0\r\n"));
        assert!(!encoded_str.contains("Content-Length"));
        assert!(encoded_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_request_encode_with_body() {
        let body = b"v=0\r\n".to_vec();
        let request = RtspRequest::builder(Method::Announce, "rtsp://10.0.0.2/stream")
            .cseq(2)
            .content_type("application/sdp")
            .body(body.clone())
            .build();

        let encoded = request.encode();
        let encoded_str = String::from_utf8_lossy(&encoded);

        assert!(encoded_str.contains("Content-Type: application/sdp\r\n"));
        assert!(encoded_str.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(encoded_str.ends_with("\r\n\r\nv=0\r\n"));
    }

    #[test]
    fn test_explicit_content_length_not_duplicated() {
        let request = RtspRequest::builder(Method::Announce, "rtsp://10.0.0.2/stream")
            .header("Content-Length", "999")
            .body(b"abc".to_vec())
            .build();

        let encoded = String::from_utf8(request.encode()).unwrap();
        assert_eq!(encoded.matches("Content-Length").count(), 1);
        assert!(encoded.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn test_method_as_str() {
        assert_eq!(Method::Options.as_str(), "OPTIONS");
        assert_eq!(Method::Setup.as_str(), "SETUP");
        assert_eq!(Method::Teardown.to_string(), "TEARDOWN");
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("RECORD"), Some(Method::Record));
        assert_eq!(Method::parse("options"), Some(Method::Options));
        assert_eq!(Method::parse("INVALID"), None);
    }
}
