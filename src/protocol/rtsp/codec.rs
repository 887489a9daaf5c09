use super::{Headers, RtspResponse, StatusCode};
use thiserror::Error;

/// Errors during RTSP response parsing
#[derive(Debug, Error)]
pub enum RtspCodecError {
    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Status line and headers of a response whose body is still arriving
#[derive(Debug, Clone)]
struct ResponseHead {
    version: String,
    status: StatusCode,
    reason: String,
    headers: Headers,
    content_length: usize,
}

#[derive(Debug, Clone)]
enum ParseState {
    Head,
    Body(ResponseHead),
}

/// Sans-IO RTSP response decoder
///
/// Feed socket bytes with [`feed`](Self::feed) and pull complete responses
/// with [`decode`](Self::decode). Bytes beyond a complete response stay
/// buffered for the next call.
#[derive(Debug)]
pub struct RtspCodec {
    buffer: Vec<u8>,
    max_size: usize,
    state: ParseState,
}

impl RtspCodec {
    /// Create a new codec with a 64 KiB response limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_size: 64 * 1024,
            state: ParseState::Head,
        }
    }

    /// Set maximum buffered response size
    #[must_use]
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Feed bytes into the codec
    ///
    /// # Errors
    /// Returns `RtspCodecError::ResponseTooLarge` if the buffer would exceed the limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), RtspCodecError> {
        let size = self.buffer.len() + bytes.len();
        if size > self.max_size {
            return Err(RtspCodecError::ResponseTooLarge { size });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Try to decode one complete response
    ///
    /// Returns `Ok(None)` while more bytes are needed.
    ///
    /// # Errors
    /// Returns `RtspCodecError` if the status line or a header is malformed.
    pub fn decode(&mut self) -> Result<Option<RtspResponse>, RtspCodecError> {
        if let ParseState::Head = self.state {
            // keep-alive CRLFs between messages
            let skip = self
                .buffer
                .iter()
                .take_while(|b| **b == b'\r' || **b == b'\n')
                .count();
            self.buffer.drain(..skip);

            let Some(end) = find(&self.buffer, b"\r\n\r\n") else {
                return Ok(None);
            };
            let head_text = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
            self.buffer.drain(..end + 4);
            self.state = ParseState::Body(parse_head(&head_text)?);
        }

        let ParseState::Body(head) = &self.state else {
            return Ok(None);
        };
        if self.buffer.len() < head.content_length {
            return Ok(None);
        }

        let body: Vec<u8> = self.buffer.drain(..head.content_length).collect();
        let ParseState::Body(head) = std::mem::replace(&mut self.state, ParseState::Head) else {
            return Ok(None);
        };

        Ok(Some(RtspResponse {
            version: head.version,
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body,
        }))
    }

    /// Clear the codec buffer and reset state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ParseState::Head;
    }

    /// Get current buffer length
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for RtspCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_head(text: &str) -> Result<ResponseHead, RtspCodecError> {
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();

    // "RTSP/1.0 200 OK"
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("RTSP/") {
        return Err(RtspCodecError::InvalidStatusLine(status_line.to_string()));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| RtspCodecError::InvalidStatusLine(status_line.to_string()))?;
    let reason = parts.next().unwrap_or("").trim().to_string();

    let mut headers = Headers::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RtspCodecError::InvalidHeader(line.to_string()))?;
        headers.insert(name.trim(), value.trim());
    }
    let content_length = headers.content_length().unwrap_or(0);

    Ok(ResponseHead {
        version: version.to_string(),
        status: StatusCode(status),
        reason,
        headers,
        content_length,
    })
}
