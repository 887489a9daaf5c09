//! Sans-IO RTSP client protocol for RAOP
//!
//! Requests are encoded with [`RtspRequest`], responses are parsed
//! incrementally by [`RtspCodec`]. No socket is touched here.

pub mod codec;
pub mod headers;
pub mod request;
pub mod response;
pub mod transport;

#[cfg(test)]
mod codec_tests;
#[cfg(test)]
mod headers_tests;
#[cfg(test)]
mod transport_tests;

pub use codec::{RtspCodec, RtspCodecError};
pub use headers::Headers;
pub use request::{RtspRequest, RtspRequestBuilder};
pub use response::{RtspResponse, StatusCode};
pub use transport::{ServerPorts, TransportHeader, TransportParseError};

/// RTSP methods used by a RAOP sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Capability probe, carries the challenge
    Options,
    /// Announce stream information (SDP)
    Announce,
    /// Negotiate transport ports and session
    Setup,
    /// Start streaming
    Record,
    /// Tear down session
    Teardown,
}

impl Method {
    /// Convert to RTSP method string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Record => "RECORD",
            Method::Teardown => "TEARDOWN",
        }
    }

    /// Parse from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPTIONS" => Some(Method::Options),
            "ANNOUNCE" => Some(Method::Announce),
            "SETUP" => Some(Method::Setup),
            "RECORD" => Some(Method::Record),
            "TEARDOWN" => Some(Method::Teardown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
