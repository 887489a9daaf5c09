//! RTSP Transport header handling
//!
//! The sender advertises its UDP ports in the SETUP request:
//! `RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;client_port=6000-6001;control_port=6001;timing_port=6002`
//!
//! The receiver answers with its own, e.g.
//! `RTP/AVP/UDP;unicast;mode=record;server_port=53561-53562;timing_port=53563`

use std::fmt;

/// Parsed Transport header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportHeader {
    /// Lower protocol (UDP or TCP)
    pub lower_transport: LowerTransport,
    /// Unicast or multicast
    pub cast: CastMode,
    /// Mode (usually "record" for RAOP)
    pub mode: Option<String>,
    /// Interleaved channel pair
    pub interleaved: Option<(u8, u8)>,
    /// `client_port=A[-B]`
    pub client_port: Option<PortRange>,
    /// `server_port=A[-B]`
    pub server_port: Option<PortRange>,
    /// `control_port=`
    pub control_port: Option<u16>,
    /// `timing_port=`
    pub timing_port: Option<u16>,
}

/// `A` or `A-B` port specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// First port
    pub start: u16,
    /// Second port when a range was given
    pub end: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LowerTransport {
    #[default]
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CastMode {
    #[default]
    Unicast,
    Multicast,
}

/// Server-side UDP ports negotiated by SETUP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPorts {
    /// Audio data port
    pub audio: u16,
    /// Control (sync/retransmit) port
    pub control: u16,
    /// Timing (NTP) port
    pub timing: u16,
}

impl TransportHeader {
    /// Parse a Transport header value
    ///
    /// Unknown parameters and surrounding whitespace are tolerated.
    ///
    /// # Errors
    /// Returns `TransportParseError` if the protocol is not `RTP/AVP` or a port is malformed.
    pub fn parse(value: &str) -> Result<Self, TransportParseError> {
        let mut parts = value.trim().split(';').map(str::trim);

        let proto_spec = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(TransportParseError::MissingProtocol)?;

        let mut transport = TransportHeader {
            lower_transport: parse_protocol(proto_spec)?,
            ..Self::default()
        };

        for part in parts {
            let (key, val) = part.split_once('=').unwrap_or((part, ""));
            match key.trim() {
                "unicast" => transport.cast = CastMode::Unicast,
                "multicast" => transport.cast = CastMode::Multicast,
                "mode" => transport.mode = Some(val.trim().trim_matches('"').to_string()),
                "interleaved" => transport.interleaved = Some(parse_interleaved(val)?),
                "client_port" => transport.client_port = Some(PortRange::parse(val)?),
                "server_port" => transport.server_port = Some(PortRange::parse(val)?),
                "control_port" => transport.control_port = Some(parse_port(val)?),
                "timing_port" => transport.timing_port = Some(parse_port(val)?),
                _ => {}
            }
        }

        Ok(transport)
    }

    /// Resolve the receiver's audio, control and timing ports
    ///
    /// Control falls back to the range end, then `control_port`, then
    /// audio + 1. Timing falls back to control + 1.
    ///
    /// # Errors
    /// Returns `TransportParseError::MissingServerPort` if no `server_port` was given.
    pub fn server_ports(&self) -> Result<ServerPorts, TransportParseError> {
        let range = self
            .server_port
            .ok_or(TransportParseError::MissingServerPort)?;
        let audio = range.start;
        let control = range
            .end
            .or(self.control_port)
            .unwrap_or_else(|| audio.wrapping_add(1));
        let timing = self.timing_port.unwrap_or_else(|| control.wrapping_add(1));

        Ok(ServerPorts {
            audio,
            control,
            timing,
        })
    }

    /// Build the header a sender puts in its SETUP request
    #[must_use]
    pub fn client_request(audio: u16, control: u16, timing: u16) -> Self {
        Self {
            lower_transport: LowerTransport::Udp,
            cast: CastMode::Unicast,
            mode: Some("record".to_string()),
            interleaved: Some((0, 1)),
            client_port: Some(PortRange {
                start: audio,
                end: Some(control),
            }),
            server_port: None,
            control_port: Some(control),
            timing_port: Some(timing),
        }
    }

    /// Build the header a receiver returns from SETUP
    #[must_use]
    pub fn server_response(audio: u16, control: u16, timing: u16) -> Self {
        Self {
            lower_transport: LowerTransport::Udp,
            cast: CastMode::Unicast,
            mode: Some("record".to_string()),
            interleaved: None,
            client_port: None,
            server_port: Some(PortRange {
                start: audio,
                end: Some(control),
            }),
            control_port: None,
            timing_port: Some(timing),
        }
    }
}

impl fmt::Display for TransportHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lower = match self.lower_transport {
            LowerTransport::Udp => "UDP",
            LowerTransport::Tcp => "TCP",
        };
        write!(f, "RTP/AVP/{lower};{}", self.cast)?;
        if let Some((a, b)) = self.interleaved {
            write!(f, ";interleaved={a}-{b}")?;
        }
        if let Some(mode) = &self.mode {
            write!(f, ";mode={mode}")?;
        }
        if let Some(range) = self.client_port {
            write!(f, ";client_port={range}")?;
        }
        if let Some(range) = self.server_port {
            write!(f, ";server_port={range}")?;
        }
        if let Some(port) = self.control_port {
            write!(f, ";control_port={port}")?;
        }
        if let Some(port) = self.timing_port {
            write!(f, ";timing_port={port}")?;
        }
        Ok(())
    }
}

impl PortRange {
    fn parse(value: &str) -> Result<Self, TransportParseError> {
        match value.split_once('-') {
            Some((start, end)) => Ok(Self {
                start: parse_port(start)?,
                end: Some(parse_port(end)?),
            }),
            None => Ok(Self {
                start: parse_port(value)?,
                end: None,
            }),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{end}", self.start),
            None => write!(f, "{}", self.start),
        }
    }
}

impl fmt::Display for CastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastMode::Unicast => write!(f, "unicast"),
            CastMode::Multicast => write!(f, "multicast"),
        }
    }
}

fn parse_protocol(spec: &str) -> Result<LowerTransport, TransportParseError> {
    let parts: Vec<&str> = spec.split('/').collect();
    match parts.as_slice() {
        ["RTP", "AVP"] | ["RTP", "AVP", "UDP"] => Ok(LowerTransport::Udp),
        ["RTP", "AVP", "TCP"] => Ok(LowerTransport::Tcp),
        _ => Err(TransportParseError::UnsupportedProtocol(spec.to_string())),
    }
}

fn parse_port(value: &str) -> Result<u16, TransportParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| TransportParseError::InvalidPort(value.trim().to_string()))
}

fn parse_interleaved(value: &str) -> Result<(u8, u8), TransportParseError> {
    let (start, end) = value
        .split_once('-')
        .ok_or(TransportParseError::InvalidInterleaved)?;
    let start = start
        .trim()
        .parse()
        .map_err(|_| TransportParseError::InvalidInterleaved)?;
    let end = end
        .trim()
        .parse()
        .map_err(|_| TransportParseError::InvalidInterleaved)?;
    Ok((start, end))
}

#[derive(Debug, thiserror::Error)]
pub enum TransportParseError {
    #[error("missing protocol specification")]
    MissingProtocol,

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("invalid interleaved channel specification")]
    InvalidInterleaved,

    #[error("no server_port parameter")]
    MissingServerPort,
}
