//! RAOP RTSP request sequencing
//!
//! Builds the OPTIONS / ANNOUNCE / SETUP / RECORD / TEARDOWN requests for one
//! connection and interprets their responses. Socket I/O lives in
//! [`crate::connection`].

use rand::Rng;

use crate::error::RaopError;
use crate::protocol::rtsp::{
    Method, RtspRequest, RtspRequestBuilder, RtspResponse, ServerPorts, StatusCode,
    TransportHeader, TransportParseError, headers::names, headers::raop,
};
use crate::protocol::sdp::SessionDescription;

/// Identity headers sent on every request
///
/// Generated once per sender and reused across reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// `Client-Instance` (64-bit hex)
    pub client_instance: String,
    /// `DACP-ID` (64-bit hex)
    pub dacp_id: String,
    /// `Apple-Device-ID` (48-bit hex)
    pub device_id: String,
    /// `User-Agent`
    pub user_agent: String,
}

impl ClientIdentity {
    /// Random identity
    #[must_use]
    pub fn generate(user_agent: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            client_instance: format!("{:016X}", rng.r#gen::<u64>()),
            dacp_id: format!("{:016X}", rng.r#gen::<u64>()),
            device_id: format!("0x{:012X}", rng.r#gen::<u64>() & 0xFFFF_FFFF_FFFF),
            user_agent: user_agent.into(),
        }
    }
}

/// Per-connection RTSP state
///
/// `CSeq` starts at 1 for each new connection.
#[derive(Debug)]
pub struct RaopRtspSession {
    identity: ClientIdentity,
    host: String,
    cseq: u32,
    session_id: Option<String>,
    server_ports: Option<ServerPorts>,
}

impl RaopRtspSession {
    /// Create session state for a receiver host
    #[must_use]
    pub fn new(identity: ClientIdentity, host: &str) -> Self {
        Self {
            identity,
            host: host.to_string(),
            cseq: 0,
            session_id: None,
            server_ports: None,
        }
    }

    /// Last `CSeq` used
    #[must_use]
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    /// Session id from SETUP
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Receiver ports from SETUP
    #[must_use]
    pub fn server_ports(&self) -> Option<ServerPorts> {
        self.server_ports
    }

    /// Stream URI
    #[must_use]
    pub fn uri(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("rtsp://[{}]/stream", self.host)
        } else {
            format!("rtsp://{}/stream", self.host)
        }
    }

    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    fn request(&mut self, method: Method, uri: String) -> RtspRequestBuilder {
        let cseq = self.next_cseq();
        let mut builder = RtspRequest::builder(method, uri)
            .cseq(cseq)
            .user_agent(&self.identity.user_agent)
            .header(names::CLIENT_INSTANCE, &self.identity.client_instance)
            .header(names::DACP_ID, &self.identity.dacp_id)
            .header(raop::APPLE_DEVICE_ID, &self.identity.device_id);

        if let Some(session) = &self.session_id {
            builder = builder.session(session);
        }
        builder
    }

    /// `OPTIONS *`, with `Apple-Challenge` when authenticating
    pub fn options_request(&mut self, challenge: Option<&str>) -> RtspRequest {
        let mut builder = self.request(Method::Options, "*".to_string());
        if let Some(challenge) = challenge {
            builder = builder.header(raop::APPLE_CHALLENGE, challenge);
        }
        builder.build()
    }

    /// `ANNOUNCE` carrying the stream description
    pub fn announce_request(&mut self, sdp: &SessionDescription) -> RtspRequest {
        let uri = self.uri();
        self.request(Method::Announce, uri)
            .content_type("application/sdp")
            .body(sdp.encode().into_bytes())
            .build()
    }

    /// `SETUP` advertising the sender's UDP ports
    pub fn setup_request(&mut self, audio: u16, control: u16, timing: u16) -> RtspRequest {
        let uri = self.uri();
        let transport = TransportHeader::client_request(audio, control, timing);
        self.request(Method::Setup, uri)
            .header(names::TRANSPORT, transport.to_string())
            .build()
    }

    /// `RECORD` from the start of the stream
    pub fn record_request(&mut self) -> RtspRequest {
        let uri = self.uri();
        self.request(Method::Record, uri)
            .header(names::RANGE, "npt=0-")
            .header(names::RTP_INFO, "seq=0;rtptime=0")
            .build()
    }

    /// `TEARDOWN`
    pub fn teardown_request(&mut self) -> RtspRequest {
        let uri = self.uri();
        self.request(Method::Teardown, uri).build()
    }

    /// Fail on a non-2xx status
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` for 401, `RtspError` for any other failure.
    pub fn check_status(method: Method, response: &RtspResponse) -> Result<(), RaopError> {
        if response.is_success() {
            return Ok(());
        }
        if response.status == StatusCode::UNAUTHORIZED {
            return Err(RaopError::AuthenticationFailed {
                message: "receiver requires a password".to_string(),
            });
        }
        Err(RaopError::RtspError {
            method: method.as_str(),
            status_code: response.status.as_u16(),
            reason: response.reason.clone(),
        })
    }

    /// Record ports and session id from a SETUP response
    ///
    /// # Errors
    ///
    /// `MissingTransportInfo` without a usable `Transport`, `MissingSession`
    /// without `Session`, `Transport` if the header is malformed.
    pub fn process_setup(&mut self, response: &RtspResponse) -> Result<ServerPorts, RaopError> {
        Self::check_status(Method::Setup, response)?;

        let transport = response
            .header(names::TRANSPORT)
            .ok_or(RaopError::MissingTransportInfo)?;
        let ports = match TransportHeader::parse(transport)?.server_ports() {
            Ok(ports) => ports,
            Err(TransportParseError::MissingServerPort) => {
                return Err(RaopError::MissingTransportInfo);
            }
            Err(e) => return Err(e.into()),
        };
        if ports.audio == 0 {
            return Err(RaopError::MissingTransportInfo);
        }

        let session = response.session().ok_or(RaopError::MissingSession)?;

        self.session_id = Some(session.to_string());
        self.server_ports = Some(ports);
        Ok(ports)
    }
}
