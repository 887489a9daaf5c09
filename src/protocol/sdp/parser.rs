use thiserror::Error;

use super::{MediaDescription, SdpOrigin, SessionDescription};

#[derive(Debug, Error)]
pub enum SdpParseError {
    #[error("invalid version line")]
    InvalidVersion,
    #[error("invalid origin line: {0}")]
    InvalidOrigin(String),
    #[error("invalid connection line: {0}")]
    InvalidConnection(String),
    #[error("invalid media line: {0}")]
    InvalidMedia(String),
}

/// SDP parser
pub struct SdpParser;

impl SdpParser {
    /// Parse SDP from string
    ///
    /// Lines that are not `x=value` are skipped.
    ///
    /// # Errors
    ///
    /// Returns `SdpParseError` if a known line is malformed.
    pub fn parse(input: &str) -> Result<SessionDescription, SdpParseError> {
        let mut sdp = SessionDescription::default();

        for line in input.lines().map(str::trim) {
            let Some((kind, value)) = line.split_once('=') else {
                continue;
            };

            match kind {
                "v" => sdp.version = value.parse().map_err(|_| SdpParseError::InvalidVersion)?,
                "o" => sdp.origin = Some(parse_origin(value)?),
                "s" => sdp.session_name = value.to_string(),
                "c" => sdp.connection = Some(parse_connection(value)?),
                "t" => {
                    let mut parts = value.split_whitespace().map(str::parse::<u64>);
                    if let (Some(Ok(start)), Some(Ok(stop))) = (parts.next(), parts.next()) {
                        sdp.timing = Some((start, stop));
                    }
                }
                "m" => sdp.media.push(parse_media(value)?),
                "a" => {
                    let entry = match value.split_once(':') {
                        Some((name, val)) => (name.to_string(), Some(val.to_string())),
                        None => (value.to_string(), None),
                    };
                    match sdp.media.last_mut() {
                        Some(media) => media.attributes.push(entry),
                        None => sdp.attributes.push(entry),
                    }
                }
                _ => {}
            }
        }

        Ok(sdp)
    }
}

fn parse_origin(value: &str) -> Result<SdpOrigin, SdpParseError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    let &[username, session_id, version, _, _, address] = parts.as_slice() else {
        return Err(SdpParseError::InvalidOrigin(value.to_string()));
    };
    Ok(SdpOrigin {
        username: username.to_string(),
        session_id: session_id.to_string(),
        session_version: version.to_string(),
        unicast_address: address.to_string(),
    })
}

fn parse_connection(value: &str) -> Result<String, SdpParseError> {
    match value.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["IN", _, address] => Ok((*address).to_string()),
        _ => Err(SdpParseError::InvalidConnection(value.to_string())),
    }
}

fn parse_media(value: &str) -> Result<MediaDescription, SdpParseError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(SdpParseError::InvalidMedia(value.to_string()));
    }
    let port = parts[1]
        .parse()
        .map_err(|_| SdpParseError::InvalidMedia(value.to_string()))?;
    Ok(MediaDescription {
        media_type: parts[0].to_string(),
        port,
        protocol: parts[2].to_string(),
        formats: parts[3..].iter().map(ToString::to_string).collect(),
        attributes: Vec::new(),
    })
}
