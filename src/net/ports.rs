use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, trace};

use crate::error::RaopError;

/// Audio, control and timing sockets bound on consecutive ports
#[derive(Debug)]
pub struct PortBlock {
    /// RTP audio socket
    pub audio: UdpSocket,
    /// Control (sync/retransmit) socket
    pub control: UdpSocket,
    /// NTP timing socket
    pub timing: UdpSocket,
}

impl PortBlock {
    /// Local ports as `(audio, control, timing)`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a socket has no local address.
    pub fn ports(&self) -> io::Result<(u16, u16, u16)> {
        Ok((
            self.audio.local_addr()?.port(),
            self.control.local_addr()?.port(),
            self.timing.local_addr()?.port(),
        ))
    }
}

/// Resolve `host:port` to its first socket address
///
/// # Errors
///
/// `ConnectionFailed` when the name does not resolve.
pub async fn resolve_host(host: &str, port: u16) -> Result<SocketAddr, RaopError> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| RaopError::ConnectionFailed {
            device_name: host.to_string(),
            message: format!("cannot resolve host: {e}"),
            source: Some(Box::new(e)),
        })?;
    addrs.next().ok_or_else(|| RaopError::ConnectionFailed {
        device_name: host.to_string(),
        message: "host resolved to no addresses".to_string(),
        source: None,
    })
}

/// Bind three UDP sockets in the address family of `peer`
///
/// With `base == 0` the OS picks each port. Otherwise blocks starting at
/// `base`, `base + 3`, ... are tried until one binds completely or `limit`
/// blocks have been probed.
///
/// # Errors
///
/// `NoPortAvailable` when every probed block has a port in use.
pub async fn bind_port_block(peer: IpAddr, base: u16, limit: u16) -> Result<PortBlock, RaopError> {
    let any = match peer {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };

    if base == 0 {
        let block = PortBlock {
            audio: UdpSocket::bind((any, 0)).await?,
            control: UdpSocket::bind((any, 0)).await?,
            timing: UdpSocket::bind((any, 0)).await?,
        };
        debug!("bound ephemeral UDP ports {:?}", block.ports()?);
        return Ok(block);
    }

    for attempt in 0..limit {
        let Some(start) = attempt
            .checked_mul(3)
            .and_then(|offset| base.checked_add(offset))
            .filter(|start| start.checked_add(2).is_some())
        else {
            break;
        };

        match try_block(any, start).await {
            Ok(block) => {
                debug!("bound UDP ports {}-{}", start, start + 2);
                return Ok(block);
            }
            Err(e) => trace!("UDP block at {} unavailable: {}", start, e),
        }
    }

    Err(RaopError::NoPortAvailable {
        base,
        attempts: limit,
    })
}

async fn try_block(any: IpAddr, start: u16) -> io::Result<PortBlock> {
    let audio = UdpSocket::bind((any, start)).await?;
    let control = UdpSocket::bind((any, start + 1)).await?;
    let timing = UdpSocket::bind((any, start + 2)).await?;
    Ok(PortBlock {
        audio,
        control,
        timing,
    })
}
