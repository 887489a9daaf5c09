use std::net::SocketAddr;
use std::time::Duration;

use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::RaopError;
use crate::net::Runtime;
use crate::protocol::rtsp::{RtspCodec, RtspRequest, RtspResponse};

/// RTSP control connection to one receiver
///
/// Requests are written whole and each response is awaited with the
/// configured timeout before the next request is sent.
#[derive(Debug)]
pub struct RtspChannel {
    stream: TcpStream,
    codec: RtspCodec,
    peer: SocketAddr,
    local: SocketAddr,
    response_timeout: Duration,
}

impl RtspChannel {
    /// Open the TCP connection
    ///
    /// # Errors
    ///
    /// `ConnectionTimeout` if the connect does not finish within
    /// `connect_timeout`, `ConnectionFailed` if it is refused.
    pub async fn connect(
        peer: SocketAddr,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<Self, RaopError> {
        let stream = Runtime::timeout(connect_timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| RaopError::ConnectionTimeout {
                duration: connect_timeout,
            })?
            .map_err(|e| RaopError::ConnectionFailed {
                device_name: peer.to_string(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;
        stream.set_nodelay(true)?;
        let local = stream.local_addr()?;
        debug!("control connection {} -> {}", local, peer);

        Ok(Self {
            stream,
            codec: RtspCodec::new(),
            peer,
            local,
            response_timeout,
        })
    }

    /// Local address of the control connection
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Write a request and wait for its response
    ///
    /// # Errors
    ///
    /// `Timeout` when no complete response arrives in time, `Disconnected`
    /// when the receiver closes the connection, `Codec` on malformed input.
    pub async fn send(&mut self, request: &RtspRequest) -> Result<RtspResponse, RaopError> {
        let encoded = request.encode();
        if let Ok(text) = std::str::from_utf8(&encoded) {
            trace!(">> {}", text.trim_end());
        }
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;

        let response = Runtime::timeout(self.response_timeout, self.read_response())
            .await
            .map_err(|_| RaopError::Timeout)??;
        trace!("<< {} {}", response.status.as_u16(), response.reason);
        Ok(response)
    }

    async fn read_response(&mut self) -> Result<RtspResponse, RaopError> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(response) = self.codec.decode()? {
                return Ok(response);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(RaopError::Disconnected {
                    device_name: self.peer.to_string(),
                });
            }
            self.codec.feed(&buf[..n])?;
        }
    }

    /// Check whether the receiver has closed the connection
    ///
    /// Never blocks: pending reads count as open.
    pub fn is_closed(&self) -> bool {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe).now_or_never() {
            Some(Ok(0)) => true,
            None | Some(Ok(_)) => false,
            Some(Err(e)) => e.kind() != std::io::ErrorKind::WouldBlock,
        }
    }

    /// Shut down the write half
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
