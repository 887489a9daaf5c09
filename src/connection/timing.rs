use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::protocol::rtp::{NtpTimestamp, PayloadType, TimingPacket};

/// Answer timing requests on `socket` until the task is aborted
pub(crate) fn spawn_responder(socket: UdpSocket) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 128];
        loop {
            let (n, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    debug!("timing socket closed: {}", e);
                    return;
                }
            };
            let received_at = NtpTimestamp::now();

            let request = match TimingPacket::decode(&buf[..n]) {
                Ok(packet) if packet.payload_type == PayloadType::TimingRequest => packet,
                Ok(_) => continue,
                Err(e) => {
                    trace!("ignoring datagram on timing port: {}", e);
                    continue;
                }
            };

            let response = request.response_to(received_at).encode();
            if let Err(e) = socket.send_to(&response, from).await {
                debug!("timing response to {} failed: {}", from, e);
            }
        }
    })
}
