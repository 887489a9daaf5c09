//! In-process RAOP receiver for tests

pub mod mock_raop_server;


pub use mock_raop_server::{MockRaopConfig, MockRaopServer, MockRaopState, MockServerError};

use crate::types::AirPlayDevice;

/// Device record pointing at a running mock receiver
///
/// Carries the mock's public key so the sender encrypts audio.
#[must_use]
pub fn mock_device(server: &MockRaopServer) -> AirPlayDevice {
    let mut device = AirPlayDevice::new(server.config.name.clone(), "127.0.0.1")
        .with_port(server.config.rtsp_port)
        .with_device_id(server.device_id());
    device.server_public_key = server.public_key_der().ok();
    device
}
