//! RAOP (`AirPlay` 1) service record parsing

use std::collections::HashMap;
use std::net::IpAddr;

use base64::Engine;

use crate::protocol::crypto::b64;
use crate::types::AirPlayDevice;

/// RAOP service type for mDNS discovery
pub const RAOP_SERVICE_TYPE: &str = "_raop._tcp.local.";

/// Parse RAOP service instance name
///
/// RAOP service names follow the format: `{MAC_ADDRESS}@{DEVICE_NAME}`
/// Example: "0050C212A23F@Living Room"
#[must_use]
pub fn parse_raop_service_name(name: &str) -> Option<(String, String)> {
    let (mac, device_name) = name.split_once('@')?;
    let mac = mac.to_uppercase();
    if mac.len() == 12 && mac.chars().all(|c| c.is_ascii_hexdigit()) && !device_name.is_empty() {
        Some((mac, device_name.to_string()))
    } else {
        None
    }
}

/// Build a device record from a resolved service
///
/// `instance` is the service instance name without the service type.
/// Returns `None` when no address was resolved.
#[must_use]
pub fn device_from_service(
    instance: &str,
    address: Option<IpAddr>,
    port: u16,
    txt: &HashMap<String, String>,
) -> Option<AirPlayDevice> {
    let address = address?;
    let (device_id, name) =
        parse_raop_service_name(instance).unwrap_or_else(|| (String::new(), instance.to_string()));

    let mut device = AirPlayDevice::new(name, address.to_string())
        .with_port(port)
        .with_device_id(device_id);
    device.requires_password = txt.get("pw").is_some_and(|v| is_true(v));
    if let Some(pk) = txt.get("pk") {
        device = device.with_server_public_key(decode_public_key(pk));
    }
    Some(device)
}

fn is_true(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// `pk` arrives hex encoded, base64 encoded or raw
fn decode_public_key(value: &str) -> Vec<u8> {
    let value = value.trim();
    if let Some(bytes) = decode_hex(value) {
        return bytes;
    }
    if let Some(bytes) = b64::RAOP.decode(value).ok().filter(|b| !b.is_empty()) {
        return bytes;
    }
    value.as_bytes().to_vec()
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.is_empty() || value.len() % 2 != 0 {
        return None;
    }
    value
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect()
}
