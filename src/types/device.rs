use std::fmt;

/// Port RAOP receivers listen on when discovery does not say otherwise
pub const DEFAULT_RAOP_PORT: u16 = 7000;

/// A RAOP receiver the sender can connect to
///
/// Two records describe the same receiver when name and host match.
#[derive(Clone, Default)]
pub struct AirPlayDevice {
    /// Human-readable device name (e.g., "Living Room")
    pub name: String,

    /// Host name or IP address
    pub host_address: String,

    /// RTSP control port
    pub port: u16,

    /// Hardware identifier from the service name, if known
    pub device_id: String,

    /// Password, if the receiver needs one
    pub password: Option<String>,

    /// Receiver advertises a password requirement
    pub requires_password: bool,

    /// RSA public key from the `pk` TXT record
    pub server_public_key: Option<Vec<u8>>,
}

impl AirPlayDevice {
    /// Create a record on the default port
    #[must_use]
    pub fn new(name: impl Into<String>, host_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_address: host_address.into(),
            port: DEFAULT_RAOP_PORT,
            ..Self::default()
        }
    }

    /// Set the control port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the device identifier
    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Set a password; a non-empty one also marks the device as requiring it
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.requires_password = !password.is_empty();
        self.password = Some(password).filter(|p| !p.is_empty());
        self
    }

    /// Set the receiver's RSA public key bytes
    #[must_use]
    pub fn with_server_public_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.server_public_key = Some(key.into()).filter(|k: &Vec<u8>| !k.is_empty());
        self
    }

    /// Name and host are both present
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.host_address.trim().is_empty()
    }

    /// `host:port` for the control connection
    #[must_use]
    pub fn socket_address(&self) -> String {
        if self.host_address.contains(':') && !self.host_address.starts_with('[') {
            format!("[{}]:{}", self.host_address, self.port)
        } else {
            format!("{}:{}", self.host_address, self.port)
        }
    }
}

impl PartialEq for AirPlayDevice {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.host_address == other.host_address
    }
}

impl Eq for AirPlayDevice {}

impl fmt::Debug for AirPlayDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirPlayDevice")
            .field("name", &self.name)
            .field("host_address", &self.host_address)
            .field("port", &self.port)
            .field("device_id", &self.device_id)
            .field("requires_password", &self.requires_password)
            .field("has_public_key", &self.server_public_key.is_some())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AirPlayDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.socket_address())
    }
}
