//! RAOP (`AirPlay` 1) sender protocol

mod auth;
pub mod session;


pub use auth::{AirPlayAuth, KeyExchange, build_response_message};
pub use session::{ClientIdentity, RaopRtspSession};
