//! Core types module

mod config;
mod device;


pub use config::{AirPlayConfig, AirPlayConfigBuilder, KeyFallback};
pub use device::{AirPlayDevice, DEFAULT_RAOP_PORT};
