//! Host-facing streaming manager

mod manager;


pub use manager::{AirPlayManager, ConnectionStatus};
