//! mDNS discovery of RAOP receivers

mod browser;
/// RAOP service record parsing
pub mod raop;


pub use browser::RaopBrowser;
pub use raop::{RAOP_SERVICE_TYPE, device_from_service, parse_raop_service_name};

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;

use crate::error::RaopError;
use crate::types::AirPlayDevice;

/// Discovery events
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A receiver was resolved
    Found(AirPlayDevice),
    /// A receiver went away; carries its name
    Lost(String),
}

/// Source of receiver records
///
/// Each call to [`browse`](Self::browse) starts a fresh search; dropping the
/// stream stops it.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// Start browsing
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryFailed` if the backend cannot start.
    async fn browse(&self) -> Result<BoxStream<'static, DiscoveryEvent>, RaopError>;

    /// Collect the receivers seen within `timeout`
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryFailed` if the backend cannot start.
    async fn scan(&self, timeout: Duration) -> Result<Vec<AirPlayDevice>, RaopError> {
        let mut events = self.browse().await?;
        let mut devices: Vec<AirPlayDevice> = Vec::new();

        let collect = async {
            while let Some(event) = events.next().await {
                match event {
                    DiscoveryEvent::Found(device) => {
                        devices.retain(|d| d != &device);
                        devices.push(device);
                    }
                    DiscoveryEvent::Lost(name) => devices.retain(|d| d.name != name),
                }
            }
        };
        let _ = tokio::time::timeout(timeout, collect).await;

        debug!("scan found {} receivers", devices.len());
        Ok(devices)
    }
}
