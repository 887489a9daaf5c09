use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::BoxStream;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::debug;

use super::raop::{RAOP_SERVICE_TYPE, device_from_service};
use super::{DeviceDiscovery, DiscoveryEvent};
use crate::error::RaopError;

/// mDNS browser for `_raop._tcp` receivers
#[derive(Debug, Clone, Default)]
pub struct RaopBrowser;

impl RaopBrowser {
    /// Create a new browser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceDiscovery for RaopBrowser {
    async fn browse(&self) -> Result<BoxStream<'static, DiscoveryEvent>, RaopError> {
        Ok(Box::pin(BrowserStream::new()?))
    }
}

/// Stream implementation for device discovery
struct BrowserStream {
    mdns: ServiceDaemon,
    stream: Pin<Box<dyn Stream<Item = ServiceEvent> + Send>>,
    names: HashMap<String, String>,
}

impl BrowserStream {
    fn new() -> Result<Self, RaopError> {
        let mdns = ServiceDaemon::new().map_err(|e| RaopError::DiscoveryFailed {
            message: format!("Failed to create mDNS daemon: {e}"),
            source: Some(Box::new(e)),
        })?;

        let receiver = mdns
            .browse(RAOP_SERVICE_TYPE)
            .map_err(|e| RaopError::DiscoveryFailed {
                message: format!("Failed to browse: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            mdns,
            stream: Box::pin(receiver.into_stream()),
            names: HashMap::new(),
        })
    }

    fn process_event(&mut self, event: ServiceEvent) -> Option<DiscoveryEvent> {
        match event {
            ServiceEvent::ServiceResolved(info) => self.handle_resolved(&info),
            ServiceEvent::ServiceRemoved(_, fullname) => self
                .names
                .remove(&fullname)
                .map(DiscoveryEvent::Lost),
            _ => None,
        }
    }

    fn handle_resolved(&mut self, info: &ServiceInfo) -> Option<DiscoveryEvent> {
        let fullname = info.get_fullname().to_string();
        let instance = fullname
            .strip_suffix(RAOP_SERVICE_TYPE)
            .map_or(fullname.as_str(), |s| s.trim_end_matches('.'));

        let txt: HashMap<String, String> = info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect();

        let addresses = info.get_addresses();
        let address = addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addresses.iter().next())
            .copied();

        let device = device_from_service(instance, address, info.get_port(), &txt)?;
        debug!(
            "resolved {} model={}",
            device,
            txt.get("am").map_or("unknown", String::as_str)
        );
        self.names.insert(fullname, device.name.clone());
        Some(DiscoveryEvent::Found(device))
    }
}

impl Stream for BrowserStream {
    type Item = DiscoveryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let event = match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) => event,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            };

            if let Some(discovery_event) = self.process_event(event) {
                return Poll::Ready(Some(discovery_event));
            }
        }
    }
}

impl Drop for BrowserStream {
    fn drop(&mut self) {
        let _ = self.mdns.stop_browse(RAOP_SERVICE_TYPE);
        let _ = self.mdns.shutdown();
    }
}
