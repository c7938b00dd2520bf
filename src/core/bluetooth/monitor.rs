//! Adapter state monitor
//! Follows the radio's power state and is the only owner of the scan on/off switch.

use log::{error, info};
use uuid::Uuid;

use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::AdapterState;
use crate::error::TransportError;

pub struct AdapterMonitor {
    scanning: bool,
    /// Cleared once a target is chosen; a later PoweredOn must not rescan.
    armed: bool,
    service_filter: Vec<Uuid>,
    allow_duplicates: bool,
}

impl AdapterMonitor {
    pub fn new(service_filter: Vec<Uuid>, allow_duplicates: bool) -> Self {
        Self {
            scanning: false,
            armed: true,
            service_filter,
            allow_duplicates,
        }
    }

    /// Handles an adapter state change: scan when powered on, stop otherwise.
    pub async fn on_state<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        state: AdapterState,
    ) -> Result<(), TransportError> {
        info!("State: {}", state);

        if state.permits_scanning() {
            if self.armed && !self.scanning {
                info!("Scanning");
                transport
                    .scan(&self.service_filter, self.allow_duplicates)
                    .await?;
                self.scanning = true;
            }
            Ok(())
        } else {
            self.stop(transport).await
        }
    }

    /// Stops scanning for good; used once a peripheral has been picked.
    pub async fn halt<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<(), TransportError> {
        self.armed = false;
        self.stop(transport).await
    }

    async fn stop<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<(), TransportError> {
        // Always forwarded: the transport treats a stop without a scan as a no-op.
        self.scanning = false;
        if let Err(e) = transport.stop_scan().await {
            error!("Failed to stop scanning: {}", e);
            return Err(e);
        }
        Ok(())
    }
}
