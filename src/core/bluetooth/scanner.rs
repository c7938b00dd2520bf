use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bluest::{Adapter, AdvertisingDevice, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::backend::lock;
use crate::core::bluetooth::transport::TransportEvent;
use crate::core::bluetooth::types::{Advertisement, Peripheral};
use crate::error::TransportError;

/// Runs at most one bluest scan and forwards what it sees as advertisement events
pub struct BluestScanner {
    adapter: Adapter,
    devices: Arc<Mutex<HashMap<String, Device>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl BluestScanner {
    pub fn new(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<String, Device>>>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            adapter,
            devices,
            events,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    pub async fn start_scan(&mut self, services: Vec<Uuid>, allow_duplicates: bool) {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await;
        }

        self.cancel_token = CancellationToken::new();
        let cancel_token_for_task = self.cancel_token.clone();
        let adapter_for_task = self.adapter.clone();
        let devices_for_task = self.devices.clone();
        let events_for_task = self.events.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = Self::internal_scan_task(
                adapter_for_task,
                devices_for_task,
                events_for_task,
                cancel_token_for_task,
                services,
                allow_duplicates,
            )
            .await
            {
                error!("Bluetooth scan failed: {}", e);
            }
        });

        self.scan_task_handle = Some(handle);
        info!("Device scan task started.");
    }

    async fn internal_scan_task(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<String, Device>>>,
        events: mpsc::UnboundedSender<TransportEvent>,
        cancel_token: CancellationToken,
        services: Vec<Uuid>,
        allow_duplicates: bool,
    ) -> Result<(), TransportError> {
        let mut scan_stream = adapter.scan(&services).await?;
        let mut seen = HashSet::new();

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let id = discovered.device.id().to_string();
                            if !allow_duplicates && !seen.insert(id.clone()) {
                                continue;
                            }
                            debug!("Found device - ID: {}, RSSI: {:?}", id, discovered.rssi);

                            lock(&devices).insert(id, discovered.device.clone());
                            if events.send(Self::to_event(discovered)).is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }

    fn to_event(discovered: AdvertisingDevice) -> TransportEvent {
        let adv = discovered.adv_data;
        let manufacturer_data = adv.manufacturer_data.map(|m| {
            let mut raw = m.company_id.to_le_bytes().to_vec();
            raw.extend_from_slice(&m.data);
            raw
        });

        TransportEvent::Advertisement {
            peripheral: Peripheral::new(
                discovered.device.id().to_string(),
                discovered.device.name().ok(),
            ),
            advertisement: Advertisement {
                local_name: adv.local_name,
                manufacturer_data,
                services: adv.services.into_iter().collect(),
                tx_power_level: adv.tx_power_level,
                is_connectable: adv.is_connectable,
            },
            rssi: discovered.rssi,
        }
    }

    /// Stops the running scan, if any, and waits for its task to finish
    pub async fn stop_scan(&mut self) {
        self.cancel_token.cancel();

        if let Some(handle) = self.scan_task_handle.take() {
            debug!("Waiting for scan task to finish...");
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Scan task finished with an unexpected join error: {:?}", e);
                }
            }
            info!("Bluetooth scan stopped.");
        }
    }
}
