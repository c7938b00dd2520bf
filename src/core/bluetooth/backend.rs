//! [`Transport`] implementation on top of the bluest crate

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bluest::{Adapter, AdapterEvent, ConnectionEvent, Device};
use futures_util::{Stream, StreamExt, stream};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::bluetooth::constants::known_name;
use crate::core::bluetooth::scanner::BluestScanner;
use crate::core::bluetooth::transport::{NotificationStream, Transport, TransportEvent};
use crate::core::bluetooth::types::{
    AdapterState, AttributeHandle, CharProperties, Characteristic, Descriptor, Peripheral, Service,
};
use crate::error::TransportError;

impl From<bluest::Error> for TransportError {
    fn from(e: bluest::Error) -> Self {
        TransportError::Backend(e.to_string())
    }
}

/// Locks a mutex, ignoring poisoning: the guarded maps stay consistent on panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Native objects behind the handles given out by discovery
#[derive(Default)]
struct AttributeTable {
    services: HashMap<AttributeHandle, bluest::Service>,
    characteristics: HashMap<AttributeHandle, bluest::Characteristic>,
    descriptors: HashMap<AttributeHandle, bluest::Descriptor>,
}

/// Bookkeeping for one connection attempt
struct Link {
    /// Set once a disconnect has been reported, so it is reported only once
    disconnect_reported: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct BluestTransport {
    adapter: Adapter,
    events: mpsc::UnboundedSender<TransportEvent>,
    devices: Arc<Mutex<HashMap<String, Device>>>,
    scanner: tokio::sync::Mutex<BluestScanner>,
    attributes: Mutex<AttributeTable>,
    links: Arc<Mutex<HashMap<String, Link>>>,
    next_handle: AtomicU64,
    state_task: JoinHandle<()>,
}

impl BluestTransport {
    /// Opens the default adapter and starts reporting its state.
    pub async fn open() -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let adapter = Adapter::default().await.ok_or_else(|| {
            TransportError::AdapterUnavailable("No Bluetooth adapter found".to_string())
        })?;
        info!("Bluetooth adapter opened.");

        let (events, rx) = mpsc::unbounded_channel();
        let devices = Arc::new(Mutex::new(HashMap::new()));
        let scanner = BluestScanner::new(adapter.clone(), devices.clone(), events.clone());
        let state_task = tokio::spawn(Self::watch_adapter(adapter.clone(), events.clone()));

        Ok((
            Self {
                adapter,
                events,
                devices,
                scanner: tokio::sync::Mutex::new(scanner),
                attributes: Mutex::new(AttributeTable::default()),
                links: Arc::new(Mutex::new(HashMap::new())),
                next_handle: AtomicU64::new(1),
                state_task,
            },
            rx,
        ))
    }

    /// Reports `Unknown`, then `PoweredOn` once the adapter is usable, then every change.
    async fn watch_adapter(adapter: Adapter, events: mpsc::UnboundedSender<TransportEvent>) {
        if events
            .send(TransportEvent::AdapterState(AdapterState::Unknown))
            .is_err()
        {
            return;
        }

        // Opened first so no change after the availability check is lost.
        let stream = adapter.events().await;

        match adapter.wait_available().await {
            Ok(()) => {
                info!("Bluetooth adapter is available.");
                if events
                    .send(TransportEvent::AdapterState(AdapterState::PoweredOn))
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => warn!("Failed to wait for the adapter: {}", e),
        }

        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Adapter state changes will not be reported: {}", e);
                return;
            }
        };
        while let Some(event) = stream.next().await {
            let state = match event {
                Ok(AdapterEvent::Available) => AdapterState::PoweredOn,
                Ok(AdapterEvent::Unavailable) => AdapterState::PoweredOff,
                Err(e) => {
                    warn!("Error in adapter event stream: {}", e);
                    continue;
                }
            };
            if events.send(TransportEvent::AdapterState(state)).is_err() {
                break;
            }
        }
        debug!("Adapter event stream ended");
    }

    fn mint(&self) -> AttributeHandle {
        AttributeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn device(&self, peripheral: &Peripheral) -> Result<Device, TransportError> {
        lock(&self.devices)
            .get(&peripheral.id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeripheral(peripheral.id.clone()))
    }

    fn native_service(&self, handle: AttributeHandle) -> Result<bluest::Service, TransportError> {
        lock(&self.attributes)
            .services
            .get(&handle)
            .cloned()
            .ok_or(TransportError::UnknownHandle(handle.0))
    }

    fn native_characteristic(
        &self,
        handle: AttributeHandle,
    ) -> Result<bluest::Characteristic, TransportError> {
        lock(&self.attributes)
            .characteristics
            .get(&handle)
            .cloned()
            .ok_or(TransportError::UnknownHandle(handle.0))
    }

    fn native_descriptor(&self, handle: AttributeHandle) -> Result<bluest::Descriptor, TransportError> {
        lock(&self.attributes)
            .descriptors
            .get(&handle)
            .cloned()
            .ok_or(TransportError::UnknownHandle(handle.0))
    }

    fn track_task(&self, peripheral: &Peripheral, task: JoinHandle<()>) {
        match lock(&self.links).get_mut(&peripheral.id) {
            Some(link) => link.tasks.push(task),
            None => task.abort(),
        }
    }

    fn properties(props: &bluest::CharacteristicProperties) -> CharProperties {
        let mut out = CharProperties::empty();
        out.set(CharProperties::BROADCAST, props.broadcast);
        out.set(CharProperties::READ, props.read);
        out.set(CharProperties::WRITE_WITHOUT_RESPONSE, props.write_without_response);
        out.set(CharProperties::WRITE, props.write);
        out.set(CharProperties::NOTIFY, props.notify);
        out.set(CharProperties::INDICATE, props.indicate);
        out.set(
            CharProperties::AUTHENTICATED_SIGNED_WRITES,
            props.authenticated_signed_writes,
        );
        out.set(CharProperties::EXTENDED_PROPERTIES, props.extended_properties);
        out
    }

    fn matches(filter: Option<&[Uuid]>, uuid: &Uuid) -> bool {
        filter.is_none_or(|f| f.is_empty() || f.contains(uuid))
    }
}

/// Sends `Disconnected` unless it was already sent for this link.
fn report_disconnect(
    reported: &AtomicBool,
    events: &mpsc::UnboundedSender<TransportEvent>,
    peripheral: &Peripheral,
    error: Option<TransportError>,
) {
    if !reported.swap(true, Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Disconnected {
            peripheral: peripheral.clone(),
            error,
        });
    }
}

/// Follows one link until the peripheral drops it.
async fn watch_link(
    mut connection_events: impl Stream<Item = ConnectionEvent> + Unpin,
    peripheral: &Peripheral,
    reported: &AtomicBool,
    events: &mpsc::UnboundedSender<TransportEvent>,
) {
    while let Some(event) = connection_events.next().await {
        if matches!(event, ConnectionEvent::Disconnected) {
            report_disconnect(reported, events, peripheral, None);
            break;
        }
    }
}

impl Drop for BluestTransport {
    fn drop(&mut self) {
        self.state_task.abort();
        for (_, link) in lock(&self.links).drain() {
            for task in link.tasks {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl Transport for BluestTransport {
    async fn scan(&self, services: &[Uuid], allow_duplicates: bool) -> Result<(), TransportError> {
        self.scanner
            .lock()
            .await
            .start_scan(services.to_vec(), allow_duplicates)
            .await;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.scanner.lock().await.stop_scan().await;
        Ok(())
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<(), TransportError> {
        let device = self.device(peripheral)?;
        let disconnect_reported = Arc::new(AtomicBool::new(false));

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let peripheral_for_task = peripheral.clone();
        let reported = disconnect_reported.clone();

        let task = tokio::spawn(async move {
            let peripheral = peripheral_for_task;

            // Watching starts before connecting so an early drop is still seen.
            let connection_events = adapter
                .device_connection_events(&device)
                .await
                .inspect_err(|e| {
                    warn!("Cannot watch connection state of {}: {}", peripheral.id, e)
                });

            if let Err(e) = adapter.connect_device(&device).await {
                let _ = events.send(TransportEvent::ConnectResult {
                    peripheral,
                    error: Some(e.into()),
                });
                return;
            }

            info!("Connection to {} established", peripheral.id);
            let _ = events.send(TransportEvent::ConnectResult {
                peripheral: peripheral.clone(),
                error: None,
            });

            if let Ok(connection_events) = connection_events {
                watch_link(connection_events, &peripheral, &reported, &events).await;
            }
        });

        lock(&self.links).insert(
            peripheral.id.clone(),
            Link {
                disconnect_reported,
                tasks: vec![task],
            },
        );
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &Peripheral) -> Result<(), TransportError> {
        let device = self.device(peripheral)?;

        let result = if device.is_connected().await {
            info!("Disconnecting from device {}", peripheral.id);
            self.adapter
                .disconnect_device(&device)
                .await
                .map_err(TransportError::from)
        } else {
            info!("Device {} not connected", peripheral.id);
            Ok(())
        };

        let link = lock(&self.links).remove(&peripheral.id);
        if let Some(link) = link {
            for task in link.tasks {
                task.abort();
            }
            report_disconnect(
                &link.disconnect_reported,
                &self.events,
                peripheral,
                result.clone().err(),
            );
        }

        // Handles never outlive the connection that minted them.
        *lock(&self.attributes) = AttributeTable::default();
        result
    }

    async fn set_mtu(&self, peripheral: &Peripheral) -> Result<(), TransportError> {
        // The platform stack runs the ATT MTU exchange itself on connect.
        debug!("MTU for {} negotiated by the platform", peripheral.id);
        Ok(())
    }

    async fn discover_services(
        &self,
        peripheral: &Peripheral,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<Service>, TransportError> {
        let device = self.device(peripheral)?;
        let native = device.discover_services().await?;

        // A new walk of the hierarchy invalidates the handles of the previous one.
        *lock(&self.attributes) = AttributeTable::default();

        let mut services = Vec::new();
        for service in native {
            let uuid = service.uuid();
            if !Self::matches(filter, &uuid) {
                continue;
            }
            let handle = self.mint();
            lock(&self.attributes).services.insert(handle, service);
            services.push(Service {
                handle,
                uuid,
                name: known_name(&uuid).map(str::to_string),
            });
        }
        Ok(services)
    }

    async fn discover_characteristics(
        &self,
        _peripheral: &Peripheral,
        service: &Service,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<Characteristic>, TransportError> {
        let native = self
            .native_service(service.handle)?
            .discover_characteristics()
            .await?;

        let mut characteristics = Vec::new();
        for characteristic in native {
            let uuid = characteristic.uuid();
            if !Self::matches(filter, &uuid) {
                continue;
            }
            let properties = match characteristic.properties().await {
                Ok(props) => Self::properties(&props),
                Err(e) => {
                    warn!("Failed to read properties of {}: {}", uuid, e);
                    CharProperties::empty()
                }
            };
            let handle = self.mint();
            lock(&self.attributes)
                .characteristics
                .insert(handle, characteristic);
            characteristics.push(Characteristic {
                handle,
                uuid,
                name: known_name(&uuid).map(str::to_string),
                properties,
            });
        }
        Ok(characteristics)
    }

    async fn discover_descriptors(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<Descriptor>, TransportError> {
        let native = self
            .native_characteristic(characteristic.handle)?
            .discover_descriptors()
            .await?;

        let mut descriptors = Vec::new();
        for descriptor in native {
            let uuid = descriptor.uuid();
            if !Self::matches(filter, &uuid) {
                continue;
            }
            let handle = self.mint();
            lock(&self.attributes).descriptors.insert(handle, descriptor);
            descriptors.push(Descriptor {
                handle,
                uuid,
                name: known_name(&uuid).map(str::to_string),
            });
        }
        Ok(descriptors)
    }

    async fn read_characteristic(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<Vec<u8>, TransportError> {
        let native = self.native_characteristic(characteristic.handle)?;
        Ok(native.read().await?)
    }

    async fn read_descriptor(
        &self,
        _peripheral: &Peripheral,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>, TransportError> {
        let native = self.native_descriptor(descriptor.handle)?;
        Ok(native.read().await?)
    }

    async fn subscribe(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<NotificationStream, TransportError> {
        let native = self.native_characteristic(characteristic.handle)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        // bluest's notification stream borrows the characteristic, so it lives in its own task.
        let task = tokio::spawn(async move {
            match native.notify().await {
                Ok(mut notifications) => {
                    let _ = ready_tx.send(Ok(()));
                    while let Some(item) = notifications.next().await {
                        if tx.send(item.map_err(TransportError::from)).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(TransportError::from(e)));
                }
            }
        });
        self.track_task(peripheral, task);

        ready_rx.await.map_err(|_| {
            TransportError::Backend("notification task ended before subscribing".to_string())
        })??;

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peripheral() -> Peripheral {
        Peripheral::new("AA:BB:CC:DD:EE:FF", None)
    }

    #[tokio::test]
    async fn watcher_reports_drop_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reported = AtomicBool::new(false);
        let connection_events = stream::iter([
            ConnectionEvent::Connected,
            ConnectionEvent::Disconnected,
            ConnectionEvent::Disconnected,
        ]);

        watch_link(connection_events, &peripheral(), &reported, &tx).await;
        report_disconnect(&reported, &tx, &peripheral(), None);

        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Disconnected {
                peripheral: peripheral(),
                error: None,
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drop_buffered_before_connect_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reported = AtomicBool::new(false);

        // The stream is opened before connecting, so a drop in between is already queued.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        event_tx.send(ConnectionEvent::Disconnected).unwrap();
        drop(event_tx);
        let connection_events = stream::unfold(event_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        watch_link(Box::pin(connection_events), &peripheral(), &reported, &tx).await;

        assert!(matches!(
            rx.try_recv(),
            Ok(TransportEvent::Disconnected { .. })
        ));
        assert!(reported.load(Ordering::SeqCst));
    }
}
