#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ble_gatt_explorer_lib::core::bluetooth::{
    AdapterState, Advertisement, AttributeHandle, CharProperties, Characteristic, Descriptor,
    NotificationStream, Peripheral, Service, Transport, TransportEvent, uuid_from_u16,
};
use ble_gatt_explorer_lib::error::TransportError;
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Every call the session made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Scan,
    StopScan,
    Connect(String),
    CancelConnection(String),
    SetMtu,
    DiscoverServices,
    DiscoverCharacteristics(Uuid),
    ReadCharacteristic(Uuid),
    DiscoverDescriptors(Uuid),
    ReadDescriptor(Uuid),
    Subscribe(Uuid),
}

pub struct MockCharacteristic {
    pub uuid: Uuid,
    pub properties: CharProperties,
    pub descriptors: Vec<Uuid>,
    pub notifications: Vec<Result<Vec<u8>, TransportError>>,
    pub live: bool,
}

impl MockCharacteristic {
    pub fn new(short: u16, properties: CharProperties) -> Self {
        Self {
            uuid: uuid_from_u16(short),
            properties,
            descriptors: Vec::new(),
            notifications: Vec::new(),
            live: false,
        }
    }

    pub fn descriptor(mut self, short: u16) -> Self {
        self.descriptors.push(uuid_from_u16(short));
        self
    }

    pub fn notifies(mut self, value: Result<Vec<u8>, TransportError>) -> Self {
        self.notifications.push(value);
        self
    }

    /// Subscriptions stay open and deliver what the test pushes with `MockTransport::push`.
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }
}

pub struct MockService {
    pub uuid: Uuid,
    pub characteristics: Vec<MockCharacteristic>,
}

impl MockService {
    pub fn new(short: u16) -> Self {
        Self {
            uuid: uuid_from_u16(short),
            characteristics: Vec::new(),
        }
    }

    pub fn characteristic(mut self, characteristic: MockCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

/// Scripted stand-in for the radio stack.
#[derive(Default)]
pub struct MockTransportBuilder {
    services: Vec<MockService>,
    connect_error: Option<TransportError>,
    fail_service_discovery: bool,
    fail_characteristics_of: HashSet<Uuid>,
    disconnect_during_read_of: Option<Uuid>,
    fail_mtu: bool,
    fail_read_of: HashSet<Uuid>,
    fail_descriptors_of: HashSet<Uuid>,
    fail_descriptor_read_of: HashSet<Uuid>,
    fail_subscribe_of: HashSet<Uuid>,
}

impl MockTransportBuilder {
    pub fn service(mut self, service: MockService) -> Self {
        self.services.push(service);
        self
    }

    pub fn connect_error(mut self, error: TransportError) -> Self {
        self.connect_error = Some(error);
        self
    }

    pub fn fail_service_discovery(mut self) -> Self {
        self.fail_service_discovery = true;
        self
    }

    pub fn fail_characteristic_discovery(mut self, service: Uuid) -> Self {
        self.fail_characteristics_of.insert(service);
        self
    }

    /// The read of `characteristic` never answers; the peripheral drops the link instead.
    pub fn disconnect_during_read(mut self, characteristic: Uuid) -> Self {
        self.disconnect_during_read_of = Some(characteristic);
        self
    }

    pub fn fail_mtu(mut self) -> Self {
        self.fail_mtu = true;
        self
    }

    pub fn fail_read(mut self, characteristic: Uuid) -> Self {
        self.fail_read_of.insert(characteristic);
        self
    }

    pub fn fail_descriptor_discovery(mut self, characteristic: Uuid) -> Self {
        self.fail_descriptors_of.insert(characteristic);
        self
    }

    pub fn fail_descriptor_read(mut self, descriptor: Uuid) -> Self {
        self.fail_descriptor_read_of.insert(descriptor);
        self
    }

    pub fn fail_subscribe(mut self, characteristic: Uuid) -> Self {
        self.fail_subscribe_of.insert(characteristic);
        self
    }

    pub fn build(self) -> (Arc<MockTransport>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = MockTransport {
            events,
            script: self,
            calls: Mutex::new(Vec::new()),
            connected: Mutex::new(None),
            scanning: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        };
        (Arc::new(transport), rx)
    }
}

pub struct MockTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    script: MockTransportBuilder,
    calls: Mutex<Vec<Call>>,
    connected: Mutex<Option<Peripheral>>,
    scanning: AtomicBool,
    next_handle: AtomicU64,
    subscribers: Mutex<Vec<(Uuid, mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>)>>,
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.lock().unwrap().is_some()
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn power(&self, state: AdapterState) {
        self.emit(TransportEvent::AdapterState(state));
    }

    pub fn advertise(&self, id: &str) {
        self.emit(TransportEvent::Advertisement {
            peripheral: Peripheral::new(id, None),
            advertisement: Advertisement {
                local_name: Some(format!("mock {}", id)),
                manufacturer_data: Some(vec![0x4c, 0x00, 0x01]),
                is_connectable: true,
                ..Advertisement::default()
            },
            rssi: Some(-60),
        });
    }

    /// The peripheral goes away on its own.
    pub fn drop_link(&self, error: Option<TransportError>) {
        if let Some(peripheral) = self.connected.lock().unwrap().take() {
            self.emit(TransportEvent::Disconnected { peripheral, error });
        }
    }

    /// Delivers `value` once on every open subscription to `characteristic`.
    pub fn push(&self, characteristic: Uuid, value: Vec<u8>) {
        for (uuid, sender) in self.subscribers.lock().unwrap().iter() {
            if *uuid == characteristic {
                let _ = sender.send(Ok(value.clone()));
            }
        }
    }

    /// Polls until `done` holds for the recorded calls.
    pub async fn wait_for(&self, done: impl Fn(&[Call]) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(&self.calls()) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for transport calls");
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn mint(&self) -> AttributeHandle {
        AttributeHandle(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    fn find_characteristic(&self, uuid: Uuid) -> Option<&MockCharacteristic> {
        self.script
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn scan(&self, _services: &[Uuid], _allow_duplicates: bool) -> Result<(), TransportError> {
        self.record(Call::Scan);
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.record(Call::StopScan);
        self.scanning.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<(), TransportError> {
        self.record(Call::Connect(peripheral.id.clone()));
        let error = self.script.connect_error.clone();
        if error.is_none() {
            *self.connected.lock().unwrap() = Some(peripheral.clone());
        }
        self.emit(TransportEvent::ConnectResult {
            peripheral: peripheral.clone(),
            error,
        });
        Ok(())
    }

    async fn cancel_connection(&self, peripheral: &Peripheral) -> Result<(), TransportError> {
        self.record(Call::CancelConnection(peripheral.id.clone()));
        self.drop_link(None);
        Ok(())
    }

    async fn set_mtu(&self, _peripheral: &Peripheral) -> Result<(), TransportError> {
        self.record(Call::SetMtu);
        if self.script.fail_mtu {
            return Err(TransportError::Unsupported("mtu exchange"));
        }
        Ok(())
    }

    async fn discover_services(
        &self,
        _peripheral: &Peripheral,
        _filter: Option<&[Uuid]>,
    ) -> Result<Vec<Service>, TransportError> {
        self.record(Call::DiscoverServices);
        if self.script.fail_service_discovery {
            return Err(TransportError::Backend("attribute not found".to_string()));
        }
        Ok(self
            .script
            .services
            .iter()
            .map(|s| Service {
                handle: self.mint(),
                uuid: s.uuid,
                name: None,
            })
            .collect())
    }

    async fn discover_characteristics(
        &self,
        _peripheral: &Peripheral,
        service: &Service,
        _filter: Option<&[Uuid]>,
    ) -> Result<Vec<Characteristic>, TransportError> {
        self.record(Call::DiscoverCharacteristics(service.uuid));
        if self.script.fail_characteristics_of.contains(&service.uuid) {
            return Err(TransportError::Backend("insufficient authentication".to_string()));
        }
        let mock = self
            .script
            .services
            .iter()
            .find(|s| s.uuid == service.uuid)
            .ok_or(TransportError::UnknownHandle(service.handle.0))?;
        Ok(mock
            .characteristics
            .iter()
            .map(|c| Characteristic {
                handle: self.mint(),
                uuid: c.uuid,
                name: None,
                properties: c.properties,
            })
            .collect())
    }

    async fn discover_descriptors(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
        _filter: Option<&[Uuid]>,
    ) -> Result<Vec<Descriptor>, TransportError> {
        self.record(Call::DiscoverDescriptors(characteristic.uuid));
        if self.script.fail_descriptors_of.contains(&characteristic.uuid) {
            return Err(TransportError::Backend("request not supported".to_string()));
        }
        let mock = self
            .find_characteristic(characteristic.uuid)
            .ok_or(TransportError::UnknownHandle(characteristic.handle.0))?;
        Ok(mock
            .descriptors
            .iter()
            .map(|uuid| Descriptor {
                handle: self.mint(),
                uuid: *uuid,
                name: None,
            })
            .collect())
    }

    async fn read_characteristic(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(Call::ReadCharacteristic(characteristic.uuid));
        if self.script.disconnect_during_read_of == Some(characteristic.uuid) {
            self.drop_link(Some(TransportError::NotConnected));
            return std::future::pending().await;
        }
        if self.script.fail_read_of.contains(&characteristic.uuid) {
            return Err(TransportError::Backend("read not permitted".to_string()));
        }
        Ok(characteristic.uuid.as_bytes()[2..4].to_vec())
    }

    async fn read_descriptor(
        &self,
        _peripheral: &Peripheral,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(Call::ReadDescriptor(descriptor.uuid));
        if self.script.fail_descriptor_read_of.contains(&descriptor.uuid) {
            return Err(TransportError::Backend("insufficient encryption".to_string()));
        }
        Ok(vec![0x01, 0x00])
    }

    async fn subscribe(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<NotificationStream, TransportError> {
        self.record(Call::Subscribe(characteristic.uuid));
        if self.script.fail_subscribe_of.contains(&characteristic.uuid) {
            return Err(TransportError::Backend("write not permitted".to_string()));
        }
        let mock = self.find_characteristic(characteristic.uuid);
        if mock.is_some_and(|c| c.live) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscribers
                .lock()
                .unwrap()
                .push((characteristic.uuid, tx));
            return Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|value| (value, rx))
            })
            .boxed());
        }
        let values = mock.map(|c| c.notifications.clone()).unwrap_or_default();
        Ok(stream::iter(values).boxed())
    }
}
