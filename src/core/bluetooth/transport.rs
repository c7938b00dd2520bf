//! The boundary to the radio stack.
//!
//! A [`Transport`] pushes asynchronous happenings (adapter state, advertisements,
//! connect and disconnect completions) onto one ordered [`TransportEvent`] queue,
//! and exposes the attribute operations as `async` calls that resolve once the
//! peripheral has answered.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::core::bluetooth::types::{
    AdapterState, Advertisement, Characteristic, Descriptor, Peripheral, Service,
};
use crate::error::TransportError;

/// Values pushed by the peripheral for one subscription, in arrival order.
pub type NotificationStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Everything the transport reports without being asked.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    AdapterState(AdapterState),
    Advertisement {
        peripheral: Peripheral,
        advertisement: Advertisement,
        rssi: Option<i16>,
    },
    ConnectResult {
        peripheral: Peripheral,
        error: Option<TransportError>,
    },
    Disconnected {
        peripheral: Peripheral,
        error: Option<TransportError>,
    },
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Starts scanning. An empty `services` slice means unrestricted.
    async fn scan(&self, services: &[Uuid], allow_duplicates: bool) -> Result<(), TransportError>;

    /// Stops scanning. Must succeed when no scan is running.
    async fn stop_scan(&self) -> Result<(), TransportError>;

    /// Requests a connection. The outcome arrives as [`TransportEvent::ConnectResult`].
    async fn connect(&self, peripheral: &Peripheral) -> Result<(), TransportError>;

    /// Disconnects, or aborts a pending connection attempt.
    async fn cancel_connection(&self, peripheral: &Peripheral) -> Result<(), TransportError>;

    async fn set_mtu(&self, peripheral: &Peripheral) -> Result<(), TransportError>;

    async fn discover_services(
        &self,
        peripheral: &Peripheral,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<Service>, TransportError>;

    async fn discover_characteristics(
        &self,
        peripheral: &Peripheral,
        service: &Service,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<Characteristic>, TransportError>;

    async fn discover_descriptors(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<Descriptor>, TransportError>;

    async fn read_characteristic(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<Vec<u8>, TransportError>;

    async fn read_descriptor(
        &self,
        peripheral: &Peripheral,
        descriptor: &Descriptor,
    ) -> Result<Vec<u8>, TransportError>;

    /// Enables notifications or indications. The stream ends with the connection.
    async fn subscribe(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<NotificationStream, TransportError>;
}
