//! GATT hierarchy enumerator
//! Walks services, characteristics and descriptors of a connected peripheral depth-first,
//! reading and subscribing according to each characteristic's properties.

use std::future::Future;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::notification::NotificationRelay;
use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::{Attribute, Characteristic, Peripheral, Service};
use crate::error::{AttributeFailure, Operation, SessionError, Target, TransportError};
use crate::utils::format_value;

/// What one pass over the hierarchy did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub services: usize,
    pub characteristics: usize,
    pub descriptors: usize,
    pub reads: usize,
    pub subscriptions: usize,
    pub failures: Vec<AttributeFailure>,
}

/// Raised when the connection token fires while a call is outstanding.
struct Cancelled(Operation);

impl From<Cancelled> for SessionError {
    fn from(cancelled: Cancelled) -> Self {
        SessionError::Disconnected(cancelled.0)
    }
}

pub struct GattEnumerator<'a, T: Transport + ?Sized> {
    transport: &'a T,
    peripheral: &'a Peripheral,
    cancel: &'a CancellationToken,
    settle_interval: Duration,
}

impl<'a, T: Transport + ?Sized> GattEnumerator<'a, T> {
    pub fn new(
        transport: &'a T,
        peripheral: &'a Peripheral,
        cancel: &'a CancellationToken,
        settle_interval: Duration,
    ) -> Self {
        Self {
            transport,
            peripheral,
            cancel,
            settle_interval,
        }
    }

    /// Races one transport call against the connection token.
    async fn guarded<R>(
        &self,
        operation: Operation,
        call: impl Future<Output = Result<R, TransportError>>,
    ) -> Result<Result<R, TransportError>, Cancelled> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled(operation)),
            result = call => Ok(result),
        }
    }

    fn record(
        report: &mut PassReport,
        operation: Operation,
        target: Target,
        error: TransportError,
    ) {
        let failure = AttributeFailure {
            operation,
            target,
            error,
        };
        warn!("{}", failure);
        report.failures.push(failure);
    }

    /// Runs one full pass followed by the settle interval.
    ///
    /// Subscriptions are handed to `relay`. Only a service discovery failure or a
    /// disconnect aborts the pass; everything else is recorded and skipped.
    pub async fn run_pass(&self, relay: &mut NotificationRelay) -> Result<PassReport, SessionError> {
        info!("Connected to {}", self.peripheral.id);
        let mut report = PassReport::default();

        if let Err(e) = self
            .guarded(Operation::SetMtu, self.transport.set_mtu(self.peripheral))
            .await?
        {
            Self::record(
                &mut report,
                Operation::SetMtu,
                Target::Peripheral(self.peripheral.id.clone()),
                e,
            );
        }

        let services = match self
            .guarded(
                Operation::DiscoverServices,
                self.transport.discover_services(self.peripheral, None),
            )
            .await?
        {
            Ok(services) => services,
            Err(e) => {
                error!("Failed to discover services, error {}", e);
                return Err(SessionError::ServiceDiscovery(e));
            }
        };
        report.services = services.len();

        for service in &services {
            self.visit_service(service, relay, &mut report).await?;
        }

        self.settle().await?;
        Ok(report)
    }

    async fn visit_service(
        &self,
        service: &Service,
        relay: &mut NotificationRelay,
        report: &mut PassReport,
    ) -> Result<(), Cancelled> {
        info!("Service: {}", service.label());

        let characteristics = match self
            .guarded(
                Operation::DiscoverCharacteristics,
                self.transport
                    .discover_characteristics(self.peripheral, service, None),
            )
            .await?
        {
            Ok(characteristics) => characteristics,
            Err(e) => {
                Self::record(
                    report,
                    Operation::DiscoverCharacteristics,
                    Target::Attribute(service.uuid),
                    e,
                );
                return Ok(());
            }
        };
        report.characteristics += characteristics.len();

        for characteristic in &characteristics {
            self.visit_characteristic(characteristic, relay, report)
                .await?;
        }
        Ok(())
    }

    /// read, discover descriptors, read descriptors, subscribe; in that order
    async fn visit_characteristic(
        &self,
        characteristic: &Characteristic,
        relay: &mut NotificationRelay,
        report: &mut PassReport,
    ) -> Result<(), Cancelled> {
        info!("  Characteristic  {}", characteristic.label());
        info!("    properties    {}", characteristic.properties);

        if characteristic.properties.is_readable() {
            match self
                .guarded(
                    Operation::ReadCharacteristic,
                    self.transport
                        .read_characteristic(self.peripheral, characteristic),
                )
                .await?
            {
                Ok(value) => {
                    report.reads += 1;
                    info!("    value         {}", format_value(&value));
                }
                Err(e) => Self::record(
                    report,
                    Operation::ReadCharacteristic,
                    Target::Attribute(characteristic.uuid),
                    e,
                ),
            }
        }

        let descriptors = match self
            .guarded(
                Operation::DiscoverDescriptors,
                self.transport
                    .discover_descriptors(self.peripheral, characteristic, None),
            )
            .await?
        {
            Ok(descriptors) => descriptors,
            Err(e) => {
                Self::record(
                    report,
                    Operation::DiscoverDescriptors,
                    Target::Attribute(characteristic.uuid),
                    e,
                );
                return Ok(());
            }
        };
        report.descriptors += descriptors.len();

        for descriptor in &descriptors {
            info!("  Descriptor      {}", descriptor.label());
            match self
                .guarded(
                    Operation::ReadDescriptor,
                    self.transport.read_descriptor(self.peripheral, descriptor),
                )
                .await?
            {
                Ok(value) => {
                    report.reads += 1;
                    info!("    value         {}", format_value(&value));
                }
                Err(e) => Self::record(
                    report,
                    Operation::ReadDescriptor,
                    Target::Attribute(descriptor.uuid),
                    e,
                ),
            }
        }

        if characteristic.properties.is_subscribable() {
            if relay.is_relaying(&characteristic.uuid) {
                debug!("    already subscribed");
                return Ok(());
            }
            match self
                .guarded(
                    Operation::Subscribe,
                    self.transport.subscribe(self.peripheral, characteristic),
                )
                .await?
            {
                Ok(stream) => {
                    report.subscriptions += 1;
                    relay.setup_notifications(characteristic, stream);
                }
                Err(e) => Self::record(
                    report,
                    Operation::Subscribe,
                    Target::Attribute(characteristic.uuid),
                    e,
                ),
            }
        }

        Ok(())
    }

    async fn settle(&self) -> Result<(), Cancelled> {
        if self.settle_interval.is_zero() {
            return Ok(());
        }
        info!(
            "Waiting for {} ms to get some notifications, if any.",
            self.settle_interval.as_millis()
        );
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled(Operation::Settle)),
            _ = tokio::time::sleep(self.settle_interval) => Ok(()),
        }
    }
}
