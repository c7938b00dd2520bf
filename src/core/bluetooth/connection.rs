//! Bluetooth connection handling
//! This module owns one connection from the connect callback to the disconnect request

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::enumerator::{GattEnumerator, PassReport};
use crate::core::bluetooth::notification::NotificationRelay;
use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::{Notification, Peripheral};
use crate::error::{Operation, SessionError};

/// What to do with a connection once it is up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PassMode {
    /// One pass and the settle interval, then disconnect.
    #[default]
    Once,
    /// One pass, then stay connected until the peripheral goes away.
    Hold,
    /// Keep running passes back to back while connected.
    Repeat,
}

/// A live connection. Releasing it issues the one disconnect request the
/// connection is allowed; a handle that is dropped unreleased still issues it.
pub struct ConnectionHandle<T: Transport + ?Sized> {
    transport: Arc<T>,
    peripheral: Peripheral,
    released: bool,
}

impl<T: Transport + ?Sized> ConnectionHandle<T> {
    pub fn acquire(transport: Arc<T>, peripheral: Peripheral) -> Self {
        Self {
            transport,
            peripheral,
            released: false,
        }
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Disconnect from the peripheral
    pub async fn release(mut self) {
        self.released = true;
        info!("Disconnecting from device {}", self.peripheral.id);
        if let Err(e) = self.transport.cancel_connection(&self.peripheral).await {
            warn!("Failed to cancel connection to {}: {}", self.peripheral.id, e);
        }
    }
}

impl<T: Transport + ?Sized> Drop for ConnectionHandle<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("Connection to {} dropped without release", self.peripheral.id);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let transport = self.transport.clone();
            let peripheral = self.peripheral.clone();
            runtime.spawn(async move {
                if let Err(e) = transport.cancel_connection(&peripheral).await {
                    warn!("Failed to cancel connection to {}: {}", peripheral.id, e);
                }
            });
        }
    }
}

/// Everything that happened on one connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReport {
    pub peripheral: Peripheral,
    pub passes: Vec<PassReport>,
    pub error: Option<SessionError>,
}

/// Connection manager for one peripheral
pub struct ConnectionManager<T: Transport + ?Sized> {
    transport: Arc<T>,
    pass_mode: PassMode,
    settle_interval: Duration,
    sink: Option<mpsc::UnboundedSender<Notification>>,
}

impl<T: Transport + ?Sized> ConnectionManager<T> {
    pub fn new(
        transport: Arc<T>,
        pass_mode: PassMode,
        settle_interval: Duration,
        sink: Option<mpsc::UnboundedSender<Notification>>,
    ) -> Self {
        Self {
            transport,
            pass_mode,
            settle_interval,
            sink,
        }
    }

    /// Runs a freshly connected peripheral until its work is done or `cancel` fires.
    ///
    /// Every way out of here passes through the single `release` below.
    pub async fn run(&self, peripheral: Peripheral, cancel: CancellationToken) -> ConnectionReport {
        let handle = ConnectionHandle::acquire(self.transport.clone(), peripheral.clone());
        let mut relay = NotificationRelay::new(
            peripheral.id.clone(),
            cancel.child_token(),
            self.sink.clone(),
        );

        let mut passes = Vec::new();
        let result = self
            .drive(handle.peripheral(), &cancel, &mut relay, &mut passes)
            .await;

        match &result {
            Ok(()) => info!("Finished with {}", peripheral.id),
            Err(SessionError::Disconnected(op)) => {
                info!("Connection to {} ended during {}", peripheral.id, op)
            }
            Err(e) => error!("Connection to {} aborted: {}", peripheral.id, e),
        }

        relay.shutdown().await;
        handle.release().await;

        ConnectionReport {
            peripheral,
            passes,
            error: result.err(),
        }
    }

    async fn drive(
        &self,
        peripheral: &Peripheral,
        cancel: &CancellationToken,
        relay: &mut NotificationRelay,
        passes: &mut Vec<PassReport>,
    ) -> Result<(), SessionError> {
        let enumerator =
            GattEnumerator::new(&*self.transport, peripheral, cancel, self.settle_interval);

        match self.pass_mode {
            PassMode::Once => {
                passes.push(enumerator.run_pass(relay).await?);
            }
            PassMode::Hold => {
                passes.push(enumerator.run_pass(relay).await?);
                info!(
                    "Holding connection to {} with {} subscriptions",
                    peripheral.id,
                    relay.active()
                );
                cancel.cancelled().await;
                return Err(SessionError::Disconnected(Operation::Idle));
            }
            PassMode::Repeat => loop {
                passes.push(enumerator.run_pass(relay).await?);
                info!("Pass {} over {} complete", passes.len(), peripheral.id);
                tokio::task::yield_now().await;
            },
        }
        Ok(())
    }
}
