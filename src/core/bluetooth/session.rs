//! Session coordinator
//! Consumes the transport's event queue and drives scan → select → connect → enumerate → disconnect.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::session_config::SessionConfig;
use crate::core::bluetooth::completion::{CompletionSignal, SessionOutcome};
use crate::core::bluetooth::connection::{ConnectionManager, ConnectionReport};
use crate::core::bluetooth::filter::PeripheralFilter;
use crate::core::bluetooth::monitor::AdapterMonitor;
use crate::core::bluetooth::transport::{Transport, TransportEvent};
use crate::core::bluetooth::types::{ConnectionState, Notification, Peripheral};
use crate::error::{SessionError, TransportError};

struct ActiveConnection {
    peripheral: Peripheral,
    cancel: CancellationToken,
    task: JoinHandle<ConnectionReport>,
}

enum Phase {
    Scanning,
    Connecting(Peripheral),
    Connected(ActiveConnection),
}

/// Why the connection is being torn down, from the coordinator's point of view.
enum Teardown {
    PeripheralDisconnected(Option<TransportError>),
    Interrupted,
    EventsClosed,
}

/// Drives one session against a [`Transport`].
pub struct Session<T: Transport> {
    transport: Arc<T>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    config: SessionConfig,
    monitor: AdapterMonitor,
    filter: PeripheralFilter,
    sink: Option<mpsc::UnboundedSender<Notification>>,
    shutdown: CancellationToken,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: Arc<T>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        config: SessionConfig,
    ) -> Self {
        let monitor = AdapterMonitor::new(config.service_filter.clone(), config.allow_duplicates);
        let filter = PeripheralFilter::new(config.target.clone());
        Self {
            transport,
            events,
            config,
            monitor,
            filter,
            sink: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Every notification delivered during the session is also sent here.
    pub fn with_notification_sink(mut self, sink: mpsc::UnboundedSender<Notification>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Cancelling this token interrupts the session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until the session is over, then fires `signal` exactly once.
    pub async fn run(mut self, signal: CompletionSignal) {
        let outcome = self.event_loop().await;
        match &outcome {
            SessionOutcome::Disconnected { peripheral, error: None } => {
                info!("Disconnected from {}", peripheral.id)
            }
            SessionOutcome::Disconnected {
                peripheral,
                error: Some(e),
            } => warn!("Disconnected from {}: {}", peripheral.id, e),
            SessionOutcome::ConnectFailed { peripheral, error } => {
                let failure = SessionError::Connect {
                    peripheral: peripheral.id.clone(),
                    source: error.clone(),
                };
                error!("{}", failure)
            }
            SessionOutcome::Interrupted => info!("Session interrupted"),
            SessionOutcome::EventsClosed => error!("Transport event queue closed"),
        }
        signal.fire(outcome);
    }

    async fn event_loop(&mut self) -> SessionOutcome {
        let mut phase = Phase::Scanning;
        let shutdown = self.shutdown.clone();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    return self.interrupt(phase).await;
                }
                event = self.events.recv() => event,
            };

            let Some(event) = event else {
                return match phase {
                    Phase::Connected(active) => {
                        self.teardown(active, Teardown::EventsClosed).await
                    }
                    _ => SessionOutcome::EventsClosed,
                };
            };

            phase = match (phase, event) {
                (phase, TransportEvent::AdapterState(state)) => {
                    if let Err(e) = self.monitor.on_state(&*self.transport, state).await {
                        warn!("Adapter state {} not applied: {}", state, e);
                    }
                    phase
                }

                (
                    Phase::Scanning,
                    TransportEvent::Advertisement {
                        peripheral,
                        advertisement,
                        rssi,
                    },
                ) => {
                    if !self.filter.evaluate(&peripheral, &advertisement, rssi) {
                        Phase::Scanning
                    } else {
                        // Stopping the scan first guarantees a single pursued peripheral.
                        let _ = self.monitor.halt(&*self.transport).await;
                        info!("Initiating connection to {}...", peripheral.id);
                        self.log_state(&peripheral, ConnectionState::Connecting);
                        if let Err(error) = self.transport.connect(&peripheral).await {
                            return self.connect_failed(peripheral, error).await;
                        }
                        Phase::Connecting(peripheral)
                    }
                }

                (Phase::Connecting(pending), TransportEvent::ConnectResult { peripheral, error })
                    if peripheral.id == pending.id =>
                {
                    if let Some(error) = error {
                        return self.connect_failed(pending, error).await;
                    }
                    self.log_state(&pending, ConnectionState::Connected);
                    Phase::Connected(self.start_connection(pending))
                }

                (Phase::Connecting(pending), TransportEvent::Disconnected { peripheral, error })
                    if peripheral.id == pending.id =>
                {
                    let error = error.unwrap_or_else(|| {
                        TransportError::Backend("disconnected while connecting".to_string())
                    });
                    return self.connect_failed(pending, error).await;
                }

                (Phase::Connected(active), TransportEvent::Disconnected { peripheral, error })
                    if peripheral.id == active.peripheral.id =>
                {
                    return self
                        .teardown(active, Teardown::PeripheralDisconnected(error))
                        .await;
                }

                (phase, event) => {
                    debug!("Ignoring event {:?}", event);
                    phase
                }
            };
        }
    }

    fn log_state(&self, peripheral: &Peripheral, state: ConnectionState) {
        debug!("{} is now {:?}", peripheral.id, state);
    }

    fn start_connection(&self, peripheral: Peripheral) -> ActiveConnection {
        let cancel = CancellationToken::new();
        let manager = ConnectionManager::new(
            self.transport.clone(),
            self.config.pass_mode,
            Duration::from_millis(self.config.settle_interval_ms),
            self.sink.clone(),
        );

        let task_peripheral = peripheral.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { manager.run(task_peripheral, task_cancel).await });

        ActiveConnection {
            peripheral,
            cancel,
            task,
        }
    }

    async fn connect_failed(&self, peripheral: Peripheral, error: TransportError) -> SessionOutcome {
        self.log_state(&peripheral, ConnectionState::Disconnected);
        // Abort whatever the transport still has pending for this attempt.
        if let Err(e) = self.transport.cancel_connection(&peripheral).await {
            debug!("Cancelling failed connection to {}: {}", peripheral.id, e);
        }
        SessionOutcome::ConnectFailed { peripheral, error }
    }

    /// Stops the connection task, waits for it to release the peripheral and
    /// turns what it reports into the session outcome.
    async fn teardown(&self, active: ActiveConnection, why: Teardown) -> SessionOutcome {
        self.log_state(&active.peripheral, ConnectionState::Disconnecting);
        active.cancel.cancel();

        let report = match active.task.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Connection task for {} failed: {}", active.peripheral.id, e);
                None
            }
        };
        self.log_state(&active.peripheral, ConnectionState::Disconnected);

        let aborted = report.and_then(|r| r.error).filter(|e| {
            // Being cut off is the expected way for a connection to end.
            !matches!(e, SessionError::Disconnected(_))
        });

        match why {
            Teardown::PeripheralDisconnected(reason) => {
                if let Some(reason) = reason {
                    info!("Peripheral {} reported: {}", active.peripheral.id, reason);
                }
                SessionOutcome::Disconnected {
                    peripheral: active.peripheral,
                    error: aborted,
                }
            }
            Teardown::Interrupted => SessionOutcome::Disconnected {
                peripheral: active.peripheral,
                error: aborted.or(Some(SessionError::Interrupted)),
            },
            Teardown::EventsClosed => SessionOutcome::EventsClosed,
        }
    }

    async fn interrupt(&mut self, phase: Phase) -> SessionOutcome {
        info!("Interrupt requested");
        match phase {
            Phase::Scanning => {
                let _ = self.monitor.halt(&*self.transport).await;
                SessionOutcome::Interrupted
            }
            Phase::Connecting(peripheral) => {
                if let Err(e) = self.transport.cancel_connection(&peripheral).await {
                    warn!("Failed to cancel pending connection to {}: {}", peripheral.id, e);
                }
                SessionOutcome::Interrupted
            }
            Phase::Connected(active) => self.teardown(active, Teardown::Interrupted).await,
        }
    }
}
