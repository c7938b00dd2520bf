//! Notification relay
//! Drains every subscription of one connection on its own task and reports each delivery

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::transport::NotificationStream;
use crate::core::bluetooth::types::{Attribute, Characteristic, Notification};
use crate::utils::format_value;

/// Relays value pushes for the lifetime of one connection
pub struct NotificationRelay {
    peripheral: String,
    cancel: CancellationToken,
    sink: Option<mpsc::UnboundedSender<Notification>>,
    tasks: JoinSet<()>,
    /// Characteristics subscribed on this connection; each is relayed by one task only.
    relayed: HashSet<Uuid>,
    live: Arc<AtomicUsize>,
}

impl NotificationRelay {
    /// Create a new NotificationRelay. `cancel` should be a child of the connection token.
    pub fn new(
        peripheral: String,
        cancel: CancellationToken,
        sink: Option<mpsc::UnboundedSender<Notification>>,
    ) -> Self {
        Self {
            peripheral,
            cancel,
            sink,
            tasks: JoinSet::new(),
            relayed: HashSet::new(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Starts relaying one subscription
    pub fn setup_notifications(&mut self, characteristic: &Characteristic, stream: NotificationStream) {
        info!("Listening for notifications on {}", characteristic.label());

        let peripheral = self.peripheral.clone();
        let uuid = characteristic.uuid;
        let cancel = self.cancel.clone();
        let sink = self.sink.clone();
        let live = self.live.clone();

        self.relayed.insert(uuid);
        live.fetch_add(1, Ordering::SeqCst);
        self.tasks.spawn(async move {
            Self::process_notifications(peripheral, uuid, stream, cancel, sink).await;
            live.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// True once `characteristic` has been subscribed on this connection
    pub fn is_relaying(&self, characteristic: &Uuid) -> bool {
        self.relayed.contains(characteristic)
    }

    /// Number of subscriptions whose stream is still open
    pub fn active(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Process deliveries of one subscription, in arrival order
    async fn process_notifications(
        peripheral: String,
        characteristic: Uuid,
        mut stream: NotificationStream,
        cancel: CancellationToken,
        sink: Option<mpsc::UnboundedSender<Notification>>,
    ) {
        loop {
            // Buffered deliveries go out before a pending cancellation is honoured.
            let item = tokio::select! {
                biased;
                item = stream.next() => item,
                _ = cancel.cancelled() => break,
            };

            let value = match item {
                Some(Ok(value)) => {
                    info!("notified: {} from {}", format_value(&value), characteristic);
                    Ok(value)
                }
                Some(Err(e)) => {
                    // A failed delivery does not end the subscription.
                    warn!("Notification error on {}: {}", characteristic, e);
                    Err(e)
                }
                None => break,
            };

            if let Some(sink) = &sink {
                let notification = Notification {
                    peripheral: peripheral.clone(),
                    characteristic,
                    value,
                };
                if sink.send(notification).is_err() {
                    debug!("Notification sink closed, dropping delivery");
                }
            }
        }

        debug!("Notification stream for {} ended", characteristic);
    }

    /// Ends every subscription and waits for the relay tasks to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!("Notification task finished abnormally: {}", e);
            }
        }
    }
}
