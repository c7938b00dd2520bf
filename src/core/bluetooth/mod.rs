//! Bluetooth central session
//! This module handles adapter state, peripheral selection, connecting,
//! enumerating the GATT hierarchy and relaying notifications.

mod backend;
mod completion;
mod connection;
mod constants;
mod enumerator;
mod filter;
mod monitor;
mod notification;
mod scanner;
mod session;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use backend::BluestTransport;
pub use completion::{CompletionSignal, CompletionWaiter, SessionOutcome, completion};
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionReport, PassMode};
pub use constants::*; // Re-export all constants
pub use enumerator::{GattEnumerator, PassReport};
pub use filter::PeripheralFilter;
pub use monitor::AdapterMonitor;
pub use notification::NotificationRelay;
pub use session::Session;
pub use transport::{NotificationStream, Transport, TransportEvent};
pub use types::{
    AdapterState, Advertisement, Attribute, AttributeHandle, CharProperties, Characteristic,
    ConnectionState, Descriptor, Notification, Peripheral, Service,
};
