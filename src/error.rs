//! Error types for the explorer.
//!
//! [`TransportError`] is what the radio layer reports for a single operation.
//! [`SessionError`] is reserved for failures that end the session.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// A failure reported by the transport for one operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no usable Bluetooth adapter: {0}")]
    AdapterUnavailable(String),

    #[error("unknown peripheral {0}")]
    UnknownPeripheral(String),

    #[error("unknown attribute handle {0}")]
    UnknownHandle(u64),

    #[error("peripheral is not connected")]
    NotConnected,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("{0}")]
    Backend(String),
}

/// A failure that aborts the whole session or connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("failed to open adapter: {0}")]
    AdapterOpen(#[source] TransportError),

    #[error("failed to connect to {peripheral}: {source}")]
    Connect {
        peripheral: String,
        source: TransportError,
    },

    #[error("failed to discover services: {0}")]
    ServiceDiscovery(#[source] TransportError),

    #[error("peripheral disconnected during {0}")]
    Disconnected(Operation),

    #[error("session interrupted")]
    Interrupted,
}

/// GATT operations issued by the enumerator, used to give failures context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SetMtu,
    DiscoverServices,
    DiscoverCharacteristics,
    ReadCharacteristic,
    DiscoverDescriptors,
    ReadDescriptor,
    Subscribe,
    Settle,
    Idle,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::SetMtu => "MTU exchange",
            Operation::DiscoverServices => "service discovery",
            Operation::DiscoverCharacteristics => "characteristic discovery",
            Operation::ReadCharacteristic => "characteristic read",
            Operation::DiscoverDescriptors => "descriptor discovery",
            Operation::ReadDescriptor => "descriptor read",
            Operation::Subscribe => "subscribe",
            Operation::Settle => "settle interval",
            Operation::Idle => "idle wait",
        };
        f.write_str(s)
    }
}

/// What a failed attribute operation was aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Peripheral(String),
    Attribute(Uuid),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Peripheral(id) => write!(f, "peripheral {}", id),
            Target::Attribute(uuid) => write!(f, "{}", uuid),
        }
    }
}

/// A recoverable failure: reported, then traversal continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed for {target}: {error}")]
pub struct AttributeFailure {
    pub operation: Operation,
    pub target: Target,
    pub error: TransportError,
}
