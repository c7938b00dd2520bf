//! Core functionality for the BLE GATT explorer

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluestTransport, Session, SessionOutcome};
