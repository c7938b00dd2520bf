//! BLE GATT explorer library
//! Scans for a peripheral, connects, walks its whole GATT hierarchy and logs what it finds.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;
