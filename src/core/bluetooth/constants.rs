//! Constants used throughout the explorer
//! This module contains the Bluetooth SIG assigned numbers we know by name,
//! and the timing defaults of a session.

use uuid::Uuid;

/// Settle interval after a full hierarchy pass, in milliseconds
pub const DEFAULT_SETTLE_INTERVAL_MS: u64 = 5000;

/// Suffix shared by every 16-bit SIG alias once expanded to 128 bits
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expands a 16-bit SIG alias into a full UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = uuid_from_u16(0x1800);
pub const UUID_GENERIC_ATTRIBUTE_SERVICE: Uuid = uuid_from_u16(0x1801);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = uuid_from_u16(0x180a);
pub const UUID_HEART_RATE_SERVICE: Uuid = uuid_from_u16(0x180d);
pub const UUID_BATTERY_SERVICE: Uuid = uuid_from_u16(0x180f);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = uuid_from_u16(0x2a00);
pub const UUID_APPEARANCE: Uuid = uuid_from_u16(0x2a01);
pub const UUID_SERVICE_CHANGED: Uuid = uuid_from_u16(0x2a05);
pub const UUID_BATTERY_LEVEL: Uuid = uuid_from_u16(0x2a19);
pub const UUID_MODEL_NUMBER: Uuid = uuid_from_u16(0x2a24);
pub const UUID_SERIAL_NUMBER: Uuid = uuid_from_u16(0x2a25);
pub const UUID_FIRMWARE_REVISION: Uuid = uuid_from_u16(0x2a26);
pub const UUID_HARDWARE_REVISION: Uuid = uuid_from_u16(0x2a27);
pub const UUID_SOFTWARE_REVISION: Uuid = uuid_from_u16(0x2a28);
pub const UUID_MANUFACTURER_NAME: Uuid = uuid_from_u16(0x2a29);
pub const UUID_HEART_RATE_MEASUREMENT: Uuid = uuid_from_u16(0x2a37);

/// Standard Bluetooth Descriptor UUIDs
pub const UUID_CHARACTERISTIC_EXTENDED_PROPERTIES: Uuid = uuid_from_u16(0x2900);
pub const UUID_CHARACTERISTIC_USER_DESCRIPTION: Uuid = uuid_from_u16(0x2901);
pub const UUID_CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = uuid_from_u16(0x2902);
pub const UUID_SERVER_CHARACTERISTIC_CONFIGURATION: Uuid = uuid_from_u16(0x2903);
pub const UUID_CHARACTERISTIC_PRESENTATION_FORMAT: Uuid = uuid_from_u16(0x2904);

const KNOWN_NAMES: &[(Uuid, &str)] = &[
    (UUID_GENERIC_ACCESS_SERVICE, "Generic Access"),
    (UUID_GENERIC_ATTRIBUTE_SERVICE, "Generic Attribute"),
    (UUID_DEVICE_INFORMATION_SERVICE, "Device Information"),
    (UUID_HEART_RATE_SERVICE, "Heart Rate"),
    (UUID_BATTERY_SERVICE, "Battery Service"),
    (UUID_DEVICE_NAME, "Device Name"),
    (UUID_APPEARANCE, "Appearance"),
    (UUID_SERVICE_CHANGED, "Service Changed"),
    (UUID_BATTERY_LEVEL, "Battery Level"),
    (UUID_MODEL_NUMBER, "Model Number String"),
    (UUID_SERIAL_NUMBER, "Serial Number String"),
    (UUID_FIRMWARE_REVISION, "Firmware Revision String"),
    (UUID_HARDWARE_REVISION, "Hardware Revision String"),
    (UUID_SOFTWARE_REVISION, "Software Revision String"),
    (UUID_MANUFACTURER_NAME, "Manufacturer Name String"),
    (UUID_HEART_RATE_MEASUREMENT, "Heart Rate Measurement"),
    (UUID_CHARACTERISTIC_EXTENDED_PROPERTIES, "Characteristic Extended Properties"),
    (UUID_CHARACTERISTIC_USER_DESCRIPTION, "Characteristic User Description"),
    (UUID_CLIENT_CHARACTERISTIC_CONFIGURATION, "Client Characteristic Configuration"),
    (UUID_SERVER_CHARACTERISTIC_CONFIGURATION, "Server Characteristic Configuration"),
    (UUID_CHARACTERISTIC_PRESENTATION_FORMAT, "Characteristic Presentation Format"),
];

/// Looks up the SIG-assigned name of a well-known service, characteristic or descriptor
pub fn known_name(uuid: &Uuid) -> Option<&'static str> {
    KNOWN_NAMES
        .iter()
        .find(|(known, _)| known == uuid)
        .map(|(_, name)| *name)
}
