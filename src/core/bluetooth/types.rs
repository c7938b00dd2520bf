//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use bitflags::bitflags;
use uuid::Uuid;

use crate::error::TransportError;

/// Operational state of the local radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    /// Only a powered-on adapter may scan
    pub fn permits_scanning(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterState::Unknown => "Unknown",
            AdapterState::Resetting => "Resetting",
            AdapterState::Unsupported => "Unsupported",
            AdapterState::Unauthorized => "Unauthorized",
            AdapterState::PoweredOff => "PoweredOff",
            AdapterState::PoweredOn => "PoweredOn",
        };
        f.write_str(s)
    }
}

/// A remote device seen by the adapter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peripheral {
    /// Platform-specific unique identifier (address on Linux, a UUID on macOS)
    pub id: String,
    /// The name of the device, if available
    pub name: Option<String>,
}

impl Peripheral {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.id, name),
            None => f.write_str(&self.id),
        }
    }
}

/// Connection state of the active peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// One advertising report. Not retained past filter evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: Option<String>,
    /// Raw manufacturer data: company id (little endian) followed by the payload
    pub manufacturer_data: Option<Vec<u8>>,
    pub services: Vec<Uuid>,
    pub tx_power_level: Option<i16>,
    pub is_connectable: bool,
}

/// Opaque token the transport uses to find its native attribute object again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeHandle(pub u64);

impl fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Characteristic property bits as carried in the characteristic declaration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CharProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharProperties {
    pub fn is_readable(&self) -> bool {
        self.contains(CharProperties::READ)
    }

    /// True if the peripheral can push values, by notification or indication
    pub fn is_subscribable(&self) -> bool {
        self.intersects(CharProperties::NOTIFY | CharProperties::INDICATE)
    }
}

impl fmt::Display for CharProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LABELS: [(CharProperties, &str); 8] = [
            (CharProperties::BROADCAST, "broadcast"),
            (CharProperties::READ, "read"),
            (CharProperties::WRITE_WITHOUT_RESPONSE, "writeWithoutResponse"),
            (CharProperties::WRITE, "write"),
            (CharProperties::NOTIFY, "notify"),
            (CharProperties::INDICATE, "indicate"),
            (CharProperties::AUTHENTICATED_SIGNED_WRITES, "authenticatedSignedWrites"),
            (CharProperties::EXTENDED_PROPERTIES, "extendedProperties"),
        ];

        let mut first = true;
        for (flag, label) in LABELS {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(label)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Shape shared by every discovered GATT attribute
pub trait Attribute {
    fn uuid(&self) -> Uuid;
    fn name(&self) -> Option<&str>;

    /// `uuid (name)`, or the bare uuid for unnamed attributes
    fn label(&self) -> String {
        match self.name() {
            Some(name) if !name.is_empty() => format!("{} ({})", self.uuid(), name),
            _ => self.uuid().to_string(),
        }
    }
}

/// A GATT service of the connected peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub handle: AttributeHandle,
    pub uuid: Uuid,
    pub name: Option<String>,
}

/// A characteristic belonging to one [`Service`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub handle: AttributeHandle,
    pub uuid: Uuid,
    pub name: Option<String>,
    pub properties: CharProperties,
}

/// A descriptor belonging to one [`Characteristic`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub handle: AttributeHandle,
    pub uuid: Uuid,
    pub name: Option<String>,
}

macro_rules! impl_attribute {
    ($($ty:ty),*) => {
        $(
            impl Attribute for $ty {
                fn uuid(&self) -> Uuid {
                    self.uuid
                }

                fn name(&self) -> Option<&str> {
                    self.name.as_deref()
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.label())
                }
            }
        )*
    };
}

impl_attribute!(Service, Characteristic, Descriptor);

/// One value pushed by the peripheral for a subscribed characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub peripheral: String,
    pub characteristic: Uuid,
    pub value: Result<Vec<u8>, TransportError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_render_like_the_declaration() {
        let props = CharProperties::READ | CharProperties::NOTIFY;
        assert_eq!(props.to_string(), "read notify");
        assert_eq!(CharProperties::empty().to_string(), "");
    }

    #[test]
    fn capability_checks() {
        assert!(CharProperties::INDICATE.is_subscribable());
        assert!(!CharProperties::WRITE.is_subscribable());
        assert!(!CharProperties::NOTIFY.is_readable());
        assert!((CharProperties::READ | CharProperties::WRITE).is_readable());
    }

    #[test]
    fn attribute_label() {
        let named = Service {
            handle: AttributeHandle(1),
            uuid: Uuid::from_u128(0x180f_0000_1000_8000_00805f9b34fb),
            name: Some("Battery Service".to_string()),
        };
        assert!(named.to_string().ends_with(" (Battery Service)"));

        let bare = Descriptor {
            handle: AttributeHandle(2),
            uuid: Uuid::nil(),
            name: None,
        };
        assert_eq!(bare.label(), Uuid::nil().to_string());
    }

    #[test]
    fn only_powered_on_scans() {
        for state in [
            AdapterState::Unknown,
            AdapterState::Resetting,
            AdapterState::Unsupported,
            AdapterState::Unauthorized,
            AdapterState::PoweredOff,
        ] {
            assert!(!state.permits_scanning());
        }
        assert!(AdapterState::PoweredOn.permits_scanning());
    }
}
