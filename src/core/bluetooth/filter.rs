//! Peripheral filter
//! Picks exactly one peripheral out of the advertisement stream.

use log::{debug, info};

use crate::core::bluetooth::types::{Advertisement, Peripheral};
use crate::utils::format_bytes;

pub struct PeripheralFilter {
    target: Option<String>,
    selected: Option<Peripheral>,
}

impl PeripheralFilter {
    /// `target` is compared case-insensitively against the peripheral id.
    /// Without a target the first advertiser wins.
    pub fn new(target: Option<String>) -> Self {
        Self {
            target: target.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            selected: None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn selected(&self) -> Option<&Peripheral> {
        self.selected.as_ref()
    }

    /// Returns true exactly once, for the first advertisement that matches.
    pub fn evaluate(
        &mut self,
        peripheral: &Peripheral,
        advertisement: &Advertisement,
        rssi: Option<i16>,
    ) -> bool {
        if self.selected.is_some() {
            return false;
        }

        if let Some(target) = &self.target {
            if !peripheral.id.eq_ignore_ascii_case(target) {
                debug!("Ignoring {} (RSSI: {:?})", peripheral.id, rssi);
                return false;
            }
        }

        let name = advertisement
            .local_name
            .as_deref()
            .or(peripheral.name.as_deref())
            .unwrap_or("");
        let manufacturer = advertisement
            .manufacturer_data
            .as_deref()
            .map(format_bytes)
            .unwrap_or_default();
        info!(
            "Device found: {} by {} (ID: {}, RSSI: {:?})",
            name, manufacturer, peripheral.id, rssi
        );

        self.selected = Some(peripheral.clone());
        true
    }
}
