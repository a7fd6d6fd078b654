//! Direct raw HID transport for VIA keyboards.
//!
//! A VIA keyboard exposes several HID interfaces; the raw vendor one is
//! selected by usage page `0xFF60` / usage `0x61` on top of the vid/pid
//! match. Connection state is the presence of an open [`hidapi::HidDevice`]
//! handle; any transfer error drops the handle so the next send reconnects.

use std::ffi::CString;
use std::fmt;

use hidapi::{HidApi, HidDevice};
use serde::Serialize;

use crate::channel::DeviceChannel;
use crate::protocol;

/// Milliseconds to wait for a color read response.
const READ_TIMEOUT_MS: i32 = 1000;

// ── Error type ──

/// Raw HID communication errors.
#[derive(Debug)]
pub enum DeviceError {
    /// No interface matches the configured address. Not fatal; the sender
    /// falls back to the delegate channel.
    Unavailable { address: DeviceAddress },
    /// Enumeration, open or transfer failure.
    Io(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unavailable { address } => {
                write!(f, "no matching raw HID interface for {address}")
            }
            DeviceError::Io(e) => write!(f, "device I/O failed: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {}

// ── Address ──

/// Full address of the raw vendor interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceAddress {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (usage {:#06x}/{:#04x})",
            self.vendor_id, self.product_id, self.usage_page, self.usage
        )
    }
}

/// A HID interface found during discovery, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredInterface {
    pub path: String,
    pub usage_page: u16,
    pub usage: u16,
    pub serial: Option<String>,
    /// True when this is the raw vendor interface we would open.
    pub raw_interface: bool,
}

// ── Channel ──

/// Direct VIA channel over raw HID.
pub struct HidChannel {
    address: DeviceAddress,
    api: Option<HidApi>,
    device: Option<HidDevice>,
}

impl HidChannel {
    pub fn new(address: DeviceAddress) -> Self {
        HidChannel {
            address,
            api: None,
            device: None,
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Lazily initialized hidapi context, with a device list refresh on reuse.
    fn api(&mut self) -> Result<&HidApi, DeviceError> {
        if let Some(api) = self.api.as_mut() {
            api.refresh_devices()
                .map_err(|e| DeviceError::Io(format!("device enumeration: {e}")))?;
        } else {
            let api =
                HidApi::new().map_err(|e| DeviceError::Io(format!("hidapi init: {e}")))?;
            self.api = Some(api);
        }
        match self.api.as_ref() {
            Some(api) => Ok(api),
            None => Err(DeviceError::Io("hidapi init: context missing".into())),
        }
    }

    /// Open the raw vendor interface, replacing any previous handle.
    pub fn open(&mut self) -> Result<(), DeviceError> {
        self.device = None;
        let address = self.address;
        let api = self.api()?;

        let path: Option<CString> = api
            .device_list()
            .find(|info| {
                info.vendor_id() == address.vendor_id
                    && info.product_id() == address.product_id
                    && info.usage_page() == address.usage_page
                    && info.usage() == address.usage
            })
            .map(|info| info.path().to_owned());

        let Some(path) = path else {
            return Err(DeviceError::Unavailable { address });
        };
        let device = api
            .open_path(path.as_c_str())
            .map_err(|e| DeviceError::Io(format!("open {address}: {e}")))?;
        self.device = Some(device);
        log::info!("connected to keyboard {address}");
        Ok(())
    }

    /// Check whether the raw vendor interface is currently present, without
    /// opening it.
    pub fn probe(&mut self) -> bool {
        let address = self.address;
        match self.api() {
            Ok(api) => api.device_list().any(|info| {
                info.vendor_id() == address.vendor_id
                    && info.product_id() == address.product_id
                    && info.usage_page() == address.usage_page
                    && info.usage() == address.usage
            }),
            Err(e) => {
                log::warn!("HID probe failed: {e}");
                false
            }
        }
    }

    /// List every interface of the configured vid/pid, marking the raw one.
    pub fn discover(&mut self) -> Result<Vec<DiscoveredInterface>, DeviceError> {
        let address = self.address;
        let api = self.api()?;
        Ok(api
            .device_list()
            .filter(|info| {
                info.vendor_id() == address.vendor_id && info.product_id() == address.product_id
            })
            .map(|info| DiscoveredInterface {
                path: info.path().to_string_lossy().into_owned(),
                usage_page: info.usage_page(),
                usage: info.usage(),
                serial: info.serial_number().map(str::to_owned),
                raw_interface: info.usage_page() == address.usage_page
                    && info.usage() == address.usage,
            })
            .collect())
    }

    fn write_report(&mut self, report: &[u8], what: &str) -> bool {
        let Some(device) = self.device.as_ref() else {
            return false;
        };
        match device.write(report) {
            Ok(_) => true,
            Err(e) => {
                log::error!("failed to {what}: {e}");
                self.device = None;
                false
            }
        }
    }
}

impl DeviceChannel for HidChannel {
    fn connect(&mut self) -> bool {
        match self.open() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("direct HID connect failed: {e}");
                false
            }
        }
    }

    fn disconnect(&mut self) {
        if self.device.take().is_some() {
            log::debug!("disconnected from keyboard {}", self.address);
        }
    }

    fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    fn set_color(&mut self, hue: u8, saturation: u8, channel: u8) -> bool {
        let report = protocol::set_color_report(channel, hue, saturation);
        self.write_report(&report, "send color")
    }

    fn get_color(&mut self, channel: u8) -> Option<(u8, u8)> {
        let report = protocol::get_color_report(channel);
        if !self.write_report(&report, "request color") {
            return None;
        }
        let Some(device) = self.device.as_ref() else {
            return None;
        };
        let mut buf = [0u8; protocol::REPORT_SIZE];
        match device.read_timeout(&mut buf, READ_TIMEOUT_MS) {
            Ok(n) => protocol::parse_color_response(&buf[..n]),
            Err(e) => {
                log::error!("failed to read color: {e}");
                self.device = None;
                None
            }
        }
    }

    fn save(&mut self, channel: u8) -> bool {
        let report = protocol::save_report(channel);
        self.write_report(&report, "save to EEPROM")
    }
}
