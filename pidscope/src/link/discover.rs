//! Serial port discovery
//!
//! Used when no port is configured: the controller boards enumerate as a
//! USB serial adapter, and if exactly one is plugged in it is the one to use.

use super::LinkError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterKind {
    Ftdi,
    Ch340,
    Cp210x,
    Arduino,
    Unknown(u16, u16),
}

impl AdapterKind {
    fn from_ids(vid: u16, pid: u16) -> AdapterKind {
        match vid {
            0x0403 => AdapterKind::Ftdi,
            0x1a86 => AdapterKind::Ch340,
            0x10c4 => AdapterKind::Cp210x,
            0x2341 | 0x2a03 => AdapterKind::Arduino,
            _ => AdapterKind::Unknown(vid, pid),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AdapterKind::Unknown(..))
    }
}

#[derive(Debug, Clone)]
pub struct SerialDevice {
    pub name: String,
    pub kind: AdapterKind,
    pub description: Option<String>,
}

/// Lists USB serial ports. Unless `all` is set, adapters with unrecognized
/// vendor ids are left out.
pub fn enum_devices(all: bool) -> Result<Vec<SerialDevice>, LinkError> {
    let mut devices = Vec::new();

    let avail_ports = serialport::available_ports().map_err(LinkError::Enumeration)?;

    for p in avail_ports {
        if let serialport::SerialPortType::UsbPort(info) = &p.port_type {
            let kind = AdapterKind::from_ids(info.vid, info.pid);
            if !all && !kind.is_known() {
                continue;
            }
            #[cfg(target_os = "macos")]
            if p.port_name.starts_with("/dev/tty.") && !all {
                continue;
            }
            devices.push(SerialDevice {
                name: p.port_name.clone(),
                kind,
                description: info.product.clone(),
            });
        } // bluetooth, pci and unknown ports are never controllers
    }

    Ok(devices)
}

/// Returns the name of the only recognized serial adapter.
pub fn auto_detect() -> Result<String, LinkError> {
    let devices = enum_devices(false)?;
    match devices.len() {
        0 => Err(LinkError::NoAdapter),
        1 => Ok(devices[0].name.clone()),
        n => Err(LinkError::MultipleAdapters(n)),
    }
}
