//! Serial Port
//!
//! Production `LinkOpener` backed by the `serialport` crate. The port is
//! opened with a short read timeout so that a read can never stall a tick
//! for longer than that, and reads are only issued for bytes the driver
//! already reports as pending.

use super::{discover, LinkError, LinkOpener, RawLink};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read};
use std::time::Duration;

/// Default data rate on the serial port.
pub const DEFAULT_BAUD: u32 = 9600;

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens a serial port by name, or by auto-detection if no name is given.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    port: Option<String>,
    baud: u32,
    read_timeout: Duration,
}

impl SerialOpener {
    pub fn new(port: Option<String>, baud: u32, read_timeout: Duration) -> SerialOpener {
        SerialOpener {
            port,
            baud,
            read_timeout,
        }
    }
}

impl LinkOpener for SerialOpener {
    type Link = SerialLink;

    fn open(&mut self) -> Result<SerialLink, LinkError> {
        let name = match &self.port {
            Some(name) => name.clone(),
            None => discover::auto_detect()?,
        };
        let port = serialport::new(&name, self.baud)
            .timeout(self.read_timeout)
            .open()
            .map_err(|source| LinkError::Open {
                port: name.clone(),
                source,
            })?;
        // Whatever the driver buffered before we opened is stale, and
        // usually starts mid-line.
        if let Err(e) = port.clear(ClearBuffer::Input) {
            tracing::debug!("could not clear input buffer on {}: {}", name, e);
        }
        Ok(SerialLink { name, port })
    }

    fn describe(&self) -> String {
        let name = self.port.as_deref().unwrap_or("auto");
        format!("{} @ {} baud", name, self.baud)
    }
}

/// An open serial port.
pub struct SerialLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl RawLink for SerialLink {
    fn bytes_pending(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}
