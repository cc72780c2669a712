use log::{debug, info};
use serde::Serialize;
use serialport::SerialPortType;
use std::time::Duration;

use crate::utils::error::CondensateError;

#[derive(Debug, Clone, Serialize)]
pub struct PortDescription {
    pub name: String,
    pub kind: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

pub fn available_ports() -> Result<Vec<PortDescription>, CondensateError> {
    let ports = serialport::available_ports()?;
    info!("🔍 Found {} serial port(s)", ports.len());

    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(usb) => PortDescription {
                name: p.port_name,
                kind: format!("USB {:04x}:{:04x}", usb.vid, usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            other => PortDescription {
                name: p.port_name,
                kind: match other {
                    SerialPortType::PciPort => "PCI".to_string(),
                    SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    _ => "Unknown".to_string(),
                },
                manufacturer: None,
                product: None,
                serial_number: None,
            },
        })
        .collect())
}

/// Opens and immediately closes the port.
pub fn probe(port_name: &str, baud_rate: u32) -> bool {
    match serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open()
    {
        Ok(_) => true,
        Err(e) => {
            debug!("Port {} unavailable: {}", port_name, e);
            false
        }
    }
}
