use log::{debug, error, info};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::utils::error::CondensateError;

const MAX_LINE_BYTES: usize = 1024;

/// Blocking, line-oriented transport to a meter.
pub trait LineSource: Send + Sync {
    /// Writes `command` if given, then reads up to one `\n`-terminated line.
    /// Returns `Ok(None)` when the read times out with nothing received.
    fn request_line(&self, command: Option<&[u8]>) -> Result<Option<String>, CondensateError>;

    fn describe(&self) -> String;
}

pub struct SerialLineSource {
    port_name: String,
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl SerialLineSource {
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, CondensateError> {
        info!("🔌 Opening serial port: {}", port_name);
        info!("⚙️  Configuration: {} baud, 8 data bits, no parity, 1 stop bit", baud_rate);

        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", port_name, e);
                CondensateError::SerialError(format!("Failed to open port {}: {}", port_name, e))
            })?;

        info!("✅ Serial port {} ready", port_name);
        Ok(Self {
            port_name: port_name.to_string(),
            port: Arc::new(Mutex::new(port)),
        })
    }
}

impl LineSource for SerialLineSource {
    fn request_line(&self, command: Option<&[u8]>) -> Result<Option<String>, CondensateError> {
        let mut port = self.port.lock().map_err(|_| CondensateError::LockError)?;

        if let Some(cmd) = command {
            debug!("📤 Command: {}", hex::encode(cmd));
            port.write_all(cmd)
                .map_err(|e| CondensateError::SerialError(format!("Write failed: {}", e)))?;
            port.flush()
                .map_err(|e| CondensateError::SerialError(format!("Flush failed: {}", e)))?;
        }

        let line = read_line(port.as_mut())?;
        if let Some(raw) = &line {
            debug!("📥 Raw data: {}", raw.trim_end());
        }
        Ok(line)
    }

    fn describe(&self) -> String {
        self.port_name.clone()
    }
}

/// Reads bytes until `\n`, the size cap, or a timeout. Partial data received
/// before a timeout is still returned.
pub(crate) fn read_line<R: Read + ?Sized>(reader: &mut R) -> Result<Option<String>, CondensateError> {
    let mut buf = Vec::with_capacity(64);
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                buf.push(byte[0]);
                if byte[0] == b'\n' || buf.len() >= MAX_LINE_BYTES {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CondensateError::SerialError(format!("Read failed: {}", e))),
        }
    }

    if buf.is_empty() {
        return Ok(None);
    }
    debug!("📥 {} bytes: {}", buf.len(), hex::encode(&buf));
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct TimesOutAfter<'a> {
        data: &'a [u8],
    }

    impl Read for TimesOutAfter<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(io::Error::new(ErrorKind::TimedOut, "timed out"));
            }
            let n = buf.len().min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn stops_at_newline() {
        let mut src = TimesOutAfter { data: b"1413 uS/cm 25.0C\r\nnext" };
        assert_eq!(read_line(&mut src).unwrap().as_deref(), Some("1413 uS/cm 25.0C\r\n"));
    }

    #[test]
    fn timeout_without_data_is_none() {
        let mut src = TimesOutAfter { data: b"" };
        assert_eq!(read_line(&mut src).unwrap(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut src = TimesOutAfter { data: b"12.5 mS/cm \xff\n" };
        let line = read_line(&mut src).unwrap().unwrap();
        assert!(line.starts_with("12.5 mS/cm"));
        assert!(line.contains('\u{fffd}'));
    }
}
