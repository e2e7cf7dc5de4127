//! Serial transport abstraction.
//!
//! The bootloader state machine never touches the `serialport` crate
//! directly; it goes through the small [`Transport`] trait here, the same
//! split `Port`/`SerialPort` drew between protocol and I/O. Production code
//! uses [`SerialTransport`]; tests substitute an in-memory fake so the
//! framer, handshake and orchestrator are exercised without hardware.

use std::io::{Read, Write};
use std::time::Duration;

use log::trace;

use crate::error::Result;

/// Line parameters the AN-724 bootloader expects (8 data bits, no parity,
/// one stop bit, no flow control) are fixed; callers only choose the port
/// name, baud rate and read timeout.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g. `/dev/ttyUSB0`, `COM6`).
    pub port_name: String,
    /// Baud rate. The bootloader defaults to 115200.
    pub baud_rate: u32,
    /// Per-read timeout. The bootloader's response bytes arrive quickly; a
    /// short timeout (10 ms by default) lets the framer and handshake poll
    /// without blocking indefinitely.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(10),
        }
    }
}

impl SerialConfig {
    /// Create a configuration for the given port and baud rate.
    #[must_use]
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Override the per-read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Abstracts the serial link so protocol code is testable without hardware.
pub trait Transport: Read + Write + Send {
    /// Change the per-read timeout.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Current per-read timeout.
    fn read_timeout(&self) -> Duration;

    /// Baud rate the transport was opened with.
    fn baud_rate(&self) -> u32;

    /// Port name/path, for error messages and logs.
    fn name(&self) -> &str;

    /// Close the transport. Idempotent: closing twice is not an error.
    fn close(&mut self) -> Result<()>;

    /// Discard any bytes currently waiting to be read, without blocking for
    /// more. Used before every command frame so a stale response from an
    /// earlier aborted attempt can't be misread as the answer to the next
    /// command.
    fn drain_input(&mut self) -> Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match self.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(e) if is_timeout(&e) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Whether `e` is the "no data within the read timeout" case every caller
/// that polls a short-timeout read (the packet framer, the handshake loop,
/// `drain_input` above) must treat as "keep waiting," not as a hard failure.
pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

/// Native serial transport backed by the `serialport` crate.
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    read_timeout: Duration,
    baud_rate: u32,
}

impl SerialTransport {
    /// Open the port with the line parameters the bootloader requires.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        trace!(
            "opening {} at {} baud (timeout {:?})",
            config.port_name, config.baud_rate, config.read_timeout
        );
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            read_timeout: config.read_timeout,
            baud_rate: config.baud_rate,
        })
    }
}

impl Transport for SerialTransport {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(p) = self.port.as_mut() {
            p.set_timeout(timeout)?;
        }
        self.read_timeout = timeout;
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the boxed port closes the underlying handle. Taking an
        // already-`None` option is a harmless no-op, so `close` is idempotent.
        self.port.take();
        Ok(())
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(|p| p.read(buf))
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
            .and_then(std::io::Write::flush)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;

    #[test]
    fn drain_input_consumes_pending_bytes() {
        let mut t = FakeTransport::new();
        t.push_stale(&[1, 2, 3]);
        t.drain_input().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn drain_input_does_not_consume_a_not_yet_arrived_response() {
        let mut t = FakeTransport::new();
        t.push_response(&[0x06]);
        t.drain_input().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x06);
    }

    #[test]
    fn serial_config_defaults_match_the_bootloader() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.read_timeout, Duration::from_millis(10));
    }
}
