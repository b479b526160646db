//! Serial side of the bridge, reached through a USB-UART adapter.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

/// Find a USB-UART adapter (ttyUSB first, then ttyACM).
pub fn find_uart_port() -> Result<String> {
    let ports = serialport::available_ports()?;

    for pattern in ["ttyUSB", "ttyACM"] {
        if let Some(port) = ports.iter().find(|p| p.port_name.contains(pattern)) {
            return Ok(port.port_name.clone());
        }
    }

    anyhow::bail!("No USB-UART adapter found - ensure it is wired to the bridge UART")
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg == "auto" {
        find_uart_port()
    } else {
        Ok(port_arg.to_string())
    }
}

/// Client for the UART the bridge is attached to.
pub struct SerialClient {
    port: Box<dyn SerialPort>,
}

impl SerialClient {
    /// Open the adapter.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self { port })
    }

    /// Send bytes towards the bridge.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    /// Drain all pending data from the serial port.
    /// Reads until no more data is available (with a short timeout).
    pub fn drain_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;

        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Read exactly `len` bytes or fail after `timeout`.
    pub fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let data = self.read_for(len, timeout)?;
        if data.len() < len {
            anyhow::bail!(
                "Timeout waiting for {} bytes, got {}: {:02x?}",
                len,
                data.len(),
                data
            );
        }
        Ok(data)
    }

    /// Collect whatever arrives within `window`.
    pub fn read_window(&mut self, window: Duration) -> Result<Vec<u8>> {
        self.read_for(usize::MAX, window)
    }

    fn read_for(&mut self, limit: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = [0u8; 64];
        let start = Instant::now();

        while data.len() < limit && start.elapsed() < timeout {
            match self.port.read(&mut buf) {
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(data)
    }
}
