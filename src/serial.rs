// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Serial port abstraction
//!
//! The transfer engine never touches a port; the host reads bytes here
//! and feeds them to a session, and writes the session's `SendData`
//! bytes back out.

use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort as SerialPortTrait, StopBits};

use crate::error::TransferError;

/// Baud rates the application accepts.
pub const SUPPORTED_BAUD_RATES: [u32; 12] = [
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Line ending appended to terminal input (terminal setting, carried
/// with the port configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Cr,
    Lf,
    CrLf,
}

/// Full port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub local_echo: bool,
    pub line_ending: LineEnding,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            local_echo: false,
            line_ending: LineEnding::Cr,
        }
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        if !SUPPORTED_BAUD_RATES.contains(&self.baud) {
            return Err(TransferError::UnsupportedBaudRate(self.baud));
        }
        Ok(())
    }
}

/// Modem control line snapshot. DTR and RTS are the last levels written;
/// the rest are read from the port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModemStatus {
    pub dtr: bool,
    pub rts: bool,
    pub cts: bool,
    pub dsr: bool,
    pub dcd: bool,
    pub ri: bool,
}

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Trait for the serial port operations the host needs around a transfer
pub trait SerialPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    fn send_break(&mut self) -> std::io::Result<()>;

    fn set_dtr(&mut self, level: bool) -> std::io::Result<()>;

    fn set_rts(&mut self, level: bool) -> std::io::Result<()>;

    fn modem_status(&mut self) -> std::io::Result<ModemStatus>;

    fn flush_input(&mut self) -> std::io::Result<()>;

    fn flush_output(&mut self) -> std::io::Result<()>;

    fn bytes_available(&mut self) -> std::io::Result<usize>;

    /// True when at least one byte is readable before the timeout runs
    /// out.
    fn wait_for_data(&mut self, timeout: Duration) -> std::io::Result<bool>;
}

/// Lists the system's serial ports by name.
pub fn enumerate_ports(mut callback: impl FnMut(&str)) -> Result<(), serialport::Error> {
    for port in serialport::available_ports()? {
        callback(&port.port_name);
    }
    Ok(())
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Real serial port implementation that wraps the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
    dtr: bool,
    rts: bool,
}

impl RealSerialPort {
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<Self, serialport::Error> {
        config.validate().map_err(|e| {
            serialport::Error::new(serialport::ErrorKind::InvalidInput, e.to_string())
        })?;
        let port = serialport::new(port_name, config.baud)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(RealSerialPort {
            port,
            dtr: false,
            rts: false,
        })
    }
}

fn to_io_error(e: serialport::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.port.set_timeout(timeout).map_err(to_io_error)?;
        self.port.read(buf)
    }

    fn send_break(&mut self) -> std::io::Result<()> {
        self.port.set_break().map_err(to_io_error)?;
        std::thread::sleep(Duration::from_millis(250));
        self.port.clear_break().map_err(to_io_error)
    }

    fn set_dtr(&mut self, level: bool) -> std::io::Result<()> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(to_io_error)?;
        self.dtr = level;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> std::io::Result<()> {
        self.port.write_request_to_send(level).map_err(to_io_error)?;
        self.rts = level;
        Ok(())
    }

    fn modem_status(&mut self) -> std::io::Result<ModemStatus> {
        Ok(ModemStatus {
            dtr: self.dtr,
            rts: self.rts,
            cts: self.port.read_clear_to_send().map_err(to_io_error)?,
            dsr: self.port.read_data_set_ready().map_err(to_io_error)?,
            dcd: self.port.read_carrier_detect().map_err(to_io_error)?,
            ri: self.port.read_ring_indicator().map_err(to_io_error)?,
        })
    }

    fn flush_input(&mut self) -> std::io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(to_io_error)
    }

    fn flush_output(&mut self) -> std::io::Result<()> {
        self.port.clear(ClearBuffer::Output).map_err(to_io_error)
    }

    fn bytes_available(&mut self) -> std::io::Result<usize> {
        Ok(self.port.bytes_to_read().map_err(to_io_error)? as usize)
    }

    fn wait_for_data(&mut self, timeout: Duration) -> std::io::Result<bool> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.bytes_available()? > 0 {
                return Ok(true);
            }
            if std::time::Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
pub struct MockSerialPort {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    dtr: bool,
    rts: bool,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
            dtr: false,
            rts: false,
        }
    }
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        // Out of responses = timeout
        if self.read_pos >= self.read_buffer.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Mock timeout",
            ));
        }

        // If current response is None = timeout
        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Mock timeout",
            ));
        }

        let mut bytes_read = 0;
        while bytes_read < buf.len() && self.read_pos < self.read_buffer.len() {
            match self.read_buffer[self.read_pos] {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                    self.read_pos += 1;
                }
                None => break, // Stop at timeout marker
            }
        }

        Ok(bytes_read)
    }

    fn send_break(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> std::io::Result<()> {
        self.dtr = level;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> std::io::Result<()> {
        self.rts = level;
        Ok(())
    }

    fn modem_status(&mut self) -> std::io::Result<ModemStatus> {
        Ok(ModemStatus {
            dtr: self.dtr,
            rts: self.rts,
            cts: true,
            dsr: true,
            dcd: false,
            ri: false,
        })
    }

    fn flush_input(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn flush_output(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn bytes_available(&mut self) -> std::io::Result<usize> {
        Ok(self.read_buffer.len() - self.read_pos)
    }

    fn wait_for_data(&mut self, _timeout: Duration) -> std::io::Result<bool> {
        if self.read_pos >= self.read_buffer.len() {
            return Ok(false);
        }
        // A timeout marker burns one wait, like a quiet poll interval
        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log, &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud, 115200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
        assert!(!config.local_echo);
        assert_eq!(config.line_ending, LineEnding::Cr);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_odd_baud() {
        let config = SerialConfig {
            baud: 31250,
            ..SerialConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(TransferError::UnsupportedBaudRate(31250))
        );
    }

    #[test]
    fn test_mock_round() {
        let mut mock = MockSerialPort::new(vec![Some(0x41), Some(0x42)], vec![0x43]);
        assert!(mock.wait_for_data(Duration::from_millis(1)).unwrap());
        let mut buf = [0u8; 8];
        let n = mock.read_timeout(&mut buf, Duration::from_millis(1)).unwrap();
        assert_eq!(&buf[..n], b"AB");
        mock.write_all(&[0x43]).unwrap();

        mock.set_dtr(true).unwrap();
        let status = mock.modem_status().unwrap();
        assert!(status.dtr);
        assert!(!status.rts);
    }
}
