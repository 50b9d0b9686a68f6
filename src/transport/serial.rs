use log::{error, info, trace};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use super::Transport;
use crate::config::settings::{ParityConfig, SerialConfig, StopBitsConfig};
use crate::utils::error::ModbusError;

/// RS-485/RS-232 link backed by the `serialport` crate.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        info!("🔌 Opening Modbus RTU port: {}", config.port);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, {:?} parity, {:?} stop bits",
            config.baud_rate, config.parity, config.stop_bits
        );

        let parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let stop_bits = match config.stop_bits {
            StopBitsConfig::One => serialport::StopBits::One,
            StopBitsConfig::Two => serialport::StopBits::Two,
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(stop_bits)
            .parity(parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.port, e);
                ModbusError::CommunicationError(format!("Failed to open port {}: {}", config.port, e))
            })?;

        info!("Modbus RTU port {} ready", config.port);
        Ok(Self {
            port,
            port_name: config.port.clone(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Names of the serial ports the OS reports.
    pub fn available_ports() -> Result<Vec<String>, ModbusError> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|p| p.port_name)
            .collect())
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        trace!("{} >> {}", self.port_name, hex::encode(frame));
        self.port
            .write_all(frame)
            .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))?;
        self.port
            .flush()
            .map_err(|e| ModbusError::CommunicationError(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = pending.min(buf.len());
        let n = self
            .port
            .read(&mut buf[..want])
            .map_err(|e| ModbusError::CommunicationError(format!("Read failed: {}", e)))?;
        trace!("{} << {}", self.port_name, hex::encode(&buf[..n]));
        Ok(n)
    }

    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}
