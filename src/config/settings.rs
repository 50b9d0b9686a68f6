use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::modbus::framer::ReceiveOptions;
use crate::modbus::protocol::{inter_frame_gap, MAX_HOLDING_REGISTERS};
use crate::modbus::slave::SlaveDevice;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub master: MasterConfig,
    pub slave: SlaveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub stop_bits: StopBitsConfig,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub slave_address: u8,
    pub timeout_ms: u32,
    pub poll_interval_ms: u64,
    /// Wait for 3.5 character times of silence before treating a response as complete.
    pub inter_frame_gap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    pub address: u8,
    pub idle_timeout_ms: u64,
    pub preset: Vec<RegisterPreset>,
}

/// Holding register values loaded into the slave at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPreset {
    pub start: u16,
    pub values: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBitsConfig {
    One,
    Two,
}

fn default_port() -> &'static str {
    if cfg!(target_os = "linux") {
        "/dev/ttyUSB0"
    } else if cfg!(target_os = "windows") {
        "COM1"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbserial-0001"
    } else {
        "/dev/ttyS0"
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
            stop_bits: StopBitsConfig::One,
            read_timeout_ms: 100,
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            slave_address: 1,
            timeout_ms: 1000,
            poll_interval_ms: 1,
            inter_frame_gap: true,
        }
    }
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            address: 1,
            idle_timeout_ms: 500,
            preset: Vec::new(),
        }
    }
}

impl Config {
    /// Applies command line overrides on top of the loaded or default configuration.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(port) = matches.get_one::<String>("port") {
            self.serial.port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baud") {
            self.serial.baud_rate = baud.parse()?;
        }
        if let Some(slave) = matches.get_one::<String>("slave") {
            let address: u8 = slave.parse()?;
            self.master.slave_address = address;
            self.slave.address = address;
        }
        if let Some(timeout) = matches.get_one::<String>("timeout") {
            self.master.timeout_ms = timeout.parse()?;
        }
        debug!("Effective configuration: {:?}", self);
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("📄 Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if !(1..=247).contains(&self.master.slave_address) {
            return Err(ModbusError::ConfigError(format!(
                "master.slave_address {} must be within 1..=247",
                self.master.slave_address
            )));
        }
        if !(1..=247).contains(&self.slave.address) {
            return Err(ModbusError::ConfigError(format!(
                "slave.address {} must be within 1..=247",
                self.slave.address
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(ModbusError::ConfigError("serial.baud_rate must be non-zero".to_string()));
        }
        if self.master.poll_interval_ms == 0 {
            return Err(ModbusError::ConfigError(
                "master.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        for preset in &self.slave.preset {
            if preset.start as usize + preset.values.len() > MAX_HOLDING_REGISTERS {
                return Err(ModbusError::ConfigError(format!(
                    "preset at {} with {} values overflows the {} holding registers",
                    preset.start,
                    preset.values.len(),
                    MAX_HOLDING_REGISTERS
                )));
            }
        }
        Ok(())
    }

    pub fn master_receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            timeout: Duration::from_millis(self.master.timeout_ms as u64),
            poll_interval: Duration::from_millis(self.master.poll_interval_ms),
            inter_frame_gap: self.frame_gap(self.master.inter_frame_gap),
        }
    }

    /// The slave always delimits requests by bus silence.
    pub fn slave_receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            timeout: Duration::from_millis(self.slave.idle_timeout_ms),
            poll_interval: Duration::from_millis(self.master.poll_interval_ms),
            inter_frame_gap: self.frame_gap(true),
        }
    }

    fn frame_gap(&self, enabled: bool) -> Option<Duration> {
        enabled.then(|| inter_frame_gap(self.serial.baud_rate))
    }

    /// Builds the slave device with its preset holding registers loaded.
    pub fn build_slave(&self) -> Result<SlaveDevice, ModbusError> {
        self.validate()?;
        let mut slave = SlaveDevice::new(self.slave.address);
        for preset in &self.slave.preset {
            let quantity = preset.values.len() as u16;
            let slots = slave
                .registers_mut()
                .holding_registers_mut(preset.start, quantity)
                .ok_or_else(|| ModbusError::ConfigError(format!("preset at {} out of range", preset.start)))?;
            slots.copy_from_slice(&preset.values);
        }
        Ok(slave)
    }
}
