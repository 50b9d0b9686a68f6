//! Modbus RTU protocol engine for serial control links
//!
//! This library implements both ends of a Modbus RTU link: a master that runs
//! blocking request/response transactions against one slave address, and a
//! slave device that answers requests from its own register tables. The byte
//! link itself is injected through the [`transport::Transport`] trait, with a
//! `serialport` implementation for real hardware and an in-memory one for tests.

pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use modbus::{ExceptionCode, FunctionCode, ModbusMaster, RegisterStore, SlaveDevice};
pub use output::{ConsoleFormatter, CsvFormatter, DataFormatter, DataSender, JsonFormatter, RegisterReading};
pub use transport::{MemoryTransport, SerialTransport, Transport};
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
