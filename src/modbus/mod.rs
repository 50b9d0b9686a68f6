pub mod crc;
pub mod frame;
pub mod framer;
pub mod master;
pub mod protocol;
pub mod registers;
pub mod slave;

pub use crc::crc16_modbus;
pub use frame::Frame;
pub use framer::{receive_frame, ReceiveOptions};
pub use master::ModbusMaster;
pub use protocol::{ExceptionCode, FunctionCode};
pub use registers::RegisterStore;
pub use slave::{SlaveDevice, SlaveStats};
