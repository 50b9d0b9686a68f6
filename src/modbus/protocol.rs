use std::fmt;
use std::time::Duration;

pub const MAX_HOLDING_REGISTERS: usize = 125;
pub const MAX_INPUT_REGISTERS: usize = 125;
pub const MAX_COILS: usize = 2000;
pub const MAX_DISCRETE_INPUTS: usize = 2000;

/// Largest register count a single read or write may carry.
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Longest text accepted by the string transfer operations.
pub const MAX_STRING_LEN: usize = 30;

/// Registers written by `send_string`, regardless of text length.
pub const STRING_REGISTER_COUNT: usize = 15;

/// Address, function code and CRC.
pub const FRAME_OVERHEAD: usize = 4;

/// Largest frame either role builds or accepts: a 125 register write is
/// 7 header bytes, 250 data bytes and the CRC.
pub const MAX_FRAME_LEN: usize = 7 + 2 * MAX_REGISTERS_PER_REQUEST as usize + 2;

pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FRAME_OVERHEAD;

pub const EXCEPTION_BIT: u8 = 0x80;

/// Inter-frame silence for baud rates above 19200.
const FIXED_GAP_MICROS: u64 = 1750;
/// 3.5 characters of 11 bits (start, 8 data, parity or second stop, stop).
const GAP_BITS_X10: u64 = 385;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
    /// Non-standard string transfer.
    StringTransfer,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadCoils => 0x01,
            FunctionCode::ReadDiscreteInputs => 0x02,
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleCoils => 0x0F,
            FunctionCode::WriteMultipleRegisters => 0x10,
            FunctionCode::StringTransfer => 0x16,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(FunctionCode::ReadCoils),
            0x02 => Some(FunctionCode::ReadDiscreteInputs),
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x05 => Some(FunctionCode::WriteSingleCoil),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x0F => Some(FunctionCode::WriteMultipleCoils),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            0x16 => Some(FunctionCode::StringTransfer),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:02X})", self, self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    Other(u8),
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            other => ExceptionCode::Other(other),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(code: ExceptionCode) -> Self {
        match code {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::Other(other) => other,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionCode::IllegalFunction => write!(f, "illegal function (0x01)"),
            ExceptionCode::IllegalDataAddress => write!(f, "illegal data address (0x02)"),
            ExceptionCode::IllegalDataValue => write!(f, "illegal data value (0x03)"),
            ExceptionCode::Other(code) => write!(f, "exception 0x{:02X}", code),
        }
    }
}

/// Minimum bus silence that delimits two RTU frames at `baud_rate`.
///
/// Rounded up to the next microsecond.
pub fn inter_frame_gap(baud_rate: u32) -> Duration {
    if baud_rate == 0 || baud_rate > 19_200 {
        return Duration::from_micros(FIXED_GAP_MICROS);
    }
    let micros = (GAP_BITS_X10 * 100_000).div_ceil(baud_rate as u64);
    Duration::from_micros(micros)
}
