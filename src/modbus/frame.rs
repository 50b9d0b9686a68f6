//! RTU frame codec: `[address][function][payload..][crc_lo][crc_hi]`.

use bytes::{BufMut, Bytes, BytesMut};

use super::crc::crc16_modbus;
use super::protocol::{ExceptionCode, EXCEPTION_BIT, FRAME_OVERHEAD, MAX_PAYLOAD_LEN};
use crate::utils::error::ModbusError;

/// A decoded frame borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub address: u8,
    pub function: u8,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn is_exception(&self) -> bool {
        self.function & EXCEPTION_BIT != 0
    }

    /// Function code with the exception bit cleared.
    pub fn base_function(&self) -> u8 {
        self.function & !EXCEPTION_BIT
    }

    /// Exception code of an exception frame. `None` for a normal frame and
    /// for an exception frame that carries no code.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        if !self.is_exception() {
            return None;
        }
        self.payload.first().copied().map(ExceptionCode::from)
    }
}

pub fn encode(address: u8, function: u8, payload: &[u8]) -> Result<Bytes, ModbusError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ModbusError::InvalidData(format!(
            "payload of {} bytes exceeds the {} byte frame limit",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.put_u8(address);
    buf.put_u8(function);
    buf.put_slice(payload);
    let crc = crc16_modbus(&buf);
    buf.put_u16_le(crc);
    Ok(buf.freeze())
}

pub fn exception(address: u8, function: u8, code: ExceptionCode) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + 1);
    buf.put_u8(address);
    buf.put_u8(function | EXCEPTION_BIT);
    buf.put_u8(code.into());
    let crc = crc16_modbus(&buf);
    buf.put_u16_le(crc);
    buf.freeze()
}

pub fn decode(bytes: &[u8]) -> Result<Frame<'_>, ModbusError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(ModbusError::InvalidData(format!(
            "frame of {} bytes is shorter than the {} byte minimum",
            bytes.len(),
            FRAME_OVERHEAD
        )));
    }

    let (body, crc_bytes) = bytes.split_at(bytes.len() - 2);
    let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    if crc16_modbus(body) != received {
        return Err(ModbusError::CrcMismatch);
    }

    Ok(Frame {
        address: body[0],
        function: body[1],
        payload: &body[2..],
    })
}
