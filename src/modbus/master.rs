use log::{debug, trace, warn};
use std::time::Duration;

use super::frame::{self, Frame};
use super::framer::{receive_frame, ReceiveOptions};
use super::protocol::{
    FunctionCode, MAX_FRAME_LEN, MAX_REGISTERS_PER_REQUEST, MAX_STRING_LEN, STRING_REGISTER_COUNT,
};
use crate::transport::Transport;
use crate::utils::error::ModbusError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Master side of one serial link, talking to one slave address at a time.
///
/// Each call runs a complete request/response exchange before returning.
/// The response buffer is reused between calls, so a master must not be
/// shared between threads without external locking.
pub struct ModbusMaster<T: Transport> {
    slave_address: u8,
    timeout: Duration,
    poll_interval: Duration,
    inter_frame_gap: Option<Duration>,
    transport: T,
    response: [u8; MAX_FRAME_LEN],
}

impl<T: Transport> ModbusMaster<T> {
    pub fn new(slave_address: u8, transport: T) -> Self {
        Self {
            slave_address,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            inter_frame_gap: None,
            transport,
            response: [0; MAX_FRAME_LEN],
        }
    }

    pub fn slave_address(&self) -> u8 {
        self.slave_address
    }

    pub fn set_slave_address(&mut self, address: u8) {
        self.slave_address = address;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn inter_frame_gap(&self) -> Option<Duration> {
        self.inter_frame_gap
    }

    /// With a gap set, a response is only complete after that much bus
    /// silence; without one, the first non-empty read is the response.
    pub fn set_inter_frame_gap(&mut self, gap: Option<Duration>) {
        self.inter_frame_gap = gap;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn transaction(&mut self, function: FunctionCode, payload: &[u8]) -> Result<Frame<'_>, ModbusError> {
        let request = frame::encode(self.slave_address, function.code(), payload)?;
        trace!("master >> {}", hex::encode(&request));
        self.transport.send(&request)?;

        let options = ReceiveOptions {
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            inter_frame_gap: self.inter_frame_gap,
        };
        let len = match receive_frame(&mut self.transport, &mut self.response, &options) {
            Ok(len) => len,
            Err(e) => {
                debug!("No response from slave {} to {}: {}", self.slave_address, function, e);
                return Err(e);
            }
        };
        trace!("master << {}", hex::encode(&self.response[..len]));

        let response = frame::decode(&self.response[..len])?;

        if response.address != self.slave_address {
            return Err(ModbusError::InvalidAddress {
                expected: self.slave_address,
                actual: response.address,
            });
        }

        if response.is_exception() {
            let exception = response.exception_code().ok_or_else(|| {
                ModbusError::InvalidData(format!(
                    "exception response 0x{:02X} carries no exception code",
                    response.function
                ))
            })?;
            warn!("Slave {} rejected {}: {}", self.slave_address, function, exception);
            return Err(ModbusError::SlaveFailure {
                function: response.base_function(),
                exception,
            });
        }

        if response.function != function.code() {
            return Err(ModbusError::InvalidData(format!(
                "expected function 0x{:02X} in response, got 0x{:02X}",
                function.code(),
                response.function
            )));
        }

        Ok(response)
    }

    pub fn read_holding_registers(&mut self, start_addr: u16, quantity: u16) -> Result<Vec<u16>, ModbusError> {
        check_quantity(quantity)?;
        debug!(
            "Reading {} registers from slave {} starting at {}",
            quantity, self.slave_address, start_addr
        );

        let mut request = [0u8; 4];
        request[..2].copy_from_slice(&start_addr.to_be_bytes());
        request[2..].copy_from_slice(&quantity.to_be_bytes());

        let response = self.transaction(FunctionCode::ReadHoldingRegisters, &request)?;
        let expected = quantity as usize * 2;
        let (&byte_count, data) = response
            .payload
            .split_first()
            .ok_or_else(|| ModbusError::InvalidData("empty read response".to_string()))?;

        if byte_count as usize != expected || data.len() < expected {
            return Err(ModbusError::InvalidData(format!(
                "expected {} register bytes, byte count {} with {} bytes present",
                expected,
                byte_count,
                data.len()
            )));
        }

        Ok(data[..expected]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// The slave echoes address and value; the echo is not compared.
    pub fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), ModbusError> {
        debug!("Writing {} to register {} on slave {}", value, addr, self.slave_address);

        let mut request = [0u8; 4];
        request[..2].copy_from_slice(&addr.to_be_bytes());
        request[2..].copy_from_slice(&value.to_be_bytes());

        self.transaction(FunctionCode::WriteSingleRegister, &request)?;
        Ok(())
    }

    pub fn write_multiple_registers(&mut self, start_addr: u16, values: &[u16]) -> Result<(), ModbusError> {
        let quantity = u16::try_from(values.len())
            .map_err(|_| ModbusError::InvalidData(format!("{} registers is too many", values.len())))?;
        check_quantity(quantity)?;
        debug!(
            "Writing {} registers to slave {} starting at {}",
            quantity, self.slave_address, start_addr
        );

        let mut request = Vec::with_capacity(5 + values.len() * 2);
        request.extend_from_slice(&start_addr.to_be_bytes());
        request.extend_from_slice(&quantity.to_be_bytes());
        request.push((quantity * 2) as u8);
        for value in values {
            request.extend_from_slice(&value.to_be_bytes());
        }

        let response = self.transaction(FunctionCode::WriteMultipleRegisters, &request)?;
        let echo = response.payload;
        if echo.len() != 4
            || u16::from_be_bytes([echo[0], echo[1]]) != start_addr
            || u16::from_be_bytes([echo[2], echo[3]]) != quantity
        {
            return Err(ModbusError::InvalidData(format!(
                "write echo {} does not match start {} quantity {}",
                hex::encode(echo),
                start_addr,
                quantity
            )));
        }
        Ok(())
    }

    /// Writes `text` as 15 big-endian registers (two characters each) with
    /// Write Multiple Registers. Unused registers and an odd trailing low
    /// byte are zero.
    pub fn send_string(&mut self, start_addr: u16, text: &str) -> Result<(), ModbusError> {
        let bytes = check_string(text)?;
        let mut registers = [0u16; STRING_REGISTER_COUNT];
        for (register, pair) in registers.iter_mut().zip(bytes.chunks(2)) {
            *register = u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]);
        }
        self.write_multiple_registers(start_addr, &registers)
    }

    /// Sends `text` with the non-standard string transfer function.
    pub fn transfer_string(&mut self, start_addr: u16, text: &str) -> Result<(), ModbusError> {
        let bytes = check_string(text)?;
        let byte_count = bytes.len() as u8;

        let mut request = Vec::with_capacity(3 + bytes.len());
        request.extend_from_slice(&start_addr.to_be_bytes());
        request.push(byte_count);
        request.extend_from_slice(bytes);

        let response = self.transaction(FunctionCode::StringTransfer, &request)?;
        let echo = response.payload;
        if echo.len() != 4
            || u16::from_be_bytes([echo[0], echo[1]]) != start_addr
            || u16::from_be_bytes([echo[2], echo[3]]) != byte_count as u16
        {
            return Err(ModbusError::InvalidData(format!(
                "string transfer echo {} does not match start {} length {}",
                hex::encode(echo),
                start_addr,
                byte_count
            )));
        }
        Ok(())
    }
}

fn check_quantity(quantity: u16) -> Result<(), ModbusError> {
    if quantity == 0 || quantity > MAX_REGISTERS_PER_REQUEST {
        return Err(ModbusError::InvalidData(format!(
            "register quantity {} outside 1..={}",
            quantity, MAX_REGISTERS_PER_REQUEST
        )));
    }
    Ok(())
}

fn check_string(text: &str) -> Result<&[u8], ModbusError> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_STRING_LEN {
        return Err(ModbusError::InvalidData(format!(
            "string of {} bytes exceeds {} byte limit",
            bytes.len(),
            MAX_STRING_LEN
        )));
    }
    Ok(bytes)
}
