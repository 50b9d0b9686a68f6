use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};

use super::frame;
use super::framer::{receive_frame, ReceiveOptions};
use super::protocol::{
    ExceptionCode, FunctionCode, MAX_FRAME_LEN, MAX_HOLDING_REGISTERS, MAX_REGISTERS_PER_REQUEST,
    MAX_STRING_LEN,
};
use super::registers::RegisterStore;
use crate::transport::Transport;
use crate::utils::error::ModbusError;

type HandlerResult = Result<Vec<u8>, ExceptionCode>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlaveStats {
    pub frames_received: u64,
    pub frames_discarded: u64,
    pub responses_sent: u64,
    pub exceptions_sent: u64,
}

/// A slave device: its bus address and register tables.
///
/// Frames are handled one at a time. Frames that are too short, fail the
/// CRC, or are addressed elsewhere are dropped without a reply.
#[derive(Debug, Clone)]
pub struct SlaveDevice {
    address: u8,
    registers: RegisterStore,
    stats: SlaveStats,
}

impl SlaveDevice {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: RegisterStore::new(),
            stats: SlaveStats::default(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn registers(&self) -> &RegisterStore {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterStore {
        &mut self.registers
    }

    pub fn stats(&self) -> SlaveStats {
        self.stats
    }

    /// Dispatches one raw frame and returns the response to send, or `None`
    /// when the frame is discarded.
    pub fn process_frame(&mut self, bytes: &[u8]) -> Option<Bytes> {
        self.stats.frames_received += 1;

        let request = match frame::decode(bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!("Discarding frame {}: {}", hex::encode(bytes), e);
                self.stats.frames_discarded += 1;
                return None;
            }
        };

        if request.address != self.address {
            trace!("Ignoring frame for address {}", request.address);
            self.stats.frames_discarded += 1;
            return None;
        }

        let function = request.function;
        let result = match FunctionCode::from_code(function) {
            Some(FunctionCode::ReadHoldingRegisters) => self.read_holding_registers(request.payload),
            Some(FunctionCode::WriteSingleRegister) => self.write_single_register(request.payload),
            Some(FunctionCode::WriteMultipleRegisters) => self.write_multiple_registers(request.payload),
            Some(FunctionCode::StringTransfer) => self.store_string(request.payload),
            Some(
                unsupported @ (FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::ReadInputRegisters
                | FunctionCode::WriteSingleCoil
                | FunctionCode::WriteMultipleCoils),
            ) => {
                debug!("{} is not implemented", unsupported);
                Err(ExceptionCode::IllegalFunction)
            }
            None => Err(ExceptionCode::IllegalFunction),
        };

        let response = match result {
            Ok(payload) => match frame::encode(self.address, function, &payload) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Could not encode response to 0x{:02X}: {}", function, e);
                    self.exception(function, ExceptionCode::IllegalFunction)
                }
            },
            Err(code) => {
                warn!("Answering function 0x{:02X} with {}", function, code);
                self.exception(function, code)
            }
        };
        self.stats.responses_sent += 1;
        Some(response)
    }

    fn exception(&mut self, function: u8, code: ExceptionCode) -> Bytes {
        self.stats.exceptions_sent += 1;
        frame::exception(self.address, function, code)
    }

    /// Dispatches `bytes` and sends the response, if any. Returns whether a
    /// response went out.
    pub fn handle_request<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        bytes: &[u8],
    ) -> Result<bool, ModbusError> {
        match self.process_frame(bytes) {
            Some(response) => {
                trace!("slave {} >> {}", self.address, hex::encode(&response));
                transport.send(&response)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Waits up to `options.timeout` for one request and handles it.
    /// An idle bus is not an error and returns `Ok(false)`.
    pub fn serve_once<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        options: &ReceiveOptions,
    ) -> Result<bool, ModbusError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = match receive_frame(transport, &mut buf, options) {
            Ok(len) => len,
            Err(ModbusError::Timeout) => return Ok(false),
            Err(e) => return Err(e),
        };
        trace!("slave {} << {}", self.address, hex::encode(&buf[..len]));
        self.handle_request(transport, &buf[..len])
    }

    /// Serves requests until `stop` is set or the transport fails.
    pub fn serve<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        options: &ReceiveOptions,
        stop: &AtomicBool,
    ) -> Result<SlaveStats, ModbusError> {
        info!("Slave {} serving requests", self.address);
        while !stop.load(Ordering::Relaxed) {
            self.serve_once(transport, options)?;
        }
        info!("Slave {} stopped: {:?}", self.address, self.stats);
        Ok(self.stats)
    }

    fn read_holding_registers(&self, payload: &[u8]) -> HandlerResult {
        let [s0, s1, q0, q1] = <[u8; 4]>::try_from(payload).map_err(|_| ExceptionCode::IllegalDataValue)?;
        let start = u16::from_be_bytes([s0, s1]);
        let quantity = u16::from_be_bytes([q0, q1]);

        if start as usize + quantity as usize > MAX_HOLDING_REGISTERS {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        if quantity == 0 {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let values = self
            .registers
            .holding_registers(start, quantity)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        let mut response = Vec::with_capacity(1 + values.len() * 2);
        response.push((values.len() * 2) as u8);
        for value in values {
            response.extend_from_slice(&value.to_be_bytes());
        }
        Ok(response)
    }

    fn write_single_register(&mut self, payload: &[u8]) -> HandlerResult {
        let [a0, a1, v0, v1] = <[u8; 4]>::try_from(payload).map_err(|_| ExceptionCode::IllegalDataValue)?;
        let addr = u16::from_be_bytes([a0, a1]);
        let value = u16::from_be_bytes([v0, v1]);

        if !self.registers.set_holding_register(addr, value) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(payload.to_vec())
    }

    fn write_multiple_registers(&mut self, payload: &[u8]) -> HandlerResult {
        if payload.len() < 5 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start = u16::from_be_bytes([payload[0], payload[1]]);
        let quantity = u16::from_be_bytes([payload[2], payload[3]]);
        let byte_count = payload[4] as usize;
        let data = &payload[5..];

        if quantity == 0
            || quantity > MAX_REGISTERS_PER_REQUEST
            || byte_count != quantity as usize * 2
            || data.len() != byte_count
        {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let slots = self
            .registers
            .holding_registers_mut(start, quantity)
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        for (slot, pair) in slots.iter_mut().zip(data.chunks_exact(2)) {
            *slot = u16::from_be_bytes([pair[0], pair[1]]);
        }
        Ok(payload[..4].to_vec())
    }

    /// Non-standard string transfer: `[start_hi, start_lo, byte_count, bytes..]`,
    /// two characters per register, an odd trailing byte zero-padded.
    ///
    /// Only the whole character pairs must fit the table. A padded trailing
    /// register that would land past the last holding register is dropped.
    fn store_string(&mut self, payload: &[u8]) -> HandlerResult {
        if payload.len() < 3 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start = u16::from_be_bytes([payload[0], payload[1]]);
        let byte_count = payload[2] as usize;
        let text = &payload[3..];

        if byte_count > MAX_STRING_LEN || text.len() < byte_count {
            return Err(ExceptionCode::IllegalDataValue);
        }
        if start as usize + byte_count / 2 > MAX_HOLDING_REGISTERS {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let stored = byte_count.div_ceil(2).min(MAX_HOLDING_REGISTERS - start as usize);
        let slots = self
            .registers
            .holding_registers_mut(start, stored as u16)
            .ok_or(ExceptionCode::IllegalDataValue)?;
        for (slot, pair) in slots.iter_mut().zip(text[..byte_count].chunks(2)) {
            *slot = u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]);
        }

        let mut response = Vec::with_capacity(4);
        response.extend_from_slice(&start.to_be_bytes());
        response.extend_from_slice(&(byte_count as u16).to_be_bytes());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::frame::decode;
    use crate::transport::MemoryTransport;
    use std::time::Duration;

    fn request(address: u8, function: u8, payload: &[u8]) -> Vec<u8> {
        frame::encode(address, function, payload).unwrap().to_vec()
    }

    fn exception_code(response: &[u8]) -> Option<ExceptionCode> {
        decode(response).unwrap().exception_code()
    }

    #[test]
    fn reads_holding_registers() {
        let mut slave = SlaveDevice::new(1);
        slave.registers_mut().set_holding_register(10, 1234);

        let response = slave
            .process_frame(&[0x01, 0x03, 0x00, 0x0A, 0x00, 0x01, 0xA4, 0x08])
            .unwrap();
        assert_eq!(response.as_ref(), &[0x01, 0x03, 0x02, 0x04, 0xD2, 0x3A, 0xD9]);
    }

    #[test]
    fn out_of_range_read_is_illegal_address() {
        let mut slave = SlaveDevice::new(1);
        let response = slave.process_frame(&request(1, 0x03, &[0x00, 0x78, 0x00, 0x06])).unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataAddress));
        assert_eq!(response[1], 0x83);

        let response = slave.process_frame(&request(1, 0x03, &[0xFF, 0xFF, 0xFF, 0xFF])).unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataAddress));
    }

    #[test]
    fn zero_quantity_read_is_illegal_value() {
        let mut slave = SlaveDevice::new(1);
        let response = slave.process_frame(&request(1, 0x03, &[0x00, 0x00, 0x00, 0x00])).unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataValue));
    }

    #[test]
    fn discards_foreign_and_damaged_frames() {
        let mut slave = SlaveDevice::new(1);
        assert!(slave.process_frame(&request(2, 0x03, &[0, 0, 0, 1])).is_none());
        assert!(slave.process_frame(&[0x01, 0x03, 0x00]).is_none());

        let mut damaged = request(1, 0x03, &[0, 0, 0, 1]);
        damaged[2] ^= 0x40;
        assert!(slave.process_frame(&damaged).is_none());

        let stats = slave.stats();
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.frames_discarded, 3);
        assert_eq!(stats.responses_sent, 0);
    }

    #[test]
    fn declared_but_unimplemented_functions_are_illegal() {
        let mut slave = SlaveDevice::new(1);
        for function in [0x01, 0x02, 0x04, 0x05, 0x0F, 0x2B, 0x7F] {
            let response = slave.process_frame(&request(1, function, &[0, 0, 0, 1])).unwrap();
            assert_eq!(response[1], function | 0x80);
            assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalFunction));
        }
        assert_eq!(slave.stats().exceptions_sent, 7);
    }

    #[test]
    fn write_single_then_read_back() {
        let mut slave = SlaveDevice::new(1);
        let write = request(1, 0x06, &[0x00, 0x07, 0xAB, 0xCD]);
        let response = slave.process_frame(&write).unwrap();
        assert_eq!(response.as_ref(), write.as_slice());
        assert_eq!(slave.registers().holding_register(7), Some(0xABCD));

        let response = slave.process_frame(&request(1, 0x06, &[0x00, 0x7D, 0x00, 0x01])).unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataAddress));
    }

    #[test]
    fn write_multiple_checks_byte_count_and_range() {
        let mut slave = SlaveDevice::new(1);
        let response = slave
            .process_frame(&request(1, 0x10, &[0x00, 0x02, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02]))
            .unwrap();
        assert_eq!(decode(&response).unwrap().payload, &[0x00, 0x02, 0x00, 0x02]);
        assert_eq!(slave.registers().holding_registers(2, 2), Some(&[1u16, 2][..]));

        let response = slave
            .process_frame(&request(1, 0x10, &[0x00, 0x02, 0x00, 0x02, 0x03, 0x00, 0x01, 0x00]))
            .unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataValue));

        let response = slave
            .process_frame(&request(1, 0x10, &[0x00, 0x7C, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02]))
            .unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataAddress));
    }

    #[test]
    fn string_transfer_stores_pairs_and_echoes() {
        let mut slave = SlaveDevice::new(1);
        let response = slave
            .process_frame(&request(1, 0x16, &[0x00, 0x05, 0x03, b'a', b'b', b'c']))
            .unwrap();
        assert_eq!(decode(&response).unwrap().payload, &[0x00, 0x05, 0x00, 0x03]);
        assert_eq!(
            slave.registers().holding_registers(5, 2),
            Some(&[u16::from_be_bytes([b'a', b'b']), u16::from_be_bytes([b'c', 0])][..])
        );
    }

    #[test]
    fn string_transfer_limits_are_illegal_value() {
        let mut slave = SlaveDevice::new(1);

        let mut too_long = vec![0x00, 0x00, 31];
        too_long.extend(std::iter::repeat(b'x').take(31));
        let response = slave.process_frame(&request(1, 0x16, &too_long)).unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataValue));

        let response = slave
            .process_frame(&request(1, 0x16, &[0x00, 0x7C, 0x04, b'a', b'b', b'c', b'd']))
            .unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataValue));

        let response = slave.process_frame(&request(1, 0x16, &[0x00, 0x00, 0x04, b'a'])).unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataValue));
        assert_eq!(slave.registers().holding_register(0), Some(0));
    }

    #[test]
    fn odd_string_may_end_at_the_table_edge() {
        let mut slave = SlaveDevice::new(1);

        let response = slave
            .process_frame(&request(1, 0x16, &[0x00, 0x7C, 0x03, b'a', b'b', b'c']))
            .unwrap();
        let echo = decode(&response).unwrap();
        assert_eq!(echo.function, 0x16);
        assert_eq!(echo.payload, &[0x00, 0x7C, 0x00, 0x03]);
        assert_eq!(slave.registers().holding_register(124), Some(u16::from_be_bytes([b'a', b'b'])));

        let response = slave.process_frame(&request(1, 0x16, &[0x00, 0x7D, 0x01, b'z'])).unwrap();
        let echo = decode(&response).unwrap();
        assert_eq!(echo.function, 0x16);
        assert_eq!(echo.payload, &[0x00, 0x7D, 0x00, 0x01]);

        let response = slave.process_frame(&request(1, 0x16, &[0x00, 0x7E, 0x01, b'z'])).unwrap();
        assert_eq!(exception_code(&response), Some(ExceptionCode::IllegalDataValue));
    }

    #[test]
    fn serve_once_answers_over_transport() {
        let mut slave = SlaveDevice::new(1);
        let mut transport = MemoryTransport::new();
        transport.push_incoming_at(Duration::from_millis(2), request(1, 0x06, &[0x00, 0x01, 0x00, 0x03]));

        let options = ReceiveOptions {
            timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            inter_frame_gap: Some(Duration::from_micros(1750)),
        };
        assert!(slave.serve_once(&mut transport, &options).unwrap());
        assert_eq!(
            transport.last_sent(),
            Some(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03, 0x98, 0x0B][..])
        );

        assert!(!slave.serve_once(&mut transport, &options).unwrap());
    }

    #[test]
    fn serve_stops_when_flagged() {
        let mut slave = SlaveDevice::new(1);
        let mut transport = MemoryTransport::new();
        let stop = AtomicBool::new(true);
        let stats = slave.serve(&mut transport, &ReceiveOptions::default(), &stop).unwrap();
        assert_eq!(stats, SlaveStats::default());
    }
}
