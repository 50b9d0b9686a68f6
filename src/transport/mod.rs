pub mod memory;
pub mod serial;

use std::time::{Duration, Instant};

use crate::utils::error::ModbusError;

pub use memory::MemoryTransport;
pub use serial::SerialTransport;

/// Byte-level link the protocol engine drives.
///
/// `receive` must not block: it returns `Ok(0)` when nothing is pending.
/// Timeouts are measured against `now()`, so a fake transport can advance a
/// virtual clock from `delay()`.
pub trait Transport {
    fn send(&mut self, frame: &[u8]) -> Result<(), ModbusError>;

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError>;

    fn delay(&mut self, duration: Duration);

    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        (**self).send(frame)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        (**self).receive(buf)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        (**self).send(frame)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        (**self).receive(buf)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }
}
