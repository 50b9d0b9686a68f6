//! Frame reception: polls a transport until a complete frame is buffered or
//! the response deadline passes.

use log::trace;
use std::time::{Duration, Instant};

use crate::transport::Transport;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// How long to wait for the first byte.
    pub timeout: Duration,
    /// Delay handed to the transport between empty polls.
    pub poll_interval: Duration,
    /// Bus silence that ends a frame. `None` treats the first non-empty
    /// read as the whole frame.
    pub inter_frame_gap: Option<Duration>,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1),
            inter_frame_gap: None,
        }
    }
}

/// Receives one frame into `buf` and returns its length.
///
/// Fails with `Timeout` only when no byte arrived and strictly more than
/// `timeout` elapsed on the transport clock. A frame that fills `buf` is
/// returned as-is.
pub fn receive_frame<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &mut [u8],
    options: &ReceiveOptions,
) -> Result<usize, ModbusError> {
    let started = transport.now();
    let mut len = 0usize;
    let mut last_byte_at: Option<Instant> = None;

    loop {
        if len == buf.len() {
            trace!("receive buffer full at {} bytes", len);
            return Ok(len);
        }

        let n = transport.receive(&mut buf[len..])?;
        let now = transport.now();

        if n > 0 {
            len += n;
            match options.inter_frame_gap {
                None => return Ok(len),
                Some(_) => {
                    last_byte_at = Some(now);
                    continue;
                }
            }
        }

        match (last_byte_at, options.inter_frame_gap) {
            (Some(last), Some(gap)) => {
                if now.saturating_duration_since(last) >= gap {
                    return Ok(len);
                }
            }
            _ => {
                if now.saturating_duration_since(started) > options.timeout {
                    return Err(ModbusError::Timeout);
                }
            }
        }

        transport.delay(options.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    fn options(gap: Option<Duration>) -> ReceiveOptions {
        ReceiveOptions {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            inter_frame_gap: gap,
        }
    }

    #[test]
    fn first_read_completes_frame_without_gap() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming_at(Duration::from_millis(3), vec![0x01, 0x03]);
        transport.push_incoming_at(Duration::from_millis(4), vec![0x02, 0x00]);

        let mut buf = [0u8; 16];
        let len = receive_frame(&mut transport, &mut buf, &options(None)).unwrap();
        assert_eq!(&buf[..len], &[0x01, 0x03]);
    }

    #[test]
    fn gap_joins_chunks_until_silence() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming_at(Duration::from_millis(2), vec![0x01, 0x03]);
        transport.push_incoming_at(Duration::from_millis(3), vec![0x02, 0x00]);
        transport.push_incoming_at(Duration::from_millis(30), vec![0xFF]);

        let mut buf = [0u8; 16];
        let gap = Some(Duration::from_millis(4));
        let len = receive_frame(&mut transport, &mut buf, &options(gap)).unwrap();
        assert_eq!(&buf[..len], &[0x01, 0x03, 0x02, 0x00]);
    }

    #[test]
    fn times_out_only_after_deadline() {
        let mut transport = MemoryTransport::new();
        let mut buf = [0u8; 16];
        let result = receive_frame(&mut transport, &mut buf, &options(None));
        assert!(matches!(result, Err(ModbusError::Timeout)));
        assert!(transport.elapsed() > Duration::from_millis(50));
    }

    #[test]
    fn late_first_byte_still_counts_within_timeout() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming_at(Duration::from_millis(50), vec![0xAA]);
        let mut buf = [0u8; 4];
        let len = receive_frame(&mut transport, &mut buf, &options(None)).unwrap();
        assert_eq!(len, 1);
    }

    #[test]
    fn full_buffer_returns_what_arrived() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming(vec![0x11; 10]);
        let mut buf = [0u8; 4];
        let len = receive_frame(&mut transport, &mut buf, &options(Some(Duration::from_millis(2)))).unwrap();
        assert_eq!(len, 4);
    }
}
