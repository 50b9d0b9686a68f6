use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::Transport;
use crate::utils::error::ModbusError;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

struct Scheduled {
    at: Duration,
    bytes: Vec<u8>,
}

/// In-memory transport with a virtual clock.
///
/// Time only moves when the engine calls `delay`, so timeouts and
/// inter-frame gaps are deterministic. Each scheduled chunk is delivered by
/// a separate `receive` once the clock reaches its time.
pub struct MemoryTransport {
    origin: Instant,
    elapsed: Duration,
    incoming: VecDeque<Scheduled>,
    sent: Vec<Vec<u8>>,
    responder: Option<Responder>,
    response_latency: Duration,
    receive_calls: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            incoming: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            response_latency: Duration::ZERO,
            receive_calls: 0,
        }
    }

    /// Answers every sent frame with whatever `responder` returns,
    /// `latency` after the send.
    pub fn with_responder<F>(mut self, latency: Duration, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self.response_latency = latency;
        self
    }

    /// Makes `bytes` available immediately.
    pub fn push_incoming(&mut self, bytes: Vec<u8>) {
        let at = self.elapsed;
        self.push_incoming_at(at, bytes);
    }

    /// Makes `bytes` available once the virtual clock reaches `at`.
    pub fn push_incoming_at(&mut self, at: Duration, bytes: Vec<u8>) {
        let pos = self.incoming.iter().position(|s| s.at > at).unwrap_or(self.incoming.len());
        self.incoming.insert(pos, Scheduled { at, bytes });
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn last_sent(&self) -> Option<&[u8]> {
        self.sent.last().map(Vec::as_slice)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls
    }

    pub fn pending(&self) -> usize {
        self.incoming.len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        self.sent.push(frame.to_vec());
        let reply = self.responder.as_mut().and_then(|respond| respond(frame));
        if let Some(reply) = reply {
            let at = self.elapsed + self.response_latency;
            self.push_incoming_at(at, reply);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        self.receive_calls += 1;
        let ready = matches!(self.incoming.front(), Some(s) if s.at <= self.elapsed);
        if !ready || buf.is_empty() {
            return Ok(0);
        }

        let Some(mut chunk) = self.incoming.pop_front() else {
            return Ok(0);
        };
        let n = chunk.bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk.bytes[..n]);
        if n < chunk.bytes.len() {
            chunk.bytes.drain(..n);
            self.incoming.push_front(chunk);
        }
        Ok(n)
    }

    fn delay(&mut self, duration: Duration) {
        self.elapsed += duration;
    }

    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_wait_for_their_time() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming_at(Duration::from_millis(5), vec![1, 2, 3]);

        let mut buf = [0u8; 8];
        assert_eq!(transport.receive(&mut buf).unwrap(), 0);
        transport.delay(Duration::from_millis(5));
        assert_eq!(transport.receive(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(transport.receive_calls(), 2);
    }

    #[test]
    fn responder_replies_after_latency() {
        let mut transport = MemoryTransport::new()
            .with_responder(Duration::from_millis(2), |frame| Some(frame.to_vec()));
        transport.send(&[9, 9]).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(transport.receive(&mut buf).unwrap(), 0);
        transport.delay(Duration::from_millis(2));
        assert_eq!(transport.receive(&mut buf).unwrap(), 2);
        assert_eq!(transport.last_sent(), Some(&[9u8, 9][..]));
    }

    #[test]
    fn oversized_chunk_is_split_across_reads() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming(vec![1, 2, 3, 4, 5]);

        let mut buf = [0u8; 2];
        assert_eq!(transport.receive(&mut buf).unwrap(), 2);
        assert_eq!(transport.receive(&mut buf).unwrap(), 2);
        assert_eq!(transport.receive(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 5);
        assert_eq!(transport.pending(), 0);
    }
}
