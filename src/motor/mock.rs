// Scripted transport for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::roboclaw::{Result, RoboclawError};
use super::transport::Transport;

/// In-memory transport: queued response bytes in, captured request bytes out.
/// An empty read queue behaves like a serial timeout. Replies queued with
/// `queue_reply` only arrive once the next request has been written.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    write_buffer: Vec<u8>,
    timeout: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the next reads
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().unwrap().read_buffer.extend(data);
    }

    /// Queue a response body followed by its correct checksum byte,
    /// seeded with the request's address and opcode
    pub fn inject_response(&self, address: u8, command: u8, body: &[u8]) {
        self.inject_read(&response(address, command, body));
    }

    /// Like `inject_response`, but the bytes show up only after the next write
    pub fn queue_reply(&self, address: u8, command: u8, body: &[u8]) {
        let reply = response(address, command, body);
        self.inner.lock().unwrap().replies.push_back(reply);
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().write_buffer.clone()
    }

    pub fn clear_written(&self) {
        self.inner.lock().unwrap().write_buffer.clear();
    }

    /// Bytes queued but not yet consumed
    pub fn pending_reads(&self) -> usize {
        self.inner.lock().unwrap().read_buffer.len()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.lock().unwrap().timeout
    }
}

fn response(address: u8, command: u8, body: &[u8]) -> Vec<u8> {
    let sum = body
        .iter()
        .fold(address.wrapping_add(command), |acc, &b| acc.wrapping_add(b));
    let mut bytes = body.to_vec();
    bytes.push(sum & 0x7F);
    bytes
}

impl Transport for MockTransport {
    fn read_byte(&mut self) -> Result<u8> {
        self.inner
            .lock()
            .unwrap()
            .read_buffer
            .pop_front()
            .ok_or(RoboclawError::Timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_buffer.extend_from_slice(data);
        if let Some(reply) = inner.replies.pop_front() {
            inner.read_buffer.extend(reply);
        }
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.inner.lock().unwrap().timeout = Some(timeout);
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.inner.lock().unwrap().read_buffer.clear();
        Ok(())
    }
}
