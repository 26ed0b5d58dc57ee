//! Mock serial transport
//!
//! A scripted in-memory [`Transport`] for tests and for running the monitor
//! without hardware. Each request written pops the next scripted reply; the
//! handle is cheaply cloneable so a test can keep one clone to inspect what
//! the reader sent.

use crate::error::MeterError;
use crate::modbus::transport::Transport;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// What the simulated meter does with the next request.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with these bytes (need not be a valid frame).
    Frame(Vec<u8>),
    /// Say nothing; the reader's wait window expires.
    Silence,
    /// Fail the write itself, as an unplugged adapter would.
    WriteError(String),
    /// Never finish the write, as a wedged adapter would.
    WriteStall,
}

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<MockReply>,
    default_reply: Option<Vec<u8>>,
    rx: VecDeque<u8>,
    requests: Vec<Vec<u8>>,
    reopen_results: VecDeque<bool>,
    reopen_count: u32,
}

/// Mock transport that simulates a Modbus slave
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers every unscripted request with `frame`.
    pub fn answering(frame: Vec<u8>) -> Self {
        let mock = Self::new();
        mock.lock().default_reply = Some(frame);
        mock
    }

    /// Queue the reply to the next request
    pub fn queue_reply(&self, reply: MockReply) {
        self.lock().replies.push_back(reply);
    }

    /// Bytes already waiting in the receive buffer before the next request
    pub fn inject_stale(&self, data: &[u8]) {
        self.lock().rx.extend(data);
    }

    /// Make the next `reopen` fail
    pub fn fail_next_reopen(&self) {
        self.lock().reopen_results.push_back(false);
    }

    /// Every request written so far
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.lock().requests.clone()
    }

    pub fn reopen_count(&self) -> u32 {
        self.lock().reopen_count
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn clear_input(&mut self) -> Result<(), MeterError> {
        self.lock().rx.clear();
        Ok(())
    }

    async fn write_all(&mut self, frame: &[u8]) -> Result<(), MeterError> {
        let stalled = {
            let mut state = self.lock();
            state.requests.push(frame.to_vec());

            let reply = match state.replies.pop_front() {
                Some(reply) => reply,
                None => match &state.default_reply {
                    Some(frame) => MockReply::Frame(frame.clone()),
                    None => MockReply::Silence,
                },
            };

            match reply {
                MockReply::Frame(bytes) => {
                    state.rx.extend(bytes);
                    false
                }
                MockReply::Silence => false,
                MockReply::WriteError(msg) => return Err(MeterError::Transport(msg)),
                MockReply::WriteStall => true,
            }
        };

        if stalled {
            return std::future::pending().await;
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MeterError> {
        let n = {
            let mut state = self.lock();
            let n = state.rx.len().min(buf.len());
            for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                *slot = byte;
            }
            n
        };

        if n == 0 {
            // A silent bus: never completes, the caller's timeout ends the wait.
            return std::future::pending().await;
        }
        Ok(n)
    }

    async fn reopen(&mut self) -> Result<(), MeterError> {
        let mut state = self.lock();
        state.reopen_count += 1;
        state.rx.clear();
        if state.reopen_results.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(MeterError::Transport("mock reopen failed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_records_request_and_queues_reply() {
        let mut mock = MockTransport::new();
        let probe = mock.clone();
        mock.queue_reply(MockReply::Frame(vec![0x01, 0x02]));

        mock.write_all(&[0xAA, 0xBB]).await.unwrap();
        let mut buf = [0u8; 8];
        let n = mock.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], &[0x01, 0x02]);
        assert_eq!(probe.requests(), vec![vec![0xAA, 0xBB]]);
    }

    #[tokio::test]
    async fn test_default_reply_repeats() {
        let mut mock = MockTransport::answering(vec![0x07]);
        for _ in 0..3 {
            mock.write_all(&[0x00]).await.unwrap();
            let mut buf = [0u8; 4];
            assert_eq!(mock.read(&mut buf).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_reopen_script() {
        let mut mock = MockTransport::new();
        mock.fail_next_reopen();
        assert!(mock.reopen().await.is_err());
        assert!(mock.reopen().await.is_ok());
        assert_eq!(mock.reopen_count(), 2);
    }
}
