//! Test and helper mocks for drip_core.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ports::{PortError, Publisher};
use crate::reports::Outbound;

#[derive(Debug)]
struct Outbox {
    sent: Vec<Outbound>,
    connected: bool,
    fail_publish: bool,
    reconnects: usize,
}

/// Publisher that records every message. Clones share the same outbox.
#[derive(Debug, Clone)]
pub struct RecordingPublisher {
    inner: Arc<Mutex<Outbox>>,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Outbox {
                sent: Vec::new(),
                connected: true,
                fail_publish: false,
                reconnects: 0,
            })),
        }
    }
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.outbox().sent.clone()
    }

    /// Messages published on `topic`, oldest first.
    pub fn on_topic(&self, topic: &str) -> Vec<Outbound> {
        self.outbox()
            .sent
            .iter()
            .filter(|m| m.topic() == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.outbox().sent.clear();
    }

    /// Simulate the broker link going down (or coming back).
    pub fn set_connected(&self, connected: bool) {
        self.outbox().connected = connected;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.outbox().fail_publish = fail;
    }

    pub fn reconnects(&self) -> usize {
        self.outbox().reconnects
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, msg: &Outbound) -> Result<(), PortError> {
        let mut out = self.outbox();
        if out.fail_publish {
            return Err(Box::new(std::io::Error::other("publish refused")));
        }
        out.sent.push(msg.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.outbox().connected
    }

    /// Counts the attempt; the link stays as `set_connected` left it.
    fn reconnect(&mut self) -> Result<(), PortError> {
        let mut out = self.outbox();
        out.reconnects += 1;
        if out.connected {
            Ok(())
        } else {
            Err(Box::new(std::io::Error::other("broker unreachable")))
        }
    }
}
