//! Scriptable in-memory transport implementation.
//!
//! Records every frame and ping for assertion, and can be scripted to
//! fail sends, stall, or report itself closed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::ports::{Transport, TransportError};

/// In-memory [`Transport`] used by unit and integration tests.
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    pings: AtomicUsize,
    open: AtomicBool,
    fail_next: AtomicUsize,
    stall: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            open: AtomicBool::new(true),
            fail_next: AtomicUsize::new(0),
            stall: Mutex::new(None),
        }
    }

    /// Every text frame sent so far, in send order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }

    /// Sent frames parsed as JSON, in send order.
    pub fn sent_values(&self) -> Vec<Value> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Sent frames whose `type` tag matches, in send order.
    pub fn frames_of_type(&self, event_type: &str) -> Vec<Value> {
        self.sent_values()
            .into_iter()
            .filter(|value| value.get("type").and_then(Value::as_str) == Some(event_type))
            .collect()
    }

    /// The most recent frame, parsed as JSON.
    pub fn last_value(&self) -> Option<Value> {
        self.sent_values().pop()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock poisoned").len()
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn clear_sent(&self) {
        self.sent.lock().expect("sent lock poisoned").clear();
    }

    /// Script the next `n` sends to fail with a send error.
    pub fn fail_next_sends(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Script every send to stall for the given duration first.
    pub fn stall_sends(&self, delay: Duration) {
        *self.stall.lock().expect("stall lock poisoned") = Some(delay);
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&self, payload: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let stall = *self.stall.lock().expect("stall lock poisoned");
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(TransportError::Send("scripted failure".to_string()));
        }
        self.sent
            .lock()
            .expect("sent lock poisoned")
            .push(payload.to_string());
        Ok(())
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
