//! Mock transport for testing.
//!
//! Responses are queued per URL and handed out in order; every request is
//! captured for verification.

use super::{Request, Transport, TransportError};
use crate::config::AuthStrategy;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct QueuedResponse {
    result: Result<Value, TransportError>,
    delay: Duration,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    auth: Option<AuthStrategy>,
    connect_attempts: u32,
    failing_connects: VecDeque<String>,
    responses: HashMap<String, VecDeque<QueuedResponse>>,
    calls: Vec<Request>,
    open_topics: BTreeSet<String>,
    topic_opens: Vec<String>,
    topic_closes: Vec<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response body for the next `call()` to `url`.
    pub fn queue_response(&self, url: &str, body: Value) {
        self.queue(url, Ok(body), Duration::ZERO);
    }

    /// Queue a response body that is returned only after `delay`.
    pub fn queue_delayed_response(&self, url: &str, body: Value, delay: Duration) {
        self.queue(url, Ok(body), delay);
    }

    /// Queue a failure for the next `call()` to `url`.
    pub fn queue_error(&self, url: &str, error: TransportError) {
        self.queue(url, Err(error), Duration::ZERO);
    }

    /// Queue a failure that is returned only after `delay`.
    pub fn queue_delayed_error(&self, url: &str, error: TransportError, delay: Duration) {
        self.queue(url, Err(error), delay);
    }

    fn queue(&self, url: &str, result: Result<Value, TransportError>, delay: Duration) {
        let mut inner = self.lock();
        inner
            .responses
            .entry(url.to_string())
            .or_default()
            .push_back(QueuedResponse { result, delay });
    }

    /// Get every request that was made, in order.
    pub fn calls(&self) -> Vec<Request> {
        self.lock().calls.clone()
    }

    /// Get the requests made to one URL.
    pub fn calls_to(&self, url: &str) -> Vec<Request> {
        self.lock()
            .calls
            .iter()
            .filter(|request| request.url == url)
            .cloned()
            .collect()
    }

    /// Get the last request that was made.
    pub fn last_call(&self) -> Option<Request> {
        self.lock().calls.last().cloned()
    }

    /// Topics currently open.
    pub fn open_topics(&self) -> Vec<String> {
        self.lock().open_topics.iter().cloned().collect()
    }

    /// How many times `open_topic(url)` was called.
    pub fn topic_open_count(&self, url: &str) -> usize {
        self.lock().topic_opens.iter().filter(|t| *t == url).count()
    }

    /// How many times `close_topic(url)` was called.
    pub fn topic_close_count(&self, url: &str) -> usize {
        self.lock().topic_closes.iter().filter(|t| *t == url).count()
    }

    /// Get the auth strategy of the last successful connect.
    pub fn auth(&self) -> Option<AuthStrategy> {
        self.lock().auth.clone()
    }

    /// Number of `connect()` calls, successful or not.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.fail_connects(1, error);
    }

    /// Cause the next `count` connect() calls to fail.
    pub fn fail_connects(&self, count: u32, error: &str) {
        let mut inner = self.lock();
        for _ in 0..count {
            inner.failing_connects.push_back(error.to_string());
        }
    }

    /// Simulate the link dropping. Open topics stay registered, as a real
    /// transport would forget them server-side but not client-side.
    pub fn drop_connection(&self) {
        self.lock().connected = false;
    }

    /// Clear all state (calls, queues, topics, connection).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, auth: &AuthStrategy) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connect_attempts += 1;

        // Check for forced failure
        if let Some(error) = inner.failing_connects.pop_front() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.auth = Some(auth.clone());
        Ok(())
    }

    async fn call(&self, request: Request) -> Result<Value, TransportError> {
        let queued = {
            let mut inner = self.lock();

            if !inner.connected {
                return Err(TransportError::NotConnected);
            }

            let url = request.url.clone();
            inner.calls.push(request);
            inner
                .responses
                .get_mut(&url)
                .and_then(VecDeque::pop_front)
                .unwrap_or(QueuedResponse {
                    result: Err(TransportError::RequestFailed {
                        status: 404,
                        message: format!("no response queued for {}", url),
                    }),
                    delay: Duration::ZERO,
                })
        };

        if !queued.delay.is_zero() {
            tokio::time::sleep(queued.delay).await;
        }
        queued.result
    }

    async fn open_topic(&self, url: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(TransportError::NotConnected);
        }
        inner.topic_opens.push(url.to_string());
        inner.open_topics.insert(url.to_string());
        Ok(())
    }

    async fn close_topic(&self, url: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.topic_closes.push(url.to_string());
        inner.open_topics.remove(url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.open_topics.clear();
        Ok(())
    }
}
