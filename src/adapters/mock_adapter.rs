//! Mock adapter for testing
//!
//! Runs instruments without hardware. It provides:
//! - Fixed replies per command and a FIFO of queued replies
//! - One-shot failure injection
//! - An I/O log for test verification
//!
//! All state lives behind a shared lock, so a [`MockHandle`] taken before the
//! adapter is moved into an instrument keeps observing it afterwards.

use super::{Adapter, AdapterOptions, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One entry of the mock I/O log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockIo {
    /// A command written by the caller.
    Write(String),
    /// A response handed back to the caller.
    Read(String),
}

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<String, String>,
    queued: VecDeque<String>,
    pending: VecDeque<String>,
    log: Vec<MockIo>,
    fail_next: Option<String>,
    options: Vec<AdapterOptions>,
    closed: bool,
    close_count: usize,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted adapter.
///
/// A write that matches a registered command queues that command's reply. A
/// read with no such reply pending takes the next queued reply instead, and
/// times out when the queue is empty too, as a silent instrument would.
///
/// # Example
///
/// ```
/// use scpi_instrument::adapters::{Adapter, MockAdapter};
///
/// let mut adapter = MockAdapter::new().with_reply("*IDN?", "RIGOL,DM3058,0,1.0");
/// let handle = adapter.handle();
/// assert_eq!(adapter.ask("*IDN?").unwrap(), "RIGOL,DM3058,0,1.0");
/// assert_eq!(handle.writes(), vec!["*IDN?".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Create a mock adapter with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `command` with `response` every time it is written.
    pub fn with_reply(self, command: &str, response: &str) -> Self {
        self.handle().respond_to(command, response);
        self
    }

    /// Handle for scripting and inspecting this adapter.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn take_failure(&self) -> Result<(), TransportError> {
        match lock(&self.state).fail_next.take() {
            Some(message) => Err(TransportError::ConnectionFailed(message)),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if lock(&self.state).closed {
            Err(TransportError::NotConnected)
        } else {
            Ok(())
        }
    }
}

impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn configure(&mut self, options: &AdapterOptions) -> Result<(), TransportError> {
        self.take_failure()?;
        lock(&self.state).options.push(options.clone());
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.take_failure()?;

        let mut state = lock(&self.state);
        state.log.push(MockIo::Write(command.to_string()));
        if let Some(reply) = state.replies.get(command).cloned() {
            state.pending.push_back(reply);
        }
        debug!(command, "MockAdapter write");
        Ok(())
    }

    fn read(&mut self) -> Result<String, TransportError> {
        self.ensure_open()?;
        self.take_failure()?;

        let mut state = lock(&self.state);
        let response = match state.pending.pop_front() {
            Some(response) => response,
            None => state.queued.pop_front().ok_or(TransportError::Timeout)?,
        };
        state.log.push(MockIo::Read(response.clone()));
        debug!(response = %response, "MockAdapter read");
        Ok(response)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.close_count += 1;
        if let Some(message) = state.fail_next.take() {
            return Err(TransportError::ConnectionFailed(message));
        }
        if !state.closed {
            state.closed = true;
            debug!("MockAdapter closed");
        }
        Ok(())
    }
}

/// Cloneable view onto a [`MockAdapter`]'s script and log.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Reply to `command` with `response` every time it is written.
    pub fn respond_to(&self, command: &str, response: &str) {
        lock(&self.state)
            .replies
            .insert(command.to_string(), response.to_string());
    }

    /// Queue a reply for a read that has no fixed reply pending.
    pub fn queue_reply(&self, response: &str) {
        lock(&self.state).queued.push_back(response.to_string());
    }

    /// Fail the next adapter operation with `message`.
    pub fn fail_next(&self, message: &str) {
        lock(&self.state).fail_next = Some(message.to_string());
    }

    /// Commands written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        lock(&self.state)
            .log
            .iter()
            .filter_map(|io| match io {
                MockIo::Write(cmd) => Some(cmd.clone()),
                MockIo::Read(_) => None,
            })
            .collect()
    }

    /// Full I/O log.
    pub fn log(&self) -> Vec<MockIo> {
        lock(&self.state).log.clone()
    }

    /// Clear the I/O log.
    pub fn clear_log(&self) {
        lock(&self.state).log.clear();
    }

    /// Every option set passed to `configure`, in order.
    pub fn options(&self) -> Vec<AdapterOptions> {
        lock(&self.state).options.clone()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Number of `close` calls received.
    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }
}
