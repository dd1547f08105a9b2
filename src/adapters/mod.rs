//! Transport adapters.
//!
//! An [`Adapter`] moves ASCII command strings to a device and reads ASCII
//! responses back. It knows nothing about properties, validation or value
//! maps; the dispatch layer above it owns all of that. Implementations:
//!
//! - [`MockAdapter`]: scripted replies and an I/O log, for tests and dry runs.
//! - [`SerialAdapter`]: RS-232 through the `serialport` crate
//!   (feature `instrument_serial`).
//! - [`TcpAdapter`]: raw SCPI socket (LXI instruments listen on port 5025).
//!
//! Stream-based adapters share [`LineStream`], which applies write/read
//! termination, the response timeout and the optional query delay.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

pub mod mock_adapter;
#[cfg(feature = "instrument_serial")]
pub mod serial_adapter;
pub mod tcp_adapter;

pub use mock_adapter::{MockAdapter, MockHandle, MockIo};
#[cfg(feature = "instrument_serial")]
pub use serial_adapter::SerialAdapter;
pub use tcp_adapter::TcpAdapter;

/// Default response timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Poll interval used while waiting for response bytes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An error that can occur when talking to a device through an adapter.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out waiting for response")]
    Timeout,

    #[error("Connection closed by peer")]
    Closed,

    #[error("Response is not valid UTF-8")]
    InvalidEncoding,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Options an instrument forwards to its adapter.
///
/// This is the full set of recognised instrument options; any other key in an
/// option bag is rejected before the adapter is touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterOptions {
    /// Response timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Appended to every command written.
    pub write_termination: Option<String>,
    /// Marks the end of a response.
    pub read_termination: Option<String>,
    /// Pause between writing a query and reading its response.
    pub query_delay_ms: Option<u64>,
}

impl AdapterOptions {
    /// Deserialize an option bag, rejecting unknown keys and mistyped values.
    pub fn from_table(table: &toml::Table) -> Result<Self, String> {
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| e.message().to_string())
    }

    /// Options in `overrides` win over `self`.
    pub fn merged(&self, overrides: &AdapterOptions) -> AdapterOptions {
        AdapterOptions {
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            write_termination: overrides
                .write_termination
                .clone()
                .or_else(|| self.write_termination.clone()),
            read_termination: overrides
                .read_termination
                .clone()
                .or_else(|| self.read_termination.clone()),
            query_delay_ms: overrides.query_delay_ms.or(self.query_delay_ms),
        }
    }
}

/// Raw command transport.
///
/// Adapters are single-writer resources: a command and its response cannot be
/// told apart from another caller's on a shared session, so every method takes
/// `&mut self`.
pub trait Adapter: Send {
    /// Short backend name, used in logs.
    fn name(&self) -> &str;

    /// Apply instrument options (timeouts, terminations).
    fn configure(&mut self, options: &AdapterOptions) -> Result<(), TransportError>;

    /// Send one command; no response is expected.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Read one response.
    fn read(&mut self) -> Result<String, TransportError>;

    /// Send a query and read its response.
    fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command)?;
        self.read()
    }

    /// Release the transport. Calling it twice is not an error.
    fn close(&mut self) -> Result<(), TransportError>;
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn configure(&mut self, options: &AdapterOptions) -> Result<(), TransportError> {
        (**self).configure(options)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }

    fn read(&mut self) -> Result<String, TransportError> {
        (**self).read()
    }

    fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).ask(command)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// Termination and timing settings for stream transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    /// Appended to each command.
    pub write_termination: String,
    /// Ends each response.
    pub read_termination: String,
    /// Maximum wait for a complete response.
    pub timeout: Duration,
    /// Pause between a query and its read.
    pub query_delay: Duration,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            write_termination: "\n".to_string(),
            read_termination: "\n".to_string(),
            timeout: DEFAULT_TIMEOUT,
            query_delay: Duration::ZERO,
        }
    }
}

impl Framing {
    /// Apply the options that are set, validating them first.
    pub fn apply(&mut self, options: &AdapterOptions) -> Result<(), TransportError> {
        if options.timeout_ms == Some(0) {
            return Err(TransportError::InvalidConfig(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        if options.read_termination.as_deref() == Some("") {
            return Err(TransportError::InvalidConfig(
                "read_termination cannot be empty".to_string(),
            ));
        }
        if let Some(ms) = options.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(term) = &options.write_termination {
            self.write_termination = term.clone();
        }
        if let Some(term) = &options.read_termination {
            self.read_termination = term.clone();
        }
        if let Some(ms) = options.query_delay_ms {
            self.query_delay = Duration::from_millis(ms);
        }
        Ok(())
    }
}

/// Line-oriented command/response session over any byte stream.
pub struct LineStream<S> {
    name: &'static str,
    stream: Option<S>,
    framing: Framing,
}

impl<S: Read + Write + Send> LineStream<S> {
    /// Wrap an open stream.
    pub fn new(name: &'static str, stream: S, framing: Framing) -> Self {
        Self {
            name,
            stream: Some(stream),
            framing,
        }
    }

    /// Current framing.
    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    /// Mutable access to the open stream.
    pub fn stream_mut(&mut self) -> Option<&mut S> {
        self.stream.as_mut()
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl<S: Read + Write + Send> Adapter for LineStream<S> {
    fn name(&self) -> &str {
        self.name
    }

    fn configure(&mut self, options: &AdapterOptions) -> Result<(), TransportError> {
        self.framing.apply(options)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let framed = format!("{}{}", command, self.framing.write_termination);
        stream.write_all(framed.as_bytes())?;
        stream.flush()?;
        debug!(adapter = self.name, command, "Sent command");
        Ok(())
    }

    fn read(&mut self) -> Result<String, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let response = read_terminated(
            stream,
            &self.framing.read_termination,
            self.framing.timeout,
        )?;
        debug!(adapter = self.name, response = %response, "Received response");
        Ok(response)
    }

    fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command)?;
        if !self.framing.query_delay.is_zero() {
            std::thread::sleep(self.framing.query_delay);
        }
        self.read()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.stream.take().is_some() {
            debug!(adapter = self.name, "Stream closed");
        }
        Ok(())
    }
}

/// Read bytes until `terminator` is seen, returning the trimmed response.
///
/// The reader is expected to have a short per-read timeout of its own; timed
/// out reads are retried until the overall `timeout` elapses.
pub fn read_terminated<R: Read + ?Sized>(
    reader: &mut R,
    terminator: &str,
    timeout: Duration,
) -> Result<String, TransportError> {
    let terminator = terminator.as_bytes();
    let mut response = Vec::new();
    let mut buffer = [0u8; 1];
    let start = Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(TransportError::Timeout);
        }

        match reader.read(&mut buffer) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(_) => {
                response.push(buffer[0]);
                if !terminator.is_empty() && response.ends_with(terminator) {
                    response.truncate(response.len() - terminator.len());
                    break;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                std::thread::sleep(POLL_INTERVAL.min(timeout / 10));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(TransportError::Io(e)),
        }
    }

    let text = String::from_utf8(response).map_err(|_| TransportError::InvalidEncoding)?;
    Ok(text.trim().to_string())
}
