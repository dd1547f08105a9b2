//! Serial adapter for RS-232/USB-serial instruments
//!
//! Wraps the `serialport` crate. The port itself uses a short internal read
//! timeout; the overall response timeout comes from the adapter framing.

use super::{Adapter, AdapterOptions, Framing, LineStream, TransportError};
use serialport::SerialPort;
use std::time::Duration;
use tracing::info;

/// Internal read timeout of the port; responses are polled until the framing
/// timeout expires.
const PORT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial adapter for RS-232 communication.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    framing: Framing,

    session: Option<LineStream<Box<dyn SerialPort>>>,
}

impl SerialAdapter {
    /// Create an unopened adapter with default framing.
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 9600, 115200)
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            framing: Framing::default(),
            session: None,
        }
    }

    /// Set read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.framing.timeout = timeout;
        self
    }

    /// Set command and response terminators
    pub fn with_terminations(mut self, write: &str, read: &str) -> Self {
        self.framing.write_termination = write.to_string();
        self.framing.read_termination = read.to_string();
        self
    }

    /// Open the port.
    pub fn open(mut self) -> Result<Self, TransportError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(PORT_POLL_TIMEOUT)
            .open()?;
        info!(
            port = %self.port_name,
            baud_rate = self.baud_rate,
            "Serial port opened"
        );
        self.session = Some(LineStream::new("serial", port, self.framing.clone()));
        Ok(self)
    }

    /// Port path.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Whether the port is open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn session(&mut self) -> Result<&mut LineStream<Box<dyn SerialPort>>, TransportError> {
        self.session.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Adapter for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    fn configure(&mut self, options: &AdapterOptions) -> Result<(), TransportError> {
        self.framing.apply(options)?;
        if let Some(session) = self.session.as_mut() {
            session.configure(options)?;
        }
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.session()?.write(command)
    }

    fn read(&mut self) -> Result<String, TransportError> {
        self.session()?.read()
    }

    fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        self.session()?.ask(command)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut session) = self.session.take() {
            session.close()?;
            info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }
}
