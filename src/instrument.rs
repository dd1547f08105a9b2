//! Instrument: one adapter plus a shared property registry.
//!
//! Every [`get`](Instrument::get) is exactly one query round trip and every
//! [`set`](Instrument::set) exactly one write. Validation, mapping and
//! formatting happen before the adapter is touched; transport failures come
//! back unchanged and are never retried here.
//!
//! The instrument owns its adapter and closes it when dropped, so the
//! transport is released on every exit path, including construction errors.

use crate::adapters::{Adapter, AdapterOptions, TransportError};
use crate::error::{DeviceError, InstrumentError, InstrumentResult};
use crate::property::PropertyDescriptor;
use crate::registry::PropertyRegistry;
use crate::value::{Value, ValueKind};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query that pops one entry from the SCPI error queue.
const ERROR_QUERY: &str = "SYST:ERR?";

/// Upper bound on error queue entries drained in one call.
const MAX_ERROR_QUEUE: usize = 256;

/// A connected instrument.
pub struct Instrument<A: Adapter> {
    name: String,
    adapter: A,
    registry: Arc<PropertyRegistry>,
    closed: bool,
}

impl<A: Adapter> Instrument<A> {
    /// Create an instrument with the adapter's default options.
    pub fn new(adapter: A, name: &str, registry: Arc<PropertyRegistry>) -> InstrumentResult<Self> {
        Self::with_options(adapter, name, registry, &toml::Table::new())
    }

    /// Create an instrument from an option bag.
    ///
    /// Unknown keys and mistyped values fail with a configuration error before
    /// the adapter sees any call.
    pub fn with_options(
        adapter: A,
        name: &str,
        registry: Arc<PropertyRegistry>,
        options: &toml::Table,
    ) -> InstrumentResult<Self> {
        let options = AdapterOptions::from_table(options).map_err(|e| {
            InstrumentError::configuration(format!("instrument '{}': {}", name, e))
        })?;
        Self::configured(adapter, name, registry, &options)
    }

    /// Create an instrument from already-checked options.
    pub fn configured(
        adapter: A,
        name: &str,
        registry: Arc<PropertyRegistry>,
        options: &AdapterOptions,
    ) -> InstrumentResult<Self> {
        let mut instrument = Self {
            name: name.to_string(),
            adapter,
            registry,
            closed: false,
        };
        instrument.adapter.configure(options)?;
        info!(
            instrument = %instrument.name,
            adapter = instrument.adapter.name(),
            properties = instrument.registry.len(),
            "Instrument connected"
        );
        Ok(instrument)
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared property registry.
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Mutable access to the underlying adapter.
    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Property names in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.registry.names()
    }

    /// Descriptor of a property.
    pub fn describe(&self, property: &str) -> InstrumentResult<&PropertyDescriptor> {
        self.registry.lookup(property).map(Arc::as_ref)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read a property.
    pub fn get(&mut self, property: &str) -> InstrumentResult<Value> {
        self.ensure_open()?;
        let descriptor = Arc::clone(self.registry.lookup(property)?);
        let command = descriptor.query_command()?;

        let response = self.adapter.ask(command)?;
        debug!(instrument = %self.name, property, command, response = %response, "Property read");
        let value = descriptor.decode_get(&response)?;

        if descriptor.checks_get_errors() {
            self.raise_device_errors()?;
        }
        Ok(value)
    }

    /// Write a property.
    pub fn set(&mut self, property: &str, value: impl Into<Value>) -> InstrumentResult<()> {
        self.ensure_open()?;
        let descriptor = Arc::clone(self.registry.lookup(property)?);
        let command = descriptor.encode_set(value.into())?;

        self.adapter.write(&command)?;
        debug!(instrument = %self.name, property, command = %command, "Property written");

        if descriptor.checks_set_errors() {
            self.raise_device_errors()?;
        }
        Ok(())
    }

    /// Read a numeric property.
    pub fn get_f64(&mut self, property: &str) -> InstrumentResult<f64> {
        let value = self.get(property)?;
        value
            .as_f64()
            .ok_or_else(|| self.type_mismatch(property, &value, ValueKind::Float))
    }

    /// Read a boolean property.
    pub fn get_bool(&mut self, property: &str) -> InstrumentResult<bool> {
        let value = self.get(property)?;
        value
            .as_bool()
            .ok_or_else(|| self.type_mismatch(property, &value, ValueKind::Bool))
    }

    /// Read a text property.
    pub fn get_string(&mut self, property: &str) -> InstrumentResult<String> {
        match self.get(property)? {
            Value::Str(text) => Ok(text),
            other => Err(self.type_mismatch(property, &other, ValueKind::Str)),
        }
    }

    /// Send a raw command.
    pub fn write(&mut self, command: &str) -> InstrumentResult<()> {
        self.ensure_open()?;
        self.adapter.write(command)?;
        debug!(instrument = %self.name, command, "Command written");
        Ok(())
    }

    /// Read a raw response.
    pub fn read(&mut self) -> InstrumentResult<String> {
        self.ensure_open()?;
        Ok(self.adapter.read()?)
    }

    /// Send a raw query and return its response.
    pub fn ask(&mut self, command: &str) -> InstrumentResult<String> {
        self.ensure_open()?;
        let response = self.adapter.ask(command)?;
        debug!(instrument = %self.name, command, response = %response, "Query answered");
        Ok(response)
    }

    /// Send a query and split its comma-separated response. Elements that
    /// parse as numbers become floats, the rest stay text.
    pub fn values(&mut self, command: &str) -> InstrumentResult<Vec<Value>> {
        let response = self.ask(command)?;
        Ok(split_values(&response))
    }

    /// Identification string (`*IDN?`).
    pub fn id(&mut self) -> InstrumentResult<String> {
        self.ask("*IDN?")
    }

    /// Reset to power-on defaults (`*RST`).
    pub fn reset(&mut self) -> InstrumentResult<()> {
        self.write("*RST")
    }

    /// Clear status and the error queue (`*CLS`).
    pub fn clear(&mut self) -> InstrumentResult<()> {
        self.write("*CLS")
    }

    /// Drain the error queue, returning every entry before the `0` terminator.
    pub fn check_errors(&mut self) -> InstrumentResult<Vec<DeviceError>> {
        let mut errors = Vec::new();
        for _ in 0..MAX_ERROR_QUEUE {
            let response = self.ask(ERROR_QUERY)?;
            let entry = parse_device_error(&response).ok_or_else(|| InstrumentError::Parse {
                command: ERROR_QUERY.to_string(),
                response: response.clone(),
                expected: ValueKind::Int,
            })?;
            if entry.code == 0 {
                return Ok(errors);
            }
            warn!(instrument = %self.name, code = entry.code, message = %entry.message, "Device error");
            errors.push(entry);
        }
        warn!(
            instrument = %self.name,
            drained = errors.len(),
            "Error queue did not report end of queue"
        );
        Ok(errors)
    }

    /// Close the adapter. Later calls are no-ops.
    pub fn close(&mut self) -> InstrumentResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.adapter.close()?;
        info!(instrument = %self.name, "Instrument closed");
        Ok(())
    }

    fn ensure_open(&self) -> InstrumentResult<()> {
        if self.closed {
            Err(InstrumentError::Transport(TransportError::NotConnected))
        } else {
            Ok(())
        }
    }

    fn raise_device_errors(&mut self) -> InstrumentResult<()> {
        let errors = self.check_errors()?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InstrumentError::Device(errors))
        }
    }

    fn type_mismatch(&self, property: &str, value: &Value, expected: ValueKind) -> InstrumentError {
        let command = self
            .registry
            .get(property)
            .and_then(|d| d.query_command().ok())
            .unwrap_or(property);
        InstrumentError::Parse {
            command: command.to_string(),
            response: value.to_string(),
            expected,
        }
    }
}

impl<A: Adapter> fmt::Debug for Instrument<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("adapter", &self.adapter.name())
            .field("properties", &self.registry.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl<A: Adapter> Drop for Instrument<A> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(instrument = %self.name, error = %e, "Failed to close instrument");
        }
    }
}

fn split_values(response: &str) -> Vec<Value> {
    response
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.parse::<f64>() {
            Ok(number) => Value::Float(number),
            Err(_) => Value::Str(item.to_string()),
        })
        .collect()
}

/// Parse `-113,"Undefined header"` into a [`DeviceError`].
fn parse_device_error(response: &str) -> Option<DeviceError> {
    let (code, message) = match response.split_once(',') {
        Some((code, message)) => (code, message),
        None => (response, ""),
    };
    let code = code.trim().parse::<i32>().ok()?;
    Some(DeviceError {
        code,
        message: message.trim().trim_matches('"').to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::property::PropertySpec;
    use tracing_test::traced_test;

    fn registry() -> Arc<PropertyRegistry> {
        PropertyRegistry::builder()
            .register("voltage", PropertySpec::measurement(":MEAS:VOLT:DC?"))
            .unwrap()
            .build()
    }

    #[test]
    fn test_parse_device_error() {
        assert_eq!(
            parse_device_error("-113,\"Undefined header\""),
            Some(DeviceError {
                code: -113,
                message: "Undefined header".into()
            })
        );
        assert_eq!(parse_device_error("0,\"No error\"").map(|e| e.code), Some(0));
        assert_eq!(parse_device_error("+0").map(|e| e.code), Some(0));
        assert_eq!(parse_device_error("garbage"), None);
    }

    #[test]
    fn test_split_values() {
        assert_eq!(
            split_values("1.5, 2E-3,OVLD"),
            vec![Value::Float(1.5), Value::Float(0.002), Value::from("OVLD")]
        );
    }

    #[test]
    fn test_debug_names_instrument_and_adapter() {
        let instrument = Instrument::new(MockAdapter::new(), "dmm", registry()).unwrap();
        let text = format!("{:?}", instrument);
        assert!(text.contains("\"dmm\""), "{}", text);
        assert!(text.contains("\"mock\""), "{}", text);
        assert!(text.contains("closed: false"), "{}", text);
    }

    #[test]
    fn test_closed_instrument_rejects_io() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let mut instrument = Instrument::new(adapter, "dmm", registry()).unwrap();
        instrument.close().unwrap();
        assert!(matches!(
            instrument.get("voltage"),
            Err(InstrumentError::Transport(TransportError::NotConnected))
        ));
        drop(instrument);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    #[traced_test]
    fn test_drop_logs_close_failure() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        let instrument = Instrument::new(adapter, "dmm", registry()).unwrap();

        handle.fail_next("port vanished");
        drop(instrument);

        assert_eq!(handle.close_count(), 1);
        assert!(logs_contain("Failed to close instrument"));
        assert!(logs_contain("port vanished"));
    }

    #[test]
    #[traced_test]
    fn test_device_errors_are_logged() {
        let adapter = MockAdapter::new();
        let handle = adapter.handle();
        handle.queue_reply("-222,\"Data out of range\"");
        handle.queue_reply("0,\"No error\"");
        let mut instrument = Instrument::new(adapter, "dmm", registry()).unwrap();

        let errors = instrument.check_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(logs_contain("Data out of range"));
    }
}
