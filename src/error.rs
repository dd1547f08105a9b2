//! Custom error types for the instrument-control core.
//!
//! `InstrumentError` is the single error type returned by property dispatch and
//! instrument construction. It follows the layering of the system:
//!
//! - **Local, before any I/O**: `InvalidValue` (a strict validator rejected the
//!   value), `ReadOnly` / `WriteOnly` (unsupported direction), `UnknownProperty`
//!   and `Format`. None of these ever reach the transport, so no malformed
//!   command is sent to the device.
//! - **Transport**: `Transport` wraps [`TransportError`] from the adapter
//!   unchanged. The core neither retries nor masks it: re-sending a set command
//!   to lab hardware is not something to do behind the caller's back.
//! - **Decoding**: `Parse`, `UnmappedResponse` and `Process` for responses that
//!   do not fit the property's declared type, map or transform.
//! - **Setup**: `Configuration` for unknown instrument options, contradictory
//!   property descriptors and unreadable model files.
//! - **Device**: `Device` carries entries drained from the instrument error
//!   queue when error checking is enabled on a property.

use crate::adapters::TransportError;
use crate::template::TemplateError;
use crate::validators::ValidationError;
use crate::value::{Value, ValueKind};
use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the instrument error type.
pub type InstrumentResult<T> = std::result::Result<T, InstrumentError>;

/// One entry of the instrument's `SYST:ERR?` queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// Numeric error code (negative codes are SCPI standard errors).
    pub code: i32,
    /// Message reported by the device.
    pub message: String,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, \"{}\"", self.code, self.message)
    }
}

/// Errors raised by property dispatch and instrument setup.
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("Invalid value for '{property}': {source}")]
    InvalidValue {
        property: String,
        #[source]
        source: ValidationError,
    },

    #[error("Property '{0}' is read-only")]
    ReadOnly(String),

    #[error("Property '{0}' is write-only")]
    WriteOnly(String),

    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cannot parse response '{response}' to '{command}' as {expected}")]
    Parse {
        command: String,
        response: String,
        expected: ValueKind,
    },

    #[error("Property '{property}' received unmapped response {response}")]
    UnmappedResponse { property: String, response: Value },

    #[error("Transform failed for '{property}': {message}")]
    Process { property: String, message: String },

    #[error("Cannot format command for '{property}': {source}")]
    Format {
        property: String,
        #[source]
        source: TemplateError,
    },

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Device reported errors: {}", join_device_errors(.0))]
    Device(Vec<DeviceError>),
}

impl InstrumentError {
    /// Shorthand for [`InstrumentError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        InstrumentError::Configuration(message.into())
    }

    /// Whether the error was raised locally, before any I/O took place.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            InstrumentError::InvalidValue { .. }
                | InstrumentError::ReadOnly(_)
                | InstrumentError::WriteOnly(_)
                | InstrumentError::UnknownProperty(_)
                | InstrumentError::Format { .. }
                | InstrumentError::Configuration(_)
        )
    }
}

fn join_device_errors(errors: &[DeviceError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
