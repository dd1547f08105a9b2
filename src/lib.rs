//! # SCPI instrument control
//!
//! A device-driver core for bench instruments that speak SCPI. Human-readable
//! property names are bound to ASCII query/write commands, value validators and
//! value transforms; the per-model command tables are plain configuration data.
//!
//! ## Crate Structure
//!
//! - **`value`**: the scalar [`Value`] exchanged with the engine and the
//!   [`ValueKind`] responses are parsed as.
//! - **`validators`**: the four validation policies (strict/truncated discrete
//!   set, strict/truncated range).
//! - **`template`**: printf-style command templates.
//! - **`process`**: value transforms applied after parsing or before formatting.
//! - **`property`**: [`PropertySpec`] (configuration) and the immutable
//!   [`PropertyDescriptor`] built from it at registration.
//! - **`registry`**: the shared name → descriptor table.
//! - **`instrument`**: [`Instrument`], which owns one adapter and performs
//!   get/set dispatch.
//! - **`model`**: TOML model files and [`InstrumentModel`].
//! - **`models`**: built-in models (Rigol DM3058).
//! - **`adapters`**: the [`Adapter`](adapters::Adapter) trait and the mock,
//!   serial and TCP transports.
//! - **`config`** / **`logging`**: settings and tracing setup for binaries.
//! - **`error`**: [`InstrumentError`], the single error type of the core.
//!
//! ## Example
//!
//! ```
//! use scpi_instrument::adapters::MockAdapter;
//! use scpi_instrument::{PropertyRegistry, PropertySpec, Instrument, Validator};
//!
//! # fn main() -> Result<(), scpi_instrument::InstrumentError> {
//! let registry = PropertyRegistry::builder()
//!     .register(
//!         "voltage_range",
//!         PropertySpec::control(":MEAS:VOLT:DC:RANG?", ":MEAS:VOLT:DC %s")
//!             .with_map(Validator::TruncatedDiscreteSet, [(0.2, 0), (2.0, 1), (20.0, 2)]),
//!     )?
//!     .build();
//!
//! let adapter = MockAdapter::new();
//! let handle = adapter.handle();
//! let mut dmm = Instrument::new(adapter, "dmm", registry)?;
//! dmm.set("voltage_range", 1.5)?;
//! assert_eq!(handle.writes(), vec![":MEAS:VOLT:DC 1".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod model;
pub mod models;
pub mod process;
pub mod property;
pub mod registry;
pub mod template;
pub mod validators;
pub mod value;

pub use error::{DeviceError, InstrumentError, InstrumentResult};
pub use instrument::Instrument;
pub use model::{InstrumentModel, ModelConfig};
pub use process::Process;
pub use property::{Domain, PropertyDescriptor, PropertySpec};
pub use registry::{PropertyRegistry, RegistryBuilder};
pub use validators::{ValidationError, Validator};
pub use value::{Value, ValueKind};
