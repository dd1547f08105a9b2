//! Built-in instrument models.
//!
//! Each model is a TOML command table compiled into the binary, loaded once
//! and shared, plus a typed facade over the generic [`Instrument`](crate::Instrument).

pub mod rigol_dm3058;

pub use rigol_dm3058::{rigol_dm3058, Function, RigolDm3058};

use crate::error::InstrumentResult;
use crate::model::InstrumentModel;

/// Names accepted by [`builtin`].
pub const BUILTIN_MODELS: &[&str] = &["rigol_dm3058"];

/// Look up a built-in model by its short name, as accepted by `--model`.
pub fn builtin(name: &str) -> Option<InstrumentResult<InstrumentModel>> {
    match name {
        "rigol_dm3058" | "dm3058" => Some(rigol_dm3058()),
        _ => None,
    }
}
