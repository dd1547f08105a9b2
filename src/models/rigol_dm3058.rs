//! Rigol DM3058 digital multimeter.
//!
//! The command table lives in `config/instruments/rigol_dm3058.toml`; this
//! module only loads it and adds typed accessors on top.
//!
//! ```no_run
//! use scpi_instrument::adapters::TcpAdapter;
//! use scpi_instrument::models::{Function, RigolDm3058};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = TcpAdapter::connect("192.168.1.50", Duration::from_secs(2))?;
//! let mut dmm = RigolDm3058::new(adapter)?;
//! dmm.set_function(Function::Voltage)?;
//! dmm.set_voltage_range(1.5)?; // selects the 2 V range
//! println!("{} V", dmm.voltage()?);
//! # Ok(())
//! # }
//! ```

use crate::adapters::Adapter;
use crate::error::{InstrumentError, InstrumentResult};
use crate::instrument::Instrument;
use crate::model::InstrumentModel;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::OnceLock;

const MODEL_TOML: &str = include_str!("../../config/instruments/rigol_dm3058.toml");

static MODEL: OnceLock<Result<InstrumentModel, String>> = OnceLock::new();

/// The DM3058 model, built on first use and shared afterwards.
pub fn rigol_dm3058() -> InstrumentResult<InstrumentModel> {
    MODEL
        .get_or_init(|| InstrumentModel::from_toml_str(MODEL_TOML).map_err(|e| e.to_string()))
        .clone()
        .map_err(InstrumentError::Configuration)
}

/// Measurement function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// DC voltage.
    Voltage,
    /// AC voltage.
    VoltageAc,
    /// DC current.
    Current,
    /// AC current.
    CurrentAc,
    /// 2-wire resistance.
    Resistance,
    /// 4-wire resistance.
    Resistance4W,
    /// Capacitance.
    Capacitance,
    /// Continuity.
    Continuity,
    /// Diode test.
    Diode,
    /// Frequency.
    Frequency,
    /// Period.
    Period,
}

impl Function {
    /// Every function, in front-panel order.
    pub const ALL: [Function; 11] = [
        Function::Voltage,
        Function::VoltageAc,
        Function::Current,
        Function::CurrentAc,
        Function::Resistance,
        Function::Resistance4W,
        Function::Capacitance,
        Function::Continuity,
        Function::Diode,
        Function::Frequency,
        Function::Period,
    ];

    /// Name used by the `function` property.
    pub fn as_str(self) -> &'static str {
        match self {
            Function::Voltage => "voltage",
            Function::VoltageAc => "voltage ac",
            Function::Current => "current",
            Function::CurrentAc => "current ac",
            Function::Resistance => "resistance",
            Function::Resistance4W => "resistance 4W",
            Function::Capacitance => "capacitance",
            Function::Continuity => "continuity",
            Function::Diode => "diode",
            Function::Frequency => "frequency",
            Function::Period => "period",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Function {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Function::ALL
            .into_iter()
            .find(|function| function.as_str() == s)
            .ok_or_else(|| format!("unknown function '{}'", s))
    }
}

/// Typed facade over a DM3058 [`Instrument`].
///
/// Derefs to the instrument, so raw access (`ask`, `id`, `check_errors`,
/// `close`) stays available.
pub struct RigolDm3058<A: Adapter> {
    inner: Instrument<A>,
}

// Read-only numeric readings.
macro_rules! readings {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> InstrumentResult<f64> {
                self.inner.get_f64(stringify!($name))
            }
        )*
    };
}

// Auto-ranged range controls: a getter and a setter per property.
macro_rules! ranges {
    ($($(#[$doc:meta])* $name:ident / $setter:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> InstrumentResult<f64> {
                self.inner.get_f64(stringify!($name))
            }

            $(#[$doc])*
            ///
            /// The smallest range covering `value` is selected.
            pub fn $setter(&mut self, value: f64) -> InstrumentResult<()> {
                self.inner.set(stringify!($name), value)
            }
        )*
    };
}

// ON/OFF switches.
macro_rules! switches {
    ($($(#[$doc:meta])* $name:ident / $setter:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> InstrumentResult<bool> {
                self.inner.get_bool(stringify!($name))
            }

            $(#[$doc])*
            pub fn $setter(&mut self, enabled: bool) -> InstrumentResult<()> {
                self.inner.set(stringify!($name), enabled)
            }
        )*
    };
}

impl<A: Adapter> RigolDm3058<A> {
    /// Connect with the model's default options.
    pub fn new(adapter: A) -> InstrumentResult<Self> {
        Ok(Self {
            inner: rigol_dm3058()?.connect(adapter)?,
        })
    }

    /// Connect with an option bag overriding the model defaults.
    pub fn with_options(adapter: A, options: &toml::Table) -> InstrumentResult<Self> {
        Ok(Self {
            inner: rigol_dm3058()?.connect_with(adapter, options)?,
        })
    }

    /// The generic instrument.
    pub fn into_inner(self) -> Instrument<A> {
        self.inner
    }

    /// Current measurement function.
    pub fn function(&mut self) -> InstrumentResult<Function> {
        let name = self.inner.get_string("function")?;
        name.parse().map_err(|message| InstrumentError::Process {
            property: "function".to_string(),
            message,
        })
    }

    /// Select the measurement function.
    pub fn set_function(&mut self, function: Function) -> InstrumentResult<()> {
        self.inner.set("function", function.as_str())
    }

    /// Whether new data is available.
    pub fn measurement_available(&mut self) -> InstrumentResult<bool> {
        self.inner.get_bool("measurement_available")
    }

    /// Enable or disable auto range.
    pub fn set_measurement_auto_range(&mut self, auto: bool) -> InstrumentResult<()> {
        self.inner.set("measurement_auto_range", auto)
    }

    /// DC input impedance, `10M` or `10G`.
    pub fn voltage_impedance(&mut self) -> InstrumentResult<String> {
        self.inner.get_string("voltage_impedance")
    }

    /// Set the DC input impedance, `10M` or `10G`.
    pub fn set_voltage_impedance(&mut self, impedance: &str) -> InstrumentResult<()> {
        self.inner.set("voltage_impedance", impedance)
    }

    /// Set the continuity threshold, 10 to 2000 Ohm.
    pub fn set_continuity_limit(&mut self, ohms: f64) -> InstrumentResult<()> {
        self.inner.set("continuity_limit", ohms)
    }

    readings! {
        /// DC voltage in V.
        voltage,
        /// AC voltage in Vrms.
        voltage_ac,
        /// DC current in A.
        current,
        /// AC current in A.
        current_ac,
        /// 2-wire resistance in Ohm.
        resistance,
        /// 4-wire resistance in Ohm.
        resistance_4w,
        /// Frequency in Hz.
        frequency,
        /// Period in s.
        period,
        /// Continuity resistance in Ohm.
        continuity,
        /// Diode forward voltage in V.
        diode,
        /// Capacitance in F.
        capacitance,
    }

    ranges! {
        /// DC voltage range in V.
        voltage_range / set_voltage_range,
        /// AC voltage range in V.
        voltage_ac_range / set_voltage_ac_range,
        /// DC current range in A.
        current_range / set_current_range,
        /// AC current range in A.
        current_ac_range / set_current_ac_range,
        /// 2-wire resistance range in Ohm.
        resistance_range / set_resistance_range,
        /// 4-wire resistance range in Ohm.
        resistance_4w_range / set_resistance_4w_range,
        /// Voltage range of frequency measurements in V.
        frequency_voltage_range / set_frequency_voltage_range,
        /// Voltage range of period measurements in V.
        period_voltage_range / set_period_voltage_range,
        /// Capacitance range in F.
        capacitance_range / set_capacitance_range,
    }

    switches! {
        /// DC voltage filter.
        voltage_filter / set_voltage_filter,
        /// DC current filter.
        current_filter / set_current_filter,
    }
}

impl<A: Adapter> Deref for RigolDm3058<A> {
    type Target = Instrument<A>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<A: Adapter> DerefMut for RigolDm3058<A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loads() {
        let model = rigol_dm3058().unwrap();
        assert_eq!(model.name(), "Rigol DM3058");
        assert_eq!(model.registry().len(), 27);
        assert!(model.registry().get("continuity_limit").is_some());
    }

    #[test]
    fn test_function_names_round_trip() {
        for function in Function::ALL {
            assert_eq!(function.as_str().parse::<Function>(), Ok(function));
        }
        assert!("ohms".parse::<Function>().is_err());
    }
}
