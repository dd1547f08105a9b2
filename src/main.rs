//! CLI entry point for scpi-ctl
//!
//! Reads and writes instrument properties from the command line, using the
//! built-in Rigol DM3058 table or any model file.
//!
//! # Usage
//!
//! ```bash
//! scpi-ctl --tcp 192.168.1.50 get voltage
//! scpi-ctl --serial /dev/ttyUSB0 --baud 9600 set voltage_range 1.5
//! scpi-ctl --model psu.toml list
//! scpi-ctl --model rigol_dm3058 --json list
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use scpi_instrument::adapters::{Adapter, AdapterOptions, TcpAdapter, DEFAULT_TIMEOUT};
use scpi_instrument::config::{Settings, DEFAULT_CONFIG_PATH};
use scpi_instrument::{logging, models, Instrument, InstrumentModel, PropertyRegistry, Value};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "scpi-ctl")]
#[command(about = "Read and write SCPI instrument properties", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Model file or built-in model name (default: rigol_dm3058)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Serial port of the instrument
    #[arg(long, conflicts_with = "tcp")]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// host[:port] of a raw SCPI socket
    #[arg(long)]
    tcp: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the model's properties
    List,

    /// Read a property
    Get {
        /// Property name
        property: String,
    },

    /// Write a property
    Set {
        /// Property name
        property: String,
        /// Value (number, true/false, or text)
        value: String,
    },

    /// Send a raw query and print the response
    Ask {
        /// SCPI query
        command: String,
    },

    /// Send a raw command
    Write {
        /// SCPI command
        command: String,
    },

    /// Print the identification string
    Idn,

    /// Drain and print the error queue
    Errors,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load settings from '{}'", cli.config.display()))?;
    apply_overrides(&mut settings, &cli);
    settings.validate().map_err(|e| anyhow!(e))?;
    logging::init_from_settings(&settings).map_err(|e| anyhow!(e))?;

    let model = load_model(&settings)?;

    if let Commands::List = cli.command {
        print_properties(model.name(), model.registry(), cli.json);
        return Ok(());
    }

    let adapter = open_adapter(&settings)?;
    let mut instrument = model
        .connect_with(adapter, &settings.options)
        .with_context(|| format!("Failed to connect to {}", model.name()))?;

    let result = run(&mut instrument, cli.command, cli.json);
    instrument.close().context("Failed to close instrument")?;
    result
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(model) = &cli.model {
        settings.model = Some(model.clone());
    }
    if let Some(port) = &cli.serial {
        settings.connection.serial = Some(port.clone());
        settings.connection.tcp = None;
    }
    if let Some(address) = &cli.tcp {
        settings.connection.tcp = Some(address.clone());
        settings.connection.serial = None;
    }
    if let Some(baud) = cli.baud {
        settings.connection.baud_rate = baud;
    }
}

fn load_model(settings: &Settings) -> Result<InstrumentModel> {
    let builtin = settings
        .model
        .as_deref()
        .and_then(|path| path.to_str())
        .and_then(models::builtin);
    if let Some(model) = builtin {
        return model.context("Failed to load built-in model");
    }

    match &settings.model {
        Some(path) => InstrumentModel::from_file(path)
            .with_context(|| format!("Failed to load model '{}'", path.display())),
        None => models::rigol_dm3058().context("Failed to load built-in model"),
    }
}

fn open_adapter(settings: &Settings) -> Result<Box<dyn Adapter>> {
    let options = AdapterOptions::from_table(&settings.options).map_err(|e| anyhow!(e))?;
    let timeout = options
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT);

    if let Some(address) = &settings.connection.tcp {
        let adapter = TcpAdapter::connect(address, timeout)
            .with_context(|| format!("Failed to connect to '{}'", address))?;
        return Ok(Box::new(adapter));
    }

    if let Some(port) = &settings.connection.serial {
        return open_serial(port, settings.connection.baud_rate);
    }

    bail!("No connection configured: use --serial or --tcp")
}

#[cfg(feature = "instrument_serial")]
fn open_serial(port: &str, baud_rate: u32) -> Result<Box<dyn Adapter>> {
    use scpi_instrument::adapters::SerialAdapter;

    let adapter = SerialAdapter::new(port, baud_rate)
        .open()
        .with_context(|| format!("Failed to open serial port '{}' at {} baud", port, baud_rate))?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "instrument_serial"))]
fn open_serial(_port: &str, _baud_rate: u32) -> Result<Box<dyn Adapter>> {
    bail!("Serial support not enabled. Rebuild with --features instrument_serial")
}

fn run(instrument: &mut Instrument<Box<dyn Adapter>>, command: Commands, as_json: bool) -> Result<()> {
    match command {
        Commands::List => {
            print_properties(instrument.name(), instrument.registry(), as_json);
        }
        Commands::Get { property } => {
            let value = instrument.get(&property)?;
            if as_json {
                println!("{}", json!({ "property": property, "value": value }));
            } else {
                println!("{}", value);
            }
        }
        Commands::Set { property, value } => {
            instrument.set(&property, parse_value(&value))?;
        }
        Commands::Ask { command } => {
            let response = instrument.ask(&command)?;
            if as_json {
                println!("{}", json!({ "command": command, "response": response }));
            } else {
                println!("{}", response);
            }
        }
        Commands::Write { command } => instrument.write(&command)?,
        Commands::Idn => {
            let id = instrument.id()?;
            if as_json {
                println!("{}", json!({ "idn": id }));
            } else {
                println!("{}", id);
            }
        }
        Commands::Errors => {
            let errors = instrument.check_errors()?;
            if as_json {
                let entries: Vec<_> = errors
                    .iter()
                    .map(|e| json!({ "code": e.code, "message": e.message }))
                    .collect();
                println!("{}", json!(entries));
            } else if errors.is_empty() {
                println!("No errors");
            } else {
                for error in errors {
                    println!("{}", error);
                }
            }
        }
    }
    Ok(())
}

fn print_properties(model: &str, registry: &PropertyRegistry, as_json: bool) {
    if as_json {
        let properties: Vec<_> = registry
            .iter()
            .map(|d| {
                json!({
                    "name": d.name(),
                    "get": d.query_command().ok(),
                    "set": d.set_template(),
                    "validator": d.validator().map(|v| v.to_string()),
                    "values": d.domain(),
                    "doc": d.doc(),
                })
            })
            .collect();
        println!("{}", json!({ "model": model, "properties": properties }));
        return;
    }

    println!("{}", model);
    for d in registry.iter() {
        let access = match (d.is_readable(), d.is_writable()) {
            (true, true) => "rw",
            (true, false) => "r ",
            _ => " w",
        };
        println!("  {} {:<26} {}", access, d.name(), d.doc());
    }
}

/// Interpret a command-line value: booleans, integers and floats, else text.
fn parse_value(text: &str) -> Value {
    match text.to_ascii_lowercase().as_str() {
        "true" | "on" => return Value::Bool(true),
        "false" | "off" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = text.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::Str(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5"), Value::Float(1.5));
        assert_eq!(parse_value("2000"), Value::Int(2000));
        assert_eq!(parse_value("ON"), Value::Bool(true));
        assert_eq!(parse_value("10M"), Value::from("10M"));
    }

    #[test]
    fn test_model_by_builtin_name_or_path() {
        let mut settings = Settings::default();
        assert_eq!(load_model(&settings).unwrap().name(), "Rigol DM3058");

        settings.model = Some(PathBuf::from(models::BUILTIN_MODELS[0]));
        assert_eq!(load_model(&settings).unwrap().name(), "Rigol DM3058");

        settings.model = Some(PathBuf::from("missing/psu.toml"));
        assert!(load_model(&settings).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["scpi-ctl", "--tcp", "10.0.0.2", "set", "voltage_range", "1.5"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Set { .. }));
        assert!(Cli::try_parse_from(["scpi-ctl", "--tcp", "a", "--serial", "b", "idn"]).is_err());
    }
}
