//! Property dispatch through a mock adapter.
//!
//! Covers the full get/set path: registry lookup, validation, value maps,
//! transforms, formatting and the resulting wire traffic.

use scpi_instrument::adapters::{MockAdapter, MockHandle, MockIo, TransportError};
use scpi_instrument::{
    Instrument, InstrumentError, Process, PropertyRegistry, PropertySpec, Validator, Value,
    ValueKind,
};
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

fn registry() -> Arc<PropertyRegistry> {
    PropertyRegistry::builder()
        .register(
            "voltage_range",
            PropertySpec::control(":MEAS:VOLT:DC:RANG?", ":MEAS:VOLT:DC %s").with_map(
                Validator::TruncatedDiscreteSet,
                [(0.2, 0), (2.0, 1), (20.0, 2)],
            ),
        )
        .and_then(|b| {
            b.register(
                "continuity",
                PropertySpec::measurement(":MEAS:CONT?").with_get_process(Process::Truthy),
            )
        })
        .and_then(|b| {
            b.register(
                "continuity_limit",
                PropertySpec::setting(":MEAS:CONT %s")
                    .with_validator(Validator::StrictRange, [10, 2000]),
            )
        })
        .and_then(|b| {
            b.register(
                "trigger_source",
                PropertySpec::control("TRIG:SOUR?", "TRIG:SOUR %s")
                    .with_kind(ValueKind::Str)
                    .with_map(
                        Validator::StrictDiscreteSet,
                        [("immediate", "IMM"), ("bus", "BUS"), ("external", "EXT")],
                    ),
            )
        })
        .and_then(|b| {
            b.register(
                "output",
                PropertySpec::control("OUTP?", "OUTP %s")
                    .with_kind(ValueKind::Bool)
                    .with_error_checks(false, true),
            )
        })
        .unwrap()
        .build()
}

fn connect() -> (Instrument<MockAdapter>, MockHandle) {
    let adapter = MockAdapter::new();
    let handle = adapter.handle();
    let instrument = Instrument::new(adapter, "test instrument", registry()).unwrap();
    (instrument, handle)
}

// =============================================================================
// Set path
// =============================================================================

#[test]
fn test_auto_range_sends_mapped_index() {
    let (mut instrument, handle) = connect();

    instrument.set("voltage_range", 1.5).unwrap();

    assert_eq!(handle.writes(), vec![":MEAS:VOLT:DC 1".to_string()]);
}

#[test]
fn test_rejected_value_sends_nothing() {
    let (mut instrument, handle) = connect();

    let err = instrument.set("continuity_limit", 5).unwrap_err();

    assert!(matches!(err, InstrumentError::InvalidValue { .. }));
    assert!(err.is_local());
    assert!(handle.writes().is_empty());
}

#[test]
fn test_set_on_measurement_is_read_only() {
    let (mut instrument, handle) = connect();

    let err = instrument.set("continuity", 1).unwrap_err();

    assert!(matches!(err, InstrumentError::ReadOnly(ref name) if name == "continuity"));
    assert!(handle.log().is_empty());
}

// =============================================================================
// Get path
// =============================================================================

#[test]
fn test_continuity_response_is_truthy() {
    let (mut instrument, handle) = connect();
    handle.respond_to(":MEAS:CONT?", "1");

    assert_eq!(instrument.get("continuity").unwrap(), Value::Bool(true));
    assert_eq!(
        handle.log(),
        vec![
            MockIo::Write(":MEAS:CONT?".into()),
            MockIo::Read("1".into())
        ]
    );
}

#[test]
fn test_get_on_setting_is_write_only() {
    let (mut instrument, handle) = connect();

    let err = instrument.get("continuity_limit").unwrap_err();

    assert!(matches!(err, InstrumentError::WriteOnly(_)));
    assert!(handle.log().is_empty());
}

#[test]
fn test_map_round_trip() {
    let (mut instrument, handle) = connect();

    for (semantic, wire) in [("immediate", "IMM"), ("bus", "BUS"), ("external", "EXT")] {
        instrument.set("trigger_source", semantic).unwrap();
        assert_eq!(handle.writes().last().unwrap(), &format!("TRIG:SOUR {}", wire));

        handle.respond_to("TRIG:SOUR?", wire);
        assert_eq!(instrument.get("trigger_source").unwrap(), Value::from(semantic));
    }
}

#[test]
fn test_numeric_map_round_trip() {
    let (mut instrument, handle) = connect();

    instrument.set("voltage_range", 20.0).unwrap();
    assert_eq!(handle.writes(), vec![":MEAS:VOLT:DC 2".to_string()]);

    // instruments often answer integers in exponent form
    handle.respond_to(":MEAS:VOLT:DC:RANG?", "2.000000E+00");
    assert_eq!(instrument.get_f64("voltage_range").unwrap(), 20.0);
}

#[test]
fn test_unmapped_response() {
    let (mut instrument, handle) = connect();
    handle.respond_to("TRIG:SOUR?", "TIM");

    assert!(matches!(
        instrument.get("trigger_source"),
        Err(InstrumentError::UnmappedResponse { .. })
    ));
}

#[test]
fn test_parse_error_surfaces() {
    let (mut instrument, handle) = connect();
    handle.respond_to("OUTP?", "maybe");

    let err = instrument.get("output").unwrap_err();

    assert!(matches!(
        err,
        InstrumentError::Parse {
            expected: ValueKind::Bool,
            ..
        }
    ));
}

// =============================================================================
// Errors and passthroughs
// =============================================================================

#[test]
fn test_unknown_property() {
    let (mut instrument, _handle) = connect();
    assert!(matches!(
        instrument.get("power"),
        Err(InstrumentError::UnknownProperty(_))
    ));
}

#[test]
fn test_transport_errors_propagate_unchanged() {
    let (mut instrument, handle) = connect();

    // no reply scripted: the mock times out like a silent instrument
    assert!(matches!(
        instrument.get("continuity"),
        Err(InstrumentError::Transport(TransportError::Timeout))
    ));

    handle.fail_next("cable unplugged");
    let err = instrument.set("voltage_range", 2.0).unwrap_err();
    assert!(matches!(
        err,
        InstrumentError::Transport(TransportError::ConnectionFailed(ref m)) if m == "cable unplugged"
    ));
    // no retry
    assert!(handle.writes().iter().all(|w| w != ":MEAS:VOLT:DC 1"));
}

#[test]
fn test_set_checks_error_queue_when_enabled() {
    let (mut instrument, handle) = connect();
    handle.queue_reply("-222,\"Data out of range\"");
    handle.queue_reply("0,\"No error\"");

    let err = instrument.set("output", true).unwrap_err();

    match err {
        InstrumentError::Device(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].code, -222);
            assert_eq!(errors[0].message, "Data out of range");
        }
        other => panic!("expected device error, got {:?}", other),
    }
    assert_eq!(
        handle.writes(),
        vec!["OUTP 1".to_string(), "SYST:ERR?".to_string(), "SYST:ERR?".to_string()]
    );
}

#[test]
fn test_common_commands() {
    let (mut instrument, handle) = connect();
    handle.respond_to("*IDN?", "Rigol Technologies,DM3058,DM3L000000001,01.01.00.02.02.00");
    handle.respond_to("READ?", "1.5,2.5,OVLD");

    assert!(instrument.id().unwrap().contains("DM3058"));
    instrument.reset().unwrap();
    instrument.clear().unwrap();
    assert_eq!(
        instrument.values("READ?").unwrap(),
        vec![Value::Float(1.5), Value::Float(2.5), Value::from("OVLD")]
    );
    assert_eq!(
        handle.writes(),
        vec!["*IDN?", "*RST", "*CLS", "READ?"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_properties_listed_in_declaration_order() {
    let (instrument, _handle) = connect();
    assert_eq!(
        instrument.properties().collect::<Vec<_>>(),
        vec![
            "voltage_range",
            "continuity",
            "continuity_limit",
            "trigger_source",
            "output"
        ]
    );
    let descriptor = instrument.describe("continuity_limit").unwrap();
    assert!(descriptor.is_writable());
    assert!(!descriptor.is_readable());
}

#[test]
fn test_non_finite_value_never_reaches_transport() {
    let registry = PropertyRegistry::builder()
        .register(
            "voltage_limit",
            PropertySpec::setting("VOLT %s").with_validator(Validator::TruncatedRange, [0.0, 30.0]),
        )
        .unwrap()
        .build();
    let adapter = MockAdapter::new();
    let handle = adapter.handle();
    let mut instrument = Instrument::new(adapter, "psu", registry).unwrap();

    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let err = instrument.set("voltage_limit", value).unwrap_err();
        assert!(matches!(err, InstrumentError::InvalidValue { .. }), "{:?}", err);
    }
    instrument.set("voltage_limit", 45.0).unwrap();
    assert_eq!(handle.writes(), vec!["VOLT 30".to_string()]);
}

#[test]
fn test_text_map_without_text_kind_fails_registration() {
    let result = PropertyRegistry::builder().register(
        "trigger_source",
        PropertySpec::control("TRIG?", "TRIG %s")
            .with_map(Validator::StrictDiscreteSet, [("immediate", "IMM"), ("bus", "BUS")]),
    );
    assert!(matches!(result, Err(InstrumentError::Configuration(_))));
}

#[test]
fn test_printf_flags_in_set_templates() {
    let registry = PropertyRegistry::builder()
        .register("frequency", PropertySpec::setting("FREQ %0.3f"))
        .and_then(|b| b.register("offset", PropertySpec::setting("OFFS %+.2e")))
        .unwrap()
        .build();
    let adapter = MockAdapter::new();
    let handle = adapter.handle();
    let mut instrument = Instrument::new(adapter, "generator", registry).unwrap();

    instrument.set("frequency", 1000.0).unwrap();
    instrument.set("offset", 0.5).unwrap();
    assert_eq!(
        handle.writes(),
        vec!["FREQ 1000.000".to_string(), "OFFS +5.00e-1".to_string()]
    );
}
