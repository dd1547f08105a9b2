//! Property descriptors: the binding of a human-readable name to its command
//! templates, validation policy, value map and transforms.
//!
//! A [`PropertySpec`] is the configuration form (deserialized from a model
//! file or assembled in code). Registration turns it into an immutable
//! [`PropertyDescriptor`], checking every consistency rule up front so that a
//! contradictory table fails when the model is loaded rather than when a
//! command is first sent.
//!
//! Descriptors expose the pure halves of dispatch, [`PropertyDescriptor::encode_set`],
//! [`PropertyDescriptor::query_command`] and [`PropertyDescriptor::decode_get`],
//! so formatting and parsing can be tested without an adapter.

use crate::error::{InstrumentError, InstrumentResult};
use crate::process::Process;
use crate::template::CommandTemplate;
use crate::validators::{ValidationError, Validator};
use crate::value::{Value, ValueKey, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Allowed values of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Domain {
    /// Discrete members, or `[low, high]` for range validators.
    List(Vec<Value>),
    /// `(semantic, wire)` pairs, in declaration order.
    Map(Vec<(Value, Value)>),
}

/// Configuration of one property.
///
/// In a model file:
///
/// ```toml
/// [properties.voltage_range]
/// get = ":MEAS:VOLT:DC:RANG?"
/// set = ":MEAS:VOLT:DC %s"
/// validator = "truncated_discrete_set"
/// values = [[0.2, 0], [2.0, 1], [20.0, 2]]
/// map_values = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySpec {
    /// Fixed query command; absent for write-only properties.
    pub get: Option<String>,
    /// Set template with one placeholder; absent for read-only properties.
    pub set: Option<String>,
    /// Validation policy applied before every set.
    pub validator: Option<Validator>,
    /// Domain the validator checks against.
    pub values: Option<Domain>,
    /// Send the mapped wire value instead of the validated value.
    #[serde(default)]
    pub map_values: bool,
    /// Transform applied to parsed responses.
    pub get_process: Option<Process>,
    /// Transform applied to validated values before formatting.
    pub set_process: Option<Process>,
    /// Scalar type responses are parsed as.
    #[serde(default)]
    pub kind: ValueKind,
    /// Human-readable description.
    #[serde(default)]
    pub doc: String,
    /// Drain the error queue after each get.
    #[serde(default)]
    pub check_get_errors: bool,
    /// Drain the error queue after each set.
    #[serde(default)]
    pub check_set_errors: bool,
}

impl PropertySpec {
    /// Readable and writable property.
    pub fn control(get: &str, set: &str) -> Self {
        Self {
            get: Some(get.to_string()),
            set: Some(set.to_string()),
            ..Default::default()
        }
    }

    /// Read-only reading, never validated.
    pub fn measurement(get: &str) -> Self {
        Self {
            get: Some(get.to_string()),
            ..Default::default()
        }
    }

    /// Write-only property.
    pub fn setting(set: &str) -> Self {
        Self {
            set: Some(set.to_string()),
            ..Default::default()
        }
    }

    /// Validate against a list domain.
    pub fn with_validator<V, I>(mut self, validator: Validator, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.validator = Some(validator);
        self.values = Some(Domain::List(values.into_iter().map(Into::into).collect()));
        self
    }

    /// Validate against the keys of a map and send the mapped wire values.
    pub fn with_map<K, W, I>(mut self, validator: Validator, pairs: I) -> Self
    where
        K: Into<Value>,
        W: Into<Value>,
        I: IntoIterator<Item = (K, W)>,
    {
        self.validator = Some(validator);
        self.values = Some(Domain::Map(
            pairs.into_iter().map(|(k, w)| (k.into(), w.into())).collect(),
        ));
        self.map_values = true;
        self
    }

    /// Transform parsed responses.
    pub fn with_get_process(mut self, process: Process) -> Self {
        self.get_process = Some(process);
        self
    }

    /// Transform values before formatting.
    pub fn with_set_process(mut self, process: Process) -> Self {
        self.set_process = Some(process);
        self
    }

    /// Parse responses as `kind`.
    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a description.
    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    /// Drain the error queue after gets and/or sets.
    pub fn with_error_checks(mut self, get: bool, set: bool) -> Self {
        self.check_get_errors = get;
        self.check_set_errors = set;
        self
    }
}

/// Bijective semantic/wire table with O(1) lookup in both directions.
#[derive(Debug, Clone)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
    forward: HashMap<ValueKey, usize>,
    reverse: HashMap<ValueKey, usize>,
}

impl ValueMap {
    /// Build the table, rejecting duplicate semantic or wire values.
    pub fn new(entries: Vec<(Value, Value)>) -> Result<Self, String> {
        let mut forward = HashMap::with_capacity(entries.len());
        let mut reverse = HashMap::with_capacity(entries.len());
        for (index, (semantic, wire)) in entries.iter().enumerate() {
            if forward.insert(semantic.key(), index).is_some() {
                return Err(format!("value map has duplicate key {}", semantic));
            }
            if reverse.insert(wire.key(), index).is_some() {
                return Err(format!("value map is not invertible: {} appears twice", wire));
            }
        }
        Ok(Self {
            entries,
            forward,
            reverse,
        })
    }

    /// Wire value for a semantic value.
    pub fn to_wire(&self, semantic: &Value) -> Option<&Value> {
        self.forward
            .get(&semantic.key())
            .map(|&index| &self.entries[index].1)
    }

    /// Semantic value for a wire value.
    pub fn from_wire(&self, wire: &Value) -> Option<&Value> {
        self.reverse
            .get(&wire.key())
            .map(|&index| &self.entries[index].0)
    }

    /// Semantic values in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Pairs in declaration order.
    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }
}

/// Immutable, validated property binding.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    get_command: Option<String>,
    set_command: Option<CommandTemplate>,
    validator: Option<Validator>,
    domain: Vec<Value>,
    map: Option<ValueMap>,
    get_process: Option<Process>,
    set_process: Option<Process>,
    kind: ValueKind,
    doc: String,
    check_get_errors: bool,
    check_set_errors: bool,
}

impl PropertyDescriptor {
    /// Check `spec` and build the descriptor.
    pub fn from_spec(name: &str, spec: PropertySpec) -> InstrumentResult<Self> {
        let invalid = |reason: String| {
            InstrumentError::configuration(format!("property '{}': {}", name, reason))
        };

        if spec.get.is_none() && spec.set.is_none() {
            return Err(invalid("needs a get or a set command".into()));
        }
        if spec.map_values && (spec.get_process.is_some() || spec.set_process.is_some()) {
            return Err(invalid(
                "map_values cannot be combined with get_process or set_process".into(),
            ));
        }

        let get_command = spec
            .get
            .as_deref()
            .map(|source| {
                CommandTemplate::parse_with_placeholders(source, 0)
                    .and_then(|t| t.render_fixed())
                    .map_err(|e| invalid(e.to_string()))
            })
            .transpose()?;
        let set_command = spec
            .set
            .as_deref()
            .map(|source| {
                CommandTemplate::parse_with_placeholders(source, 1)
                    .map_err(|e| invalid(e.to_string()))
            })
            .transpose()?;

        if spec.map_values && spec.values.is_none() {
            return Err(invalid("map_values requires a map of values".into()));
        }
        let (domain, map) = match spec.values {
            None => (Vec::new(), None),
            Some(Domain::List(values)) => {
                if spec.map_values {
                    return Err(invalid("map_values requires a map of values".into()));
                }
                (values, None)
            }
            Some(Domain::Map(pairs)) => {
                if !spec.map_values {
                    return Err(invalid("a map of values requires map_values = true".into()));
                }
                let map = ValueMap::new(pairs).map_err(invalid)?;
                if get_command.is_some() {
                    check_wire_kind(&map, spec.kind).map_err(invalid)?;
                }
                (map.keys().cloned().collect(), Some(map))
            }
        };
        match spec.validator {
            None if !domain.is_empty() || map.is_some() => {
                return Err(invalid("values are declared without a validator".into()));
            }
            None => {}
            Some(validator) => check_domain(validator, &domain, map.is_some()).map_err(invalid)?,
        }

        Ok(Self {
            name: name.to_string(),
            get_command,
            set_command,
            validator: spec.validator,
            domain,
            map,
            get_process: spec.get_process,
            set_process: spec.set_process,
            kind: spec.kind,
            doc: spec.doc,
            check_get_errors: spec.check_get_errors,
            check_set_errors: spec.check_set_errors,
        })
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description from the command table.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Response kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Validation policy, if any.
    pub fn validator(&self) -> Option<Validator> {
        self.validator
    }

    /// Validation domain (map keys for mapped properties).
    pub fn domain(&self) -> &[Value] {
        &self.domain
    }

    /// Semantic/wire table of a mapped property.
    pub fn value_map(&self) -> Option<&ValueMap> {
        self.map.as_ref()
    }

    /// Whether the property can be read.
    pub fn is_readable(&self) -> bool {
        self.get_command.is_some()
    }

    /// Whether the property can be written.
    pub fn is_writable(&self) -> bool {
        self.set_command.is_some()
    }

    /// Set template as written in the table.
    pub fn set_template(&self) -> Option<&str> {
        self.set_command.as_ref().map(CommandTemplate::source)
    }

    pub(crate) fn checks_get_errors(&self) -> bool {
        self.check_get_errors
    }

    pub(crate) fn checks_set_errors(&self) -> bool {
        self.check_set_errors
    }

    /// Query to send for a get.
    pub fn query_command(&self) -> InstrumentResult<&str> {
        self.get_command
            .as_deref()
            .ok_or_else(|| InstrumentError::WriteOnly(self.name.clone()))
    }

    /// Validate `value` and format the set command.
    ///
    /// Fails locally, without I/O, for read-only properties, rejected values
    /// and values the template cannot render.
    pub fn encode_set(&self, value: Value) -> InstrumentResult<String> {
        let template = self
            .set_command
            .as_ref()
            .ok_or_else(|| InstrumentError::ReadOnly(self.name.clone()))?;

        let validated = match self.validator {
            Some(validator) => validator
                .apply(value, &self.domain)
                .map_err(|source| self.invalid_value(source))?,
            None => value,
        };

        let wire = if let Some(map) = &self.map {
            match map.to_wire(&validated) {
                Some(wire) => wire.clone(),
                None => {
                    return Err(self.invalid_value(ValidationError::NotInSet {
                        allowed: join(&self.domain),
                        value: validated,
                    }))
                }
            }
        } else if let Some(process) = &self.set_process {
            process.apply(validated).map_err(|message| InstrumentError::Process {
                property: self.name.clone(),
                message,
            })?
        } else {
            validated
        };

        template
            .render(&wire)
            .map_err(|source| InstrumentError::Format {
                property: self.name.clone(),
                source,
            })
    }

    /// Parse a response to [`query_command`](Self::query_command).
    pub fn decode_get(&self, response: &str) -> InstrumentResult<Value> {
        let command = self.query_command()?;
        let parsed = self.kind.parse(response).ok_or_else(|| InstrumentError::Parse {
            command: command.to_string(),
            response: response.to_string(),
            expected: self.kind,
        })?;

        if let Some(map) = &self.map {
            map.from_wire(&parsed)
                .cloned()
                .ok_or_else(|| InstrumentError::UnmappedResponse {
                    property: self.name.clone(),
                    response: parsed,
                })
        } else if let Some(process) = &self.get_process {
            process.apply(parsed).map_err(|message| InstrumentError::Process {
                property: self.name.clone(),
                message,
            })
        } else {
            Ok(parsed)
        }
    }

    fn invalid_value(&self, source: ValidationError) -> InstrumentError {
        InstrumentError::InvalidValue {
            property: self.name.clone(),
            source,
        }
    }
}

/// Every wire value must survive parsing as `kind`, or no response could be
/// mapped back.
fn check_wire_kind(map: &ValueMap, kind: ValueKind) -> Result<(), String> {
    for (_, wire) in map.entries() {
        let parsed = kind.parse(&wire.to_string());
        if parsed.map(|p| p.key()) != Some(wire.key()) {
            return Err(format!(
                "wire value {} cannot be read back as {}, set kind to match",
                wire, kind
            ));
        }
    }
    Ok(())
}

fn check_domain(validator: Validator, domain: &[Value], mapped: bool) -> Result<(), String> {
    if domain.is_empty() {
        return Err(format!("{} requires values", validator));
    }
    if mapped && validator.is_range() {
        return Err(format!("{} cannot be used with a map of values", validator));
    }
    if validator.requires_numeric() {
        if let Some(bad) = domain.iter().find(|v| !v.is_numeric()) {
            return Err(format!("{} requires numeric values, found {}", validator, bad));
        }
    }
    if validator.is_range() {
        let [low, high] = domain else {
            return Err(format!(
                "{} requires exactly two bounds, found {}",
                validator,
                domain.len()
            ));
        };
        if low > high {
            return Err(format!("range bounds out of order: [{}, {}]", low, high));
        }
    }
    Ok(())
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voltage_range() -> PropertyDescriptor {
        PropertyDescriptor::from_spec(
            "voltage_range",
            PropertySpec::control(":MEAS:VOLT:DC:RANG?", ":MEAS:VOLT:DC %s").with_map(
                Validator::TruncatedDiscreteSet,
                [(0.2, 0), (2.0, 1), (20.0, 2)],
            ),
        )
        .unwrap()
    }

    fn rejects(name: &str, spec: PropertySpec) -> String {
        match PropertyDescriptor::from_spec(name, spec) {
            Err(InstrumentError::Configuration(message)) => message,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_auto_range_is_mapped_to_wire_index() {
        let d = voltage_range();
        assert_eq!(d.encode_set(Value::Float(1.5)).unwrap(), ":MEAS:VOLT:DC 1");
        assert_eq!(d.encode_set(Value::Float(50.0)).unwrap(), ":MEAS:VOLT:DC 2");
        assert_eq!(d.decode_get("1").unwrap(), Value::Float(2.0));
        assert!(matches!(
            d.decode_get("7"),
            Err(InstrumentError::UnmappedResponse { .. })
        ));
    }

    #[test]
    fn test_direction_errors() {
        let reading = PropertyDescriptor::from_spec(
            "voltage",
            PropertySpec::measurement(":MEAS:VOLT:DC?"),
        )
        .unwrap();
        assert!(matches!(
            reading.encode_set(Value::Int(1)),
            Err(InstrumentError::ReadOnly(_))
        ));

        let limit = PropertyDescriptor::from_spec(
            "continuity_limit",
            PropertySpec::setting(":MEAS:CONT %s")
                .with_validator(Validator::StrictRange, [10, 2000]),
        )
        .unwrap();
        assert!(matches!(
            limit.query_command(),
            Err(InstrumentError::WriteOnly(_))
        ));
        assert!(matches!(
            limit.decode_get("10"),
            Err(InstrumentError::WriteOnly(_))
        ));
        assert!(matches!(
            limit.encode_set(Value::Int(5)),
            Err(InstrumentError::InvalidValue { .. })
        ));
        assert_eq!(limit.encode_set(Value::Int(500)).unwrap(), ":MEAS:CONT 500");
    }

    #[test]
    fn test_processes_apply_in_both_directions() {
        let filter = PropertyDescriptor::from_spec(
            "voltage_filter",
            PropertySpec::control(":MEAS:VOLT:DC:FILT?", ":MEAS:VOLT:DC:FILT %s")
                .with_kind(ValueKind::Str)
                .with_get_process(Process::equals("ON"))
                .with_set_process(Process::choose("ON", "OFF")),
        )
        .unwrap();
        assert_eq!(
            filter.encode_set(Value::Bool(false)).unwrap(),
            ":MEAS:VOLT:DC:FILT OFF"
        );
        assert_eq!(filter.decode_get("ON").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_parse_error_names_command() {
        let d = PropertyDescriptor::from_spec("voltage", PropertySpec::measurement(":MEAS:VOLT:DC?"))
            .unwrap();
        let err = d.decode_get("overload").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot parse response 'overload' to ':MEAS:VOLT:DC?' as float"
        );
    }

    #[test]
    fn test_registration_invariants() {
        assert!(rejects("empty", PropertySpec::default()).contains("get or a set"));

        let both = PropertySpec::control("R?", "R %s")
            .with_map(Validator::StrictDiscreteSet, [("a", 1)])
            .with_get_process(Process::Truthy);
        assert!(rejects("both", both).contains("map_values"));

        let not_bijective = PropertySpec::control("R?", "R %s")
            .with_map(Validator::StrictDiscreteSet, [("a", 1), ("b", 1)]);
        assert!(rejects("dup", not_bijective).contains("not invertible"));

        let mut unmapped = PropertySpec::control("R?", "R %s")
            .with_map(Validator::StrictDiscreteSet, [("a", 1)]);
        unmapped.map_values = false;
        assert!(rejects("unmapped", unmapped).contains("map_values = true"));

        let mut list_mapped =
            PropertySpec::control("R?", "R %s").with_validator(Validator::StrictDiscreteSet, [1]);
        list_mapped.map_values = true;
        assert!(rejects("list", list_mapped).contains("requires a map"));

        let mut no_validator =
            PropertySpec::control("R?", "R %s").with_validator(Validator::StrictDiscreteSet, [1]);
        no_validator.validator = None;
        assert!(rejects("nv", no_validator).contains("without a validator"));

        let no_values = PropertySpec {
            validator: Some(Validator::StrictRange),
            ..PropertySpec::setting("R %s")
        };
        assert!(rejects("nd", no_values).contains("requires values"));

        let reversed =
            PropertySpec::setting("R %s").with_validator(Validator::StrictRange, [5, 1]);
        assert!(rejects("rev", reversed).contains("out of order"));

        let three =
            PropertySpec::setting("R %s").with_validator(Validator::TruncatedRange, [1, 2, 3]);
        assert!(rejects("three", three).contains("two bounds"));

        let text = PropertySpec::setting("R %s")
            .with_validator(Validator::TruncatedDiscreteSet, ["low", "high"]);
        assert!(rejects("text", text).contains("numeric"));

        let missing_map = PropertySpec {
            validator: Some(Validator::StrictDiscreteSet),
            map_values: true,
            ..PropertySpec::control("R?", "R %s")
        };
        assert!(rejects("mm", missing_map).contains("requires a map"));

        assert!(rejects("q", PropertySpec::measurement("R? %s")).contains("placeholder"));
        assert!(rejects("s", PropertySpec::setting("R")).contains("placeholder"));
    }

    #[test]
    fn test_spec_from_toml() {
        let spec: PropertySpec = toml::from_str(
            r#"
            get = ":MEAS:CAP:RANG?"
            set = ":MEAS:CAP %s"
            validator = "truncated_discrete_set"
            values = [[2e-9, 0], [20e-9, 1], [200e-9, 2]]
            map_values = true
            "#,
        )
        .unwrap();
        let d = PropertyDescriptor::from_spec("capacitance_range", spec).unwrap();
        assert_eq!(d.encode_set(Value::Float(5e-9)).unwrap(), ":MEAS:CAP 1");

        let unknown = toml::from_str::<PropertySpec>("get = \"X?\"\nunit = \"V\"");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_text_wire_values_need_text_kind() {
        let spec = PropertySpec::control("TRIG?", "TRIG %s")
            .with_map(Validator::StrictDiscreteSet, [("immediate", "IMM"), ("bus", "BUS")]);
        let message = rejects("trigger", spec.clone());
        assert!(message.contains("IMM"), "{}", message);
        assert!(message.contains("float"), "{}", message);

        let d = PropertyDescriptor::from_spec("trigger", spec.with_kind(ValueKind::Str)).unwrap();
        assert_eq!(d.decode_get("BUS").unwrap(), Value::from("bus"));

        // write-only maps never parse a response
        let setting = PropertySpec::setting("TRIG %s")
            .with_map(Validator::StrictDiscreteSet, [("immediate", "IMM")]);
        assert!(PropertyDescriptor::from_spec("trigger", setting).is_ok());
    }
}
