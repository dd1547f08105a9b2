//! Validator laws over representative domains.

use scpi_instrument::validators::{
    strict_discrete_set, strict_range, truncated_discrete_set, truncated_range,
};
use scpi_instrument::{ValidationError, Value};

fn floats(xs: &[f64]) -> Vec<Value> {
    xs.iter().copied().map(Value::Float).collect()
}

#[test]
fn test_strict_set_returns_members_unchanged() {
    let set = vec![Value::from("10M"), Value::from("10G")];
    for member in &set {
        assert_eq!(strict_discrete_set(member.clone(), &set), Ok(member.clone()));
    }
    assert!(matches!(
        strict_discrete_set(Value::from("1G"), &set),
        Err(ValidationError::NotInSet { .. })
    ));
}

#[test]
fn test_strict_set_uses_numeric_equality() {
    let set = vec![Value::Int(1), Value::Int(2)];
    assert_eq!(strict_discrete_set(Value::Float(2.0), &set), Ok(Value::Float(2.0)));
    assert!(strict_discrete_set(Value::Bool(true), &set).is_err());
}

#[test]
fn test_truncated_set_selects_smallest_covering_member() {
    let ranges = floats(&[0.2, 2.0, 20.0]);
    let cases = [
        (0.0, 0.2),
        (0.2, 0.2),
        (0.21, 2.0),
        (1.0, 2.0),
        (2.0, 2.0),
        (19.9, 20.0),
        (50.0, 20.0),
    ];
    for (requested, selected) in cases {
        assert_eq!(
            truncated_discrete_set(Value::Float(requested), &ranges),
            Ok(Value::Float(selected)),
            "requested {}",
            requested
        );
    }
}

#[test]
fn test_truncated_set_accepts_integer_requests() {
    let resistance = floats(&[200.0, 2e3, 20e3, 200e3, 1e6, 10e6, 100e6]);
    assert_eq!(
        truncated_discrete_set(Value::Int(1500), &resistance),
        Ok(Value::Float(2e3))
    );
}

#[test]
fn test_ranges_clamp_or_reject_outside_bounds() {
    let low = Value::Int(10);
    let high = Value::Int(2000);

    for inside in [10.0, 500.0, 2000.0] {
        assert_eq!(
            strict_range(Value::Float(inside), &low, &high),
            Ok(Value::Float(inside))
        );
        assert_eq!(
            truncated_range(Value::Float(inside), &low, &high),
            Ok(Value::Float(inside))
        );
    }

    assert_eq!(truncated_range(Value::Int(1), &low, &high), Ok(low.clone()));
    assert_eq!(truncated_range(Value::Int(5000), &low, &high), Ok(high.clone()));
    assert!(matches!(
        strict_range(Value::Int(1), &low, &high),
        Err(ValidationError::OutOfRange { .. })
    ));
    assert!(matches!(
        strict_range(Value::Int(5000), &low, &high),
        Err(ValidationError::OutOfRange { .. })
    ));
}

#[test]
fn test_numeric_policies_reject_text() {
    let low = Value::Int(10);
    let high = Value::Int(2000);
    assert!(matches!(
        truncated_range(Value::from("max"), &low, &high),
        Err(ValidationError::NotNumeric { .. })
    ));
    assert!(matches!(
        strict_range(Value::from("max"), &low, &high),
        Err(ValidationError::NotNumeric { .. })
    ));
}
