//! Accessors over the loosely shaped JSON the planning stages emit.

use serde_json::Value;

/// Returns the feature list of a stage payload.
///
/// Stages emit features either wrapped as `{"geojson": {"features": [..]}}` or
/// bare as `{"features": [..]}`. The wrapped shape is checked first and the
/// first non-empty list wins.
pub fn resolve_features(container: Option<&Value>) -> &[Value] {
    let Some(container) = container else {
        return &[];
    };

    let wrapped = container
        .get("geojson")
        .and_then(|geojson| geojson.get("features"))
        .and_then(Value::as_array);
    let bare = container.get("features").and_then(Value::as_array);

    [wrapped, bare]
        .into_iter()
        .flatten()
        .find(|features| !features.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// The `properties` object of a feature, if it has one.
pub fn properties(feature: &Value) -> Option<&Value> {
    feature.get("properties").filter(|props| props.is_object())
}

/// First of `keys` whose value is truthy: present and not null, false, zero
/// or the empty string.
pub fn first_truthy<'a>(props: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| props.get(*key))
        .find(|value| is_truthy(value))
}

/// First of `keys` that is present and not null.
pub fn first_present<'a>(props: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| props.get(*key))
        .find(|value| !value.is_null())
}

/// Numeric reading of a JSON number or numeric string; `None` when the value
/// is missing, non-numeric or not finite.
pub fn finite_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Like [`finite_number`] but only accepts JSON numbers.
pub fn strict_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|number| number.is_finite())
}

/// Text form of a scalar identifier; objects and arrays have none.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
