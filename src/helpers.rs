//! Shared helpers for turning raw feed strings into validated values.
//!
//! Feed fields arrive as free text. Each helper returns `Err` with a short
//! human-readable reason so the caller can log and skip the item.

/// Return the trimmed value of a required text field.
pub(crate) fn required_str<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(format!("{} is blank", field)),
        None => Err(format!("{} is missing", field)),
    }
}

/// Parse a distance in kilometres. A trailing `km` unit is tolerated.
pub(crate) fn parse_distance_km(value: Option<&str>) -> Result<f64, String> {
    let raw = required_str("distance", value)?;
    let number = raw.trim_end_matches(|c: char| c.is_ascii_alphabetic()).trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(format!("distance '{}' is not a valid number", raw)),
    }
}

/// Parse a duration in whole minutes. Fractional values are rounded.
pub(crate) fn parse_duration_min(value: Option<&str>) -> Result<i32, String> {
    let raw = required_str("duration", value)?;
    let number = raw
        .trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.')
        .trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v <= i32::MAX as f64 => Ok(v.round() as i32),
        _ => Err(format!("duration '{}' is not a valid number", raw)),
    }
}

/// Compare two floats with a tolerance small enough for values parsed from the same text.
pub(crate) fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
