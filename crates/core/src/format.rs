//! Locale-independent number rendering for answers.

const MAX_FRACTION_DIGITS: usize = 3;

/// Renders `value` with `,` thousands separators. Integral values carry no
/// fraction; others keep up to three decimals with trailing zeros dropped.
pub fn group_thousands(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    // Only the fractional part is scaled; the whole part may be near f64::MAX.
    let scale = 10_f64.powi(MAX_FRACTION_DIGITS as i32);
    let mut whole = value.abs().trunc();
    let mut fraction = ((value.abs() - whole) * scale).round();
    if fraction >= scale {
        whole += 1.0;
        fraction = 0.0;
    }
    let fraction = fraction as u64;

    let mut rendered = String::new();
    if value < 0.0 && (whole > 0.0 || fraction > 0) {
        rendered.push('-');
    }
    rendered.push_str(&group_digits(&format!("{whole:.0}")));

    if fraction > 0 {
        let digits = format!("{fraction:0width$}", width = MAX_FRACTION_DIGITS);
        rendered.push('.');
        rendered.push_str(digits.trim_end_matches('0'));
    }

    rendered
}

/// Rounds half-up toward positive infinity.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Shortest plain rendering of a number, without grouping.
pub fn plain_number(value: f64) -> String {
    format!("{value}")
}

fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
