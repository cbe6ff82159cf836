// Number <-> text conversions shared by the string runtime, output and the
// result normalizer.

pub const SIGNIFICANT_DIGITS: usize = 15;
pub const FIXED_FRACTION_DIGITS: usize = 15;

fn non_finite(x: f64) -> Option<&'static str> {
    if x.is_nan() {
        Some("NaN")
    } else if x == f64::INFINITY {
        Some("Infinity")
    } else if x == f64::NEG_INFINITY {
        Some("-Infinity")
    } else {
        None
    }
}

/// Shortest decimal that round-trips, never in scientific notation.
pub fn format_shortest(x: f64) -> String {
    match non_finite(x) {
        Some(name) => name.to_string(),
        None => format!("{x}"),
    }
}

/// Fixed-point rendering with `digits` fractional digits.
pub fn format_fixed(x: f64, digits: usize) -> String {
    match non_finite(x) {
        Some(name) => name.to_string(),
        None => format!("{x:.digits$}"),
    }
}

/// Rounds to `SIGNIFICANT_DIGITS` significant digits and prints the result
/// in positional notation with trailing zeros dropped.
pub fn format_significant(x: f64) -> String {
    if let Some(name) = non_finite(x) {
        return name.to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }
    let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, x);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return format!("{x}");
    };
    let exponent: i64 = exponent.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits = mantissa
        .chars()
        .filter(|ch| ch.is_ascii_digit())
        .collect::<String>();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };

    // value = 0.d1d2d3... * 10^(exponent + 1)
    let point = exponent + 1;
    let mut body = String::new();
    if point <= 0 {
        body.push_str("0.");
        body.extend(std::iter::repeat('0').take((-point) as usize));
        body.push_str(digits);
    } else if point as usize >= digits.len() {
        body.push_str(digits);
        body.extend(std::iter::repeat('0').take(point as usize - digits.len()));
    } else {
        let (int_part, frac_part) = digits.split_at(point as usize);
        body.push_str(int_part);
        body.push('.');
        body.push_str(frac_part);
    }
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

/// Parses `[-+]?digits` into an i64. Anything else, including surrounding
/// whitespace and out-of-range values, is rejected.
pub fn parse_int(text: &str) -> Option<i64> {
    let bytes = text.as_bytes();
    let (negative, digits) = match bytes.first()? {
        b'-' => (true, &bytes[1..]),
        b'+' => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: i128 = 0;
    for ch in digits {
        if !ch.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((ch - b'0') as i128)?;
        if value > i64::MAX as i128 + 1 {
            return None;
        }
    }
    if negative {
        value = -value;
    }
    i64::try_from(value).ok()
}

/// Parses `[-+]?(digits[.digits*] | .digits)([eE][-+]?digits)?`.
pub fn parse_double(text: &str) -> Option<f64> {
    if !is_decimal_literal(text.as_bytes()) {
        return None;
    }
    text.parse::<f64>().ok()
}

fn is_decimal_literal(bytes: &[u8]) -> bool {
    let mut idx = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        idx += 1;
    }
    let int_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    let int_digits = idx - int_start;
    let mut frac_digits = 0;
    if idx < bytes.len() && bytes[idx] == b'.' {
        idx += 1;
        let frac_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        frac_digits = idx - frac_start;
    }
    if int_digits == 0 && frac_digits == 0 {
        return false;
    }
    if idx < bytes.len() && matches!(bytes[idx], b'e' | b'E') {
        idx += 1;
        if matches!(bytes.get(idx), Some(b'-' | b'+')) {
            idx += 1;
        }
        let exp_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == exp_start {
            return false;
        }
    }
    idx == bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_drops_trailing_zeros() {
        assert_eq!(format_significant(1.5), "1.5");
        assert_eq!(format_significant(3.0), "3");
        assert_eq!(format_significant(-0.25), "-0.25");
        assert_eq!(format_significant(0.1), "0.1");
        assert_eq!(format_significant(0.0), "0");
    }

    #[test]
    fn significant_rounds_to_fifteen_digits() {
        assert_eq!(format_significant(0.1 + 0.2), "0.3");
        assert_eq!(format_significant(1.0 / 3.0), "0.333333333333333");
        assert_eq!(format_significant(123456789.123456789), "123456789.123457");
    }

    #[test]
    fn significant_never_uses_exponent() {
        assert_eq!(format_significant(1e21), "1000000000000000000000");
        assert_eq!(format_significant(1.5e-7), "0.00000015");
    }

    #[test]
    fn non_finite_values_are_named() {
        assert_eq!(format_significant(f64::NAN), "NaN");
        assert_eq!(format_fixed(f64::INFINITY, 15), "Infinity");
        assert_eq!(format_shortest(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn fixed_pads_fraction() {
        assert_eq!(format_fixed(2.5, 15), "2.500000000000000");
        assert_eq!(format_fixed(-1.0, 3), "-1.000");
    }

    #[test]
    fn shortest_matches_display() {
        assert_eq!(format_shortest(2.0), "2");
        assert_eq!(format_shortest(0.1), "0.1");
    }

    #[test]
    fn parse_int_accepts_signs() {
        assert_eq!(parse_int("123"), Some(123));
        assert_eq!(parse_int("-42"), Some(-42));
        assert_eq!(parse_int("+7"), Some(7));
        assert_eq!(parse_int("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_int("9223372036854775807"), Some(i64::MAX));
    }

    #[test]
    fn parse_int_rejects_invalid() {
        for text in ["", "-", "+", "12x", " 1", "1 ", "1.0", "9223372036854775808"] {
            assert_eq!(parse_int(text), None, "{text:?}");
        }
        assert_eq!(parse_int(&"9".repeat(60)), None);
    }

    #[test]
    fn parse_double_grammar() {
        assert_eq!(parse_double("1.5"), Some(1.5));
        assert_eq!(parse_double("-.5"), Some(-0.5));
        assert_eq!(parse_double("2."), Some(2.0));
        assert_eq!(parse_double("+3e2"), Some(300.0));
        assert_eq!(parse_double("1E-2"), Some(0.01));
        for text in ["", ".", "abc", "inf", "NaN", "1e", "1.2.3", " 1", "1,5"] {
            assert_eq!(parse_double(text), None, "{text:?}");
        }
    }
}
