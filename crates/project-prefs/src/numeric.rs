//! Prefix numeric parsing with C library semantics
//!
//! Leading whitespace is skipped, the longest valid numeric prefix is
//! consumed and anything after it is ignored. Floats accept the decimal and
//! the `0x` hexadecimal forms; integers are base 10 only. A value that does not fit the
//! target type is an error rather than a saturated result.

use std::num::IntErrorKind;

/// Why a raw preference value could not be coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericError {
    /// No digits were consumed
    NoDigits,
    /// The value overflowed or underflowed the target type
    OutOfRange,
}

impl std::fmt::Display for NumericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericError::NoDigits => write!(f, "no digits"),
            NumericError::OutOfRange => write!(f, "out of range"),
        }
    }
}

fn skip_space(text: &str) -> &str {
    // isspace() in the C locale, including vertical tab
    text.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b')
}

fn sign_len(bytes: &[u8]) -> usize {
    matches!(bytes.first(), Some(b'+' | b'-')) as usize
}

fn digits_from(bytes: &[u8], start: usize) -> usize {
    bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count()
}

fn starts_with_ignore_case(text: &str, word: &str) -> bool {
    text.len() >= word.len() && text.as_bytes()[..word.len()].eq_ignore_ascii_case(word.as_bytes())
}

/// Parse the leading floating point number of `text`
pub fn parse_f64_prefix(text: &str) -> Result<f64, NumericError> {
    let s = skip_space(text);
    let bytes = s.as_bytes();
    let mut end = sign_len(bytes);
    let negative = bytes.first() == Some(&b'-');

    let rest = &s[end..];
    if starts_with_ignore_case(rest, "inf") {
        return Ok(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    if starts_with_ignore_case(rest, "nan") {
        return Ok(f64::NAN);
    }
    if let Some(result) = parse_hex_f64(rest) {
        return result.map(|v| if negative { -v } else { v });
    }

    let int_digits = digits_from(bytes, end);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits_from(bytes, end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return Err(NumericError::NoDigits);
    }
    let mantissa_nonzero = s[..end].bytes().any(|b| matches!(b, b'1'..=b'9'));

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let exp_start = end + 1;
        let exp_sign = sign_len(&bytes[exp_start..]);
        let exp_digits = digits_from(bytes, exp_start + exp_sign);
        if exp_digits > 0 {
            end = exp_start + exp_sign + exp_digits;
        }
    }

    let value: f64 = s[..end].parse().map_err(|_| NumericError::NoDigits)?;
    if value.is_infinite() {
        return Err(NumericError::OutOfRange);
    }
    if mantissa_nonzero && value.abs() < f64::MIN_POSITIVE {
        return Err(NumericError::OutOfRange);
    }
    Ok(value)
}

/// `0x<hex>[.<hex>][p<exp>]`, or None when `text` is not in hex form
fn parse_hex_f64(text: &str) -> Option<Result<f64, NumericError>> {
    let bytes = text.as_bytes();
    if bytes.len() < 3 || bytes[0] != b'0' || !matches!(bytes[1], b'x' | b'X') {
        return None;
    }

    let mut pos = 2;
    let mut mantissa: u64 = 0;
    let mut exp2: i64 = 0;
    let mut digits = 0;
    let mut nonzero = false;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(pos) {
        if b == b'.' && !seen_dot {
            seen_dot = true;
            pos += 1;
            continue;
        }
        let Some(d) = (b as char).to_digit(16) else {
            break;
        };
        digits += 1;
        nonzero |= d != 0;
        // Keep 60 significant bits; later digits only shift the exponent
        if mantissa >> 60 == 0 {
            mantissa = mantissa * 16 + u64::from(d);
            if seen_dot {
                exp2 -= 4;
            }
        } else if !seen_dot {
            exp2 += 4;
        }
        pos += 1;
    }
    if digits == 0 {
        // "0x" alone reads as "0"
        return None;
    }

    if matches!(bytes.get(pos), Some(b'p' | b'P')) {
        let exp_start = pos + 1;
        let sign = sign_len(&bytes[exp_start..]);
        let exp_digits = digits_from(bytes, exp_start + sign);
        if exp_digits > 0 {
            let exp = bytes[exp_start + sign..exp_start + sign + exp_digits]
                .iter()
                .fold(0i64, |acc, b| {
                    acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
                });
            exp2 = if bytes[exp_start] == b'-' {
                exp2.saturating_sub(exp)
            } else {
                exp2.saturating_add(exp)
            };
        }
    }

    let value = scale_by_pow2(mantissa as f64, exp2);
    if value.is_infinite() || (nonzero && value < f64::MIN_POSITIVE) {
        Some(Err(NumericError::OutOfRange))
    } else {
        Some(Ok(value))
    }
}

/// `value * 2^exp` without overflowing the intermediate power
fn scale_by_pow2(mut value: f64, mut exp: i64) -> f64 {
    let step = 2f64.powi(512);
    while exp > 512 && value.is_finite() {
        value *= step;
        exp -= 512;
    }
    while exp < -512 && value != 0.0 {
        value /= step;
        exp += 512;
    }
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    value * 2f64.powi(exp as i32)
}

/// Parse the leading base-10 integer of `text`
pub fn parse_i64_prefix(text: &str) -> Result<i64, NumericError> {
    let s = skip_space(text);
    let bytes = s.as_bytes();
    let sign = sign_len(bytes);
    let digits = digits_from(bytes, sign);
    if digits == 0 {
        return Err(NumericError::NoDigits);
    }

    s[..sign + digits].parse().map_err(|e: std::num::ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => NumericError::OutOfRange,
        _ => NumericError::NoDigits,
    })
}
