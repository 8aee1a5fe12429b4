//! Standard numeric format specifiers and composite formatting.

use crate::value::Value;
use crate::vm::{VmError, VmResult};

/// Formats `value` with an optional standard format specifier such as `F2`,
/// `N0`, `D4`, `X`, `E3`, `P1` or `G`. Unknown specifiers fall back to the
/// plain text of the value.
pub fn format_value(value: &Value, format: Option<&str>) -> String {
    let Some(spec) = format.filter(|spec| !spec.is_empty()) else {
        return value.to_text();
    };
    let mut chars = spec.chars();
    let Some(kind) = chars.next() else {
        return value.to_text();
    };
    let digits = chars.as_str();
    let precision = if digits.is_empty() {
        None
    } else {
        match digits.parse::<usize>() {
            Ok(precision) => Some(precision.min(99)),
            Err(_) => return value.to_text(),
        }
    };

    match kind {
        'F' | 'f' => match numeric(value) {
            Some(number) => format!("{:.*}", precision.unwrap_or(2), number),
            None => value.to_text(),
        },
        'N' | 'n' => match numeric(value) {
            Some(number) => group_thousands(&format!("{:.*}", precision.unwrap_or(2), number)),
            None => value.to_text(),
        },
        'D' | 'd' => match integral(value) {
            Some(number) => {
                let width = precision.unwrap_or(0);
                let sign = if number < 0 { "-" } else { "" };
                format!("{sign}{:0width$}", number.unsigned_abs())
            }
            None => value.to_text(),
        },
        'X' | 'x' => match integral(value) {
            Some(number) => {
                let width = precision.unwrap_or(0);
                let bits = match value {
                    Value::Int(v) => *v as u32 as u64,
                    _ => number as u64,
                };
                if kind == 'X' {
                    format!("{bits:0width$X}")
                } else {
                    format!("{bits:0width$x}")
                }
            }
            None => value.to_text(),
        },
        'E' | 'e' => match numeric(value) {
            Some(number) => exponential(number, precision.unwrap_or(6), kind == 'E'),
            None => value.to_text(),
        },
        'P' | 'p' => match numeric(value) {
            Some(number) => format!("{:.*} %", precision.unwrap_or(2), number * 100.0),
            None => value.to_text(),
        },
        _ => value.to_text(),
    }
}

/// Largest accepted alignment magnitude (exclusive).
pub const MAX_ALIGNMENT: u32 = 1_000_000;

/// Pads `text` to `width` characters: right-aligned when positive,
/// left-aligned when negative.
pub fn align(text: &str, width: i32) -> VmResult<String> {
    let target = width.unsigned_abs();
    if target >= MAX_ALIGNMENT {
        return Err(bad_format("alignment is out of range"));
    }
    let len = text.chars().count();
    let target = target as usize;
    if len >= target {
        return Ok(text.to_string());
    }
    let padding = " ".repeat(target - len);
    Ok(if width < 0 {
        format!("{text}{padding}")
    } else {
        format!("{padding}{text}")
    })
}

/// Expands `{index[,alignment][:format]}` placeholders; `{{` and `}}` are
/// literal braces.
pub fn composite_format(template: &str, args: &[Value]) -> VmResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut hole = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(next) => hole.push(next),
                        None => return Err(bad_format("unterminated placeholder")),
                    }
                }
                let (head, format) = match hole.split_once(':') {
                    Some((head, format)) => (head, Some(format)),
                    None => (hole.as_str(), None),
                };
                let (index, alignment) = match head.split_once(',') {
                    Some((index, alignment)) => (index, Some(alignment)),
                    None => (head, None),
                };
                let index: usize = index
                    .trim()
                    .parse()
                    .map_err(|_| bad_format("placeholder index is not a number"))?;
                let value = args
                    .get(index)
                    .ok_or_else(|| bad_format("placeholder index out of range"))?;
                let mut text = format_value(value, format);
                if let Some(alignment) = alignment {
                    let width: i32 = alignment
                        .trim()
                        .parse()
                        .map_err(|_| bad_format("alignment is not a number"))?;
                    text = align(&text, width)?;
                }
                out.push_str(&text);
            }
            '}' => return Err(bad_format("unescaped '}'")),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn bad_format(message: &str) -> VmError {
    VmError::Host(format!("invalid format string: {message}"))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Long(v) => Some(*v as f64),
        Value::Float(v) => Some(*v as f64),
        Value::Double(v) => Some(*v),
        _ => None,
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v as i64),
        Value::Long(v) => Some(*v),
        _ => None,
    }
}

fn group_thousands(fixed: &str) -> String {
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed),
    };
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

fn exponential(number: f64, precision: usize, upper: bool) -> String {
    let rendered = format!("{number:.precision$e}");
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{mantissa}{marker}{sign}{:03}", exponent.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_specifiers() {
        assert_eq!(format_value(&Value::Double(3.14159), Some("F2")), "3.14");
        assert_eq!(format_value(&Value::Int(1234567), Some("N0")), "1,234,567");
        assert_eq!(format_value(&Value::Double(-1234.5), Some("N1")), "-1,234.5");
        assert_eq!(format_value(&Value::Int(42), Some("D5")), "00042");
        assert_eq!(format_value(&Value::Int(255), Some("X4")), "00FF");
        assert_eq!(format_value(&Value::Int(-1), Some("x")), "ffffffff");
        assert_eq!(format_value(&Value::Double(1234.5), Some("E2")), "1.23E+003");
        assert_eq!(format_value(&Value::Double(0.125), Some("P1")), "12.5 %");
        assert_eq!(format_value(&Value::from("text"), Some("F2")), "text");
        assert_eq!(format_value(&Value::Int(7), Some("Q")), "7");
    }

    #[test]
    fn alignment_pads_on_the_expected_side() {
        assert_eq!(align("ab", 5).expect("aligns"), "   ab");
        assert_eq!(align("ab", -5).expect("aligns"), "ab   ");
        assert_eq!(align("abcdef", 3).expect("aligns"), "abcdef");
    }

    #[test]
    fn oversized_alignment_is_rejected() {
        assert!(align("ab", 999_999).is_ok());
        assert!(matches!(align("ab", 2_000_000_000), Err(VmError::Host(_))));
        assert!(matches!(align("ab", i32::MIN), Err(VmError::Host(_))));
        let err = composite_format("{0,1000000}", &[Value::Int(1)]).expect_err("too wide");
        assert!(matches!(err, VmError::Host(_)));
    }

    #[test]
    fn composite_format_expands_placeholders() {
        let text = composite_format(
            "{0} has {1,3} items ({2:F1}%) {{ok}}",
            &[Value::from("cart"), Value::Int(7), Value::Double(12.345)],
        )
        .expect("format should succeed");
        assert_eq!(text, "cart has   7 items (12.3%) {ok}");
    }

    #[test]
    fn composite_format_rejects_missing_arguments() {
        let err = composite_format("{1}", &[Value::Int(1)]).expect_err("index 1 is missing");
        assert!(matches!(err, VmError::Host(_)));
    }
}
