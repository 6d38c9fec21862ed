//! Text-to-wire value encoding.
//!
//! PostgreSQL hands every value over as text. The encoder turns that text
//! into the binary form its wire signature calls for, choosing the
//! conversion from the column's type OID.

use serde::Deserialize;

use crate::error::EncodeError;
use crate::reply::{VariantWriter, WireValue};
use crate::types::{Oid, WireSignature, is_text_oid, oid};

/// How numeric text that does not parse cleanly is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Leading whitespace is skipped, trailing garbage ignored, and
    /// anything without a numeric prefix becomes zero.
    #[default]
    Lenient,
    /// The whole text must be a number of the target width.
    Strict,
}

/// Convert `text` to the wire value for a column of type `type_oid`.
pub fn encode(
    signature: WireSignature,
    type_oid: Oid,
    text: &str,
    policy: ParsePolicy,
) -> Result<WireValue, EncodeError> {
    let value = match type_oid {
        oid::BOOL => WireValue::Boolean(text == "t"),
        oid::INT2 => WireValue::Int16(match policy {
            ParsePolicy::Lenient => parse_long_prefix(text) as i16,
            ParsePolicy::Strict => strict(text, signature)?,
        }),
        oid::INT4 | oid::OID => WireValue::Int32(match policy {
            ParsePolicy::Lenient => parse_long_prefix(text) as i32,
            ParsePolicy::Strict => strict(text, signature)?,
        }),
        oid::INT8 => WireValue::Int64(match policy {
            ParsePolicy::Lenient => parse_long_prefix(text),
            ParsePolicy::Strict => strict(text, signature)?,
        }),
        oid::FLOAT4 | oid::FLOAT8 => WireValue::Double(match policy {
            ParsePolicy::Lenient => parse_double_prefix(text),
            ParsePolicy::Strict => strict(text, signature)?,
        }),
        t if is_text_oid(t) => WireValue::String(text.to_string()),
        other => return Err(EncodeError::UnsupportedType(other)),
    };

    if value.signature() != signature {
        return Err(EncodeError::SignatureMismatch {
            expected: signature,
            found: value.signature(),
        });
    }
    Ok(value)
}

/// Encode a column value straight into an open variant.
///
/// SQL NULL is encoded from the empty string.
pub fn append_value(
    slot: VariantWriter<'_>,
    type_oid: Oid,
    value: Option<&str>,
    policy: ParsePolicy,
) -> Result<(), EncodeError> {
    let encoded = encode(slot.signature(), type_oid, value.unwrap_or(""), policy)?;
    slot.append(encoded)
}

fn strict<T: std::str::FromStr>(text: &str, signature: WireSignature) -> Result<T, EncodeError> {
    text.parse().map_err(|_| EncodeError::InvalidNumber {
        signature,
        text: text.to_string(),
    })
}

// C isspace(): includes vertical tab, which is_ascii_whitespace does not.
fn is_c_space(b: u8) -> bool {
    b.is_ascii_whitespace() || b == 0x0b
}

/// Base-10 integer prefix, `strtol` style. Saturates at the i64 bounds.
pub fn parse_long_prefix(text: &str) -> i64 {
    let bytes = text.as_bytes();
    let mut i = bytes.iter().take_while(|b| is_c_space(**b)).count();

    let negative = match bytes.get(i) {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };

    let mut acc: i64 = 0;
    for &b in bytes[i..].iter().take_while(|b| b.is_ascii_digit()) {
        let digit = i64::from(b - b'0');
        acc = if negative {
            acc.saturating_mul(10).saturating_sub(digit)
        } else {
            acc.saturating_mul(10).saturating_add(digit)
        };
    }
    acc
}

/// Floating point prefix, `strtod` style. No numeric prefix yields 0.0.
pub fn parse_double_prefix(text: &str) -> f64 {
    let start = text.bytes().take_while(|b| is_c_space(*b)).count();
    let s = &text[start..];
    let bytes = s.as_bytes();

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

    let rest = &bytes[end..];
    for word in [&b"infinity"[..], b"inf", b"nan"] {
        if rest.len() >= word.len() && rest[..word.len()].eq_ignore_ascii_case(word) {
            return s[..end + word.len()].parse().unwrap_or(0.0);
        }
    }

    let int_digits = digits_at(bytes, end);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits_at(bytes, end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = digits_at(bytes, exp);
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }

    s[..end].parse().unwrap_or(0.0)
}

fn digits_at(bytes: &[u8], from: usize) -> usize {
    bytes
        .get(from..)
        .map_or(0, |tail| tail.iter().take_while(|b| b.is_ascii_digit()).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::RowBuilder;
    use crate::types::signature_for;
    use pretty_assertions::assert_eq;

    fn lenient(type_oid: Oid, text: &str) -> Result<WireValue, EncodeError> {
        encode(signature_for(type_oid), type_oid, text, ParsePolicy::Lenient)
    }

    #[test]
    fn test_boolean() {
        assert_eq!(lenient(oid::BOOL, "t"), Ok(WireValue::Boolean(true)));
        for other in ["f", "", "true", "T", "yes", "1"] {
            assert_eq!(lenient(oid::BOOL, other), Ok(WireValue::Boolean(false)), "{other}");
        }
    }

    #[test]
    fn test_integer_round_trip() {
        for n in [i16::MIN, -1, 0, 1, 42, i16::MAX] {
            assert_eq!(lenient(oid::INT2, &n.to_string()), Ok(WireValue::Int16(n)));
        }
        for n in [i32::MIN, -40_000, 0, 70_000, i32::MAX] {
            assert_eq!(lenient(oid::INT4, &n.to_string()), Ok(WireValue::Int32(n)));
            assert_eq!(lenient(oid::OID, &n.to_string()), Ok(WireValue::Int32(n)));
        }
        for n in [i64::MIN, -5_000_000_000, 0, 5_000_000_000, i64::MAX] {
            assert_eq!(lenient(oid::INT8, &n.to_string()), Ok(WireValue::Int64(n)));
        }
    }

    #[test]
    fn test_lenient_integer_parsing() {
        assert_eq!(parse_long_prefix("  \t42"), 42);
        assert_eq!(parse_long_prefix("-17abc"), -17);
        assert_eq!(parse_long_prefix("+8"), 8);
        assert_eq!(parse_long_prefix("abc"), 0);
        assert_eq!(parse_long_prefix(""), 0);
        assert_eq!(parse_long_prefix("-"), 0);
        assert_eq!(parse_long_prefix("99999999999999999999"), i64::MAX);
        assert_eq!(parse_long_prefix("-99999999999999999999"), i64::MIN);
    }

    #[test]
    fn test_lenient_integer_truncates_to_width() {
        // No overflow detection: the low bits survive.
        assert_eq!(lenient(oid::INT2, "65537"), Ok(WireValue::Int16(1)));
        assert_eq!(lenient(oid::INT4, "4294967296"), Ok(WireValue::Int32(0)));
    }

    #[test]
    fn test_lenient_double_parsing() {
        assert_eq!(parse_double_prefix("3.5"), 3.5);
        assert_eq!(parse_double_prefix("  -2.5e3xyz"), -2500.0);
        assert_eq!(parse_double_prefix("1e"), 1.0);
        assert_eq!(parse_double_prefix(".25"), 0.25);
        assert_eq!(parse_double_prefix("7."), 7.0);
        assert_eq!(parse_double_prefix("."), 0.0);
        assert_eq!(parse_double_prefix("garbage"), 0.0);
        assert_eq!(parse_double_prefix(""), 0.0);
        assert_eq!(parse_double_prefix("Infinity"), f64::INFINITY);
        assert_eq!(parse_double_prefix("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_double_prefix("NaN").is_nan());
    }

    #[test]
    fn test_strict_rejects_garbage() {
        let err = encode(WireSignature::Int32, oid::INT4, "12abc", ParsePolicy::Strict);
        assert_eq!(
            err,
            Err(EncodeError::InvalidNumber {
                signature: WireSignature::Int32,
                text: "12abc".to_string(),
            })
        );
        assert!(encode(WireSignature::Int16, oid::INT2, "40000", ParsePolicy::Strict).is_err());
        assert!(encode(WireSignature::Double, oid::FLOAT8, "", ParsePolicy::Strict).is_err());
        assert_eq!(
            encode(WireSignature::Int64, oid::INT8, "-9", ParsePolicy::Strict),
            Ok(WireValue::Int64(-9))
        );
    }

    #[test]
    fn test_string_passes_through() {
        for text in ["", "hello", "  spaced  ", "{\"a\": 1}", "ünïcødé"] {
            assert_eq!(lenient(oid::TEXT, text), Ok(WireValue::String(text.to_string())));
            assert_eq!(lenient(oid::JSON, text), Ok(WireValue::String(text.to_string())));
        }
    }

    #[test]
    fn test_unsupported_type() {
        for other in [oid::NUMERIC, oid::DATE, oid::UUID, oid::JSONB, 0] {
            assert_eq!(lenient(other, "1"), Err(EncodeError::UnsupportedType(other)));
        }
    }

    #[test]
    fn test_signature_must_match_type() {
        let err = encode(WireSignature::String, oid::INT4, "5", ParsePolicy::Lenient);
        assert_eq!(
            err,
            Err(EncodeError::SignatureMismatch {
                expected: WireSignature::String,
                found: WireSignature::Int32,
            })
        );
    }

    #[test]
    fn test_append_value_null_is_empty_text() {
        let mut row = RowBuilder::new();
        for (name, type_oid) in [("b", oid::BOOL), ("i", oid::INT4), ("s", oid::TEXT)] {
            let slot = row.open_entry(name).open_variant(signature_for(type_oid));
            append_value(slot, type_oid, None, ParsePolicy::Lenient).unwrap();
        }
        let reply = row.finish();
        assert_eq!(reply.get("b"), Some(&WireValue::Boolean(false)));
        assert_eq!(reply.get("i"), Some(&WireValue::Int32(0)));
        assert_eq!(reply.get("s"), Some(&WireValue::String(String::new())));
    }
}
