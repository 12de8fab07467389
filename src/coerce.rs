//! Shape-directed coercion of raw strings into field values.

use std::borrow::Cow;
use std::time::Duration;

use facet_core::{Def, Field, Shape};
use facet_reflect::{Partial, ScalarType};

use crate::{EnvError, EnvErrorKind};

type Result<T> = std::result::Result<T, EnvError>;

/// Whether a shape can build itself from a single string, which lets a
/// struct opt out of field-by-field recursion.
pub(crate) fn has_setter(field: &'static Field, shape: &'static Shape) -> bool {
    field.vtable.deserialize_with.is_some()
        || shape.vtable.parse.is_some()
        || shape.inner.is_some()
}

/// Assign `raw` to the field frame currently open on `partial`.
///
/// A field-level `deserialize_with` override is tried first; if it rejects
/// the value the type's own capabilities get a chance, and only when both
/// fail do the errors surface together.
pub(crate) fn assign(partial: &mut Partial<'_>, field: &'static Field, raw: &str) -> Result<()> {
    if field.vtable.deserialize_with.is_some() {
        let overridden = (|| -> Result<()> {
            partial.begin_custom_deserialization()?;
            partial.set(raw.to_string())?;
            partial.end()?;
            Ok(())
        })();
        match overridden {
            Ok(()) => return Ok(()),
            Err(first) => {
                return coerce_value(partial, raw).map_err(|second| {
                    EnvErrorKind::Setters {
                        errors: vec![first, second],
                    }
                    .into()
                });
            }
        }
    }
    coerce_value(partial, raw)
}

/// Coerce `raw` into whatever shape the current frame expects.
pub(crate) fn coerce_value(partial: &mut Partial<'_>, raw: &str) -> Result<()> {
    // Allocate-then-fill through wrappers.
    if matches!(partial.shape().def, Def::Option(_)) {
        partial.begin_some()?;
        coerce_value(partial, raw)?;
        partial.end()?;
        return Ok(());
    }
    if matches!(partial.shape().def, Def::Pointer(_)) {
        partial.begin_smart_ptr()?;
        coerce_value(partial, raw)?;
        partial.end()?;
        return Ok(());
    }

    let shape = partial.shape();

    // Duration has its own literal grammar.
    if shape.type_identifier == "Duration" {
        let duration = parse_duration(raw)?;
        partial.set(duration)?;
        return Ok(());
    }

    if let Some(scalar) = ScalarType::try_from_shape(shape) {
        return set_scalar(partial, scalar, raw);
    }

    match shape.def {
        Def::Array(array_def) => {
            let tokens: Vec<&str> = raw.split(' ').collect();
            if tokens.len() != array_def.n {
                return Err(invalid(format!(
                    "not enough elements: {shape} needs {} elements, got {}",
                    array_def.n,
                    tokens.len()
                )));
            }
            for (i, token) in tokens.iter().enumerate() {
                partial.begin_nth_field(i)?;
                coerce_value(partial, token)?;
                partial.end()?;
            }
            return Ok(());
        }
        Def::List(_) => {
            partial.begin_list()?;
            for token in raw.split(' ') {
                partial.begin_list_item()?;
                coerce_value(partial, token)?;
                partial.end()?;
            }
            return Ok(());
        }
        Def::Map(_) => {
            partial.begin_map()?;
            for pair in raw.split(' ') {
                // Only the first colon separates; the value keeps the rest.
                let Some((map_key, map_value)) = pair.split_once(':') else {
                    return Err(invalid(format!(
                        "invalid map items: '{pair}' is missing a ':' separator"
                    )));
                };
                partial.begin_key()?;
                coerce_value(partial, map_key)?;
                partial.end()?;
                partial.begin_value()?;
                coerce_value(partial, map_value)?;
                partial.end()?;
            }
            return Ok(());
        }
        _ => {}
    }

    // User-defined type: its self-setting capabilities, in priority order.
    apply_setters(partial, raw)
}

/// Try the type-level setter candidates in order. First success wins; when
/// every candidate fails, the failures surface together.
fn apply_setters(partial: &mut Partial<'_>, raw: &str) -> Result<()> {
    let shape = partial.shape();
    let parseable = shape.vtable.parse.is_some();
    let transparent = shape.inner.is_some();
    if !parseable && !transparent {
        return Err(invalid(format!("type '{shape}' is not supported")));
    }

    let mut failures = Vec::new();
    if parseable {
        match partial.parse_from_str(raw) {
            Ok(_) => return Ok(()),
            Err(reflect_error) => failures.push(EnvError::from(reflect_error)),
        }
    }
    if transparent {
        let attempt = (|| -> Result<()> {
            partial.begin_inner()?;
            coerce_value(partial, raw)?;
            partial.end()?;
            Ok(())
        })();
        match attempt {
            Ok(()) => return Ok(()),
            Err(error) => failures.push(error),
        }
    }
    if failures.len() == 1 {
        return Err(failures.remove(0));
    }
    Err(EnvErrorKind::Setters { errors: failures }.into())
}

fn set_scalar(partial: &mut Partial<'_>, scalar: ScalarType, raw: &str) -> Result<()> {
    match scalar {
        ScalarType::String => {
            partial.set(raw.to_string())?;
        }
        ScalarType::CowStr => {
            partial.set(Cow::<str>::Owned(raw.to_string()))?;
        }
        ScalarType::Bool => {
            let value: bool = raw
                .parse()
                .map_err(|_| invalid(format!("cannot parse '{raw}' as bool")))?;
            partial.set(value)?;
        }
        ScalarType::Char => {
            let mut chars = raw.chars();
            let value = chars.next();
            match (value, chars.next()) {
                (Some(c), None) => {
                    partial.set(c)?;
                }
                _ => {
                    return Err(invalid(format!(
                        "cannot parse '{raw}' as char: expected exactly one character"
                    )));
                }
            }
        }
        ScalarType::F32 => {
            let value: f32 = raw
                .parse()
                .map_err(|_| invalid(format!("cannot parse '{raw}' as f32")))?;
            partial.set(value)?;
        }
        ScalarType::F64 => {
            let value: f64 = raw
                .parse()
                .map_err(|_| invalid(format!("cannot parse '{raw}' as f64")))?;
            partial.set(value)?;
        }
        ScalarType::I8 => {
            partial.set(narrow::<i8>(parse_signed(raw)?, raw, "i8")?)?;
        }
        ScalarType::I16 => {
            partial.set(narrow::<i16>(parse_signed(raw)?, raw, "i16")?)?;
        }
        ScalarType::I32 => {
            partial.set(narrow::<i32>(parse_signed(raw)?, raw, "i32")?)?;
        }
        ScalarType::I64 => {
            partial.set(narrow::<i64>(parse_signed(raw)?, raw, "i64")?)?;
        }
        ScalarType::I128 => {
            partial.set(parse_signed(raw)?)?;
        }
        ScalarType::ISize => {
            partial.set(narrow::<isize>(parse_signed(raw)?, raw, "isize")?)?;
        }
        ScalarType::U8 => {
            partial.set(narrow_unsigned::<u8>(parse_unsigned(raw)?, raw, "u8")?)?;
        }
        ScalarType::U16 => {
            partial.set(narrow_unsigned::<u16>(parse_unsigned(raw)?, raw, "u16")?)?;
        }
        ScalarType::U32 => {
            partial.set(narrow_unsigned::<u32>(parse_unsigned(raw)?, raw, "u32")?)?;
        }
        ScalarType::U64 => {
            partial.set(narrow_unsigned::<u64>(parse_unsigned(raw)?, raw, "u64")?)?;
        }
        ScalarType::U128 => {
            partial.set(parse_unsigned(raw)?)?;
        }
        ScalarType::USize => {
            partial.set(narrow_unsigned::<usize>(parse_unsigned(raw)?, raw, "usize")?)?;
        }
        other => {
            return Err(invalid(format!("unsupported scalar type {other:?}")));
        }
    }
    Ok(())
}

fn narrow<T: TryFrom<i128>>(value: i128, raw: &str, type_name: &str) -> Result<T> {
    T::try_from(value).map_err(|_| invalid(format!("value '{raw}' is out of range for {type_name}")))
}

fn narrow_unsigned<T: TryFrom<u128>>(value: u128, raw: &str, type_name: &str) -> Result<T> {
    T::try_from(value).map_err(|_| invalid(format!("value '{raw}' is out of range for {type_name}")))
}

/// Parse a signed integer with base detection: `0x`/`0X` hex, `0o`/`0O`
/// octal, `0b`/`0B` binary, a bare leading zero octal, decimal otherwise.
fn parse_signed(raw: &str) -> Result<i128> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (radix, digits) = split_radix(digits);
    // Parse with the sign attached so i128::MIN stays in range.
    let rendered;
    let signed_digits = if negative {
        rendered = format!("-{digits}");
        rendered.as_str()
    } else {
        digits
    };
    i128::from_str_radix(signed_digits, radix)
        .map_err(|err| invalid(format!("cannot parse '{raw}' as integer: {err}")))
}

fn parse_unsigned(raw: &str) -> Result<u128> {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    let (radix, digits) = split_radix(digits);
    u128::from_str_radix(digits, radix)
        .map_err(|err| invalid(format!("cannot parse '{raw}' as unsigned integer: {err}")))
}

fn split_radix(digits: &str) -> (u32, &str) {
    if let Some(rest) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, rest)
    } else if let Some(rest) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        (2, rest)
    } else if let Some(rest) = digits
        .strip_prefix("0o")
        .or_else(|| digits.strip_prefix("0O"))
    {
        (8, rest)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    }
}

/// Parse a duration literal: a sequence of `<decimal>[.<fraction>]<unit>`
/// terms, e.g. `300ms`, `30s`, `1h30m`, `1.5h`. The bare literal `0` is
/// allowed without a unit. Negative durations are rejected.
pub(crate) fn parse_duration(raw: &str) -> Result<Duration> {
    let mut rest = raw.strip_prefix('+').unwrap_or(raw);
    if rest.starts_with('-') {
        return Err(invalid(format!("negative duration '{raw}' is not supported")));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid(format!("invalid duration '{raw}'")));
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let number = &rest[..number_end];
        if number.is_empty() {
            return Err(invalid(format!("invalid duration '{raw}'")));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| invalid(format!("invalid duration '{raw}'")))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let unit_seconds = match unit {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => {
                return Err(invalid(format!("missing unit in duration '{raw}'")));
            }
            _ => {
                return Err(invalid(format!("unknown unit '{unit}' in duration '{raw}'")));
            }
        };
        let term = Duration::try_from_secs_f64(value * unit_seconds)
            .map_err(|_| invalid(format!("duration '{raw}' is out of range")))?;
        total = total
            .checked_add(term)
            .ok_or_else(|| invalid(format!("duration '{raw}' is out of range")))?;
    }
    Ok(total)
}

fn invalid(message: String) -> EnvError {
    EnvErrorKind::Invalid { message }.into()
}
