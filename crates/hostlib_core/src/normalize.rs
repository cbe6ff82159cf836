use crate::abi::MAX_CODEPOINT;
use crate::introspect::ReturnType;
use crate::memory::{read_cstr, LinearMemory};
use crate::strings::numeric::{format_fixed, format_shortest, FIXED_FRACTION_DIGITS};
use crate::strings::{symbol_from_codepoint, StrRef, StringPool};
use serde::Serialize;

/// Exact decimal expansion of `f64::MAX` with the fixed fractional width.
pub const DBL_MAX_DECIMAL: &str = "179769313486231570814527423731704356798070567525844996598917476803157260780028538760589558632766878171540458953514382464234321326889464182768467546703537516986049910576551282076245490090389328944075868508455133942304583236903222948165808559332123348274797826204144723168738177180919299881250404026184124858368.000000000000000";

/// Declared result types whose value is text or a single character.
pub const TEXT_TYPES: &[&str] = &["лит", "сим", "string", "char"];

const FIXED_ABOVE: f64 = 1e21;
const FIXED_BELOW: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RawValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    None,
}

impl RawValue {
    fn as_int(self) -> Option<i64> {
        match self {
            RawValue::I32(value) => Some(value as i64),
            RawValue::I64(value) => Some(value),
            _ => None,
        }
    }

    fn as_float(self) -> Option<f64> {
        match self {
            RawValue::I32(value) => Some(value as f64),
            RawValue::I64(value) => Some(value as f64),
            RawValue::F32(value) => Some(value as f64),
            RawValue::F64(value) => Some(value),
            RawValue::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions<'a> {
    pub return_type: ReturnType,
    pub declared_type: Option<&'a str>,
}

impl NormalizeOptions<'_> {
    fn is_text(&self) -> bool {
        self.declared_type
            .is_some_and(|declared| TEXT_TYPES.contains(&declared.trim()))
    }
}

fn fixed(value: f64) -> String {
    if value == f64::MAX {
        return DBL_MAX_DECIMAL.to_string();
    }
    format_fixed(value, FIXED_FRACTION_DIGITS)
}

fn generic_float(value: f64) -> String {
    let magnitude = value.abs();
    if value.is_finite() && (magnitude >= FIXED_ABOVE || (value != 0.0 && magnitude < FIXED_BELOW)) {
        return fixed(value);
    }
    format_shortest(value)
}

/// Pool handle, C-string or single code point, in that order.
fn interpret_text(raw: i64, pool: &StringPool, memory: &dyn LinearMemory) -> Option<String> {
    match StrRef::classify(raw) {
        StrRef::Handle(handle) => {
            return pool
                .value(handle)
                .ok()
                .filter(|value| !value.is_empty())
                .map(str::to_string);
        }
        StrRef::Addr(addr) if addr != 0 => {
            let text = read_cstr(memory, addr);
            if !text.is_empty() {
                return Some(text);
            }
        }
        StrRef::Addr(_) => {}
    }
    if (0..=MAX_CODEPOINT).contains(&raw) {
        return symbol_from_codepoint(raw).map(String::from);
    }
    None
}

/// Renders a raw entry-point result for display.
pub fn normalize(
    value: RawValue,
    options: &NormalizeOptions<'_>,
    pool: &StringPool,
    memory: &dyn LinearMemory,
) -> String {
    if value == RawValue::None {
        return String::new();
    }
    if options.is_text() && options.return_type == ReturnType::I32 {
        if let Some(text) = value
            .as_int()
            .and_then(|raw| interpret_text(raw, pool, memory))
        {
            return text;
        }
    }
    if options.return_type.is_float() {
        return value.as_float().map(fixed).unwrap_or_default();
    }
    match value {
        RawValue::I32(value) => value.to_string(),
        RawValue::I64(value) => value.to_string(),
        RawValue::F32(value) => generic_float(value as f64),
        RawValue::F64(value) => generic_float(value),
        RawValue::None => String::new(),
    }
}
