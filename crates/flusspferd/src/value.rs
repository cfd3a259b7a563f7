//! Value representation
//!
//! [`Value`] is a copyable handle to one engine datum. Copying a value never
//! roots it: a string or object handle held only in a native local may be
//! collected at the next allocation unless it is protected by a [`crate::Root`],
//! a [`crate::LocalRootRegion`], a [`crate::PersistentRoot`] or an active call.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::heap::GcPtr;
use crate::object::Object;
use std::fmt;
use std::rc::Rc;

/// Engine value
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(JsString),
    Object(Object),
}

/// Handle to an interned engine string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsString {
    pub(crate) ptr: GcPtr,
}

impl JsString {
    /// Intern `text` in the current context
    pub fn new(text: &str) -> Result<JsString> {
        let ctx = Context::current_or_err()?;
        let ptr = ctx.heap_mut().intern(text);
        Ok(JsString { ptr })
    }

    /// Contents of the string
    pub fn text(&self) -> Result<Rc<str>> {
        Context::current_or_err()?.heap().string(self.ptr)
    }

    /// Length in UTF-16 code units
    pub fn len(&self) -> Result<usize> {
        Ok(self.text()?.encode_utf16().count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.text()?.is_empty())
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<stale string>"),
        }
    }
}

impl Value {
    /// Intern `text` and wrap it as a string value
    pub fn string(text: &str) -> Result<Value> {
        Ok(Value::String(JsString::new(text)?))
    }

    /// Number value, using the integer representation when it is exact
    pub fn number(n: f64) -> Value {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            Value::Int(n as i32)
        } else {
            Value::Double(n)
        }
    }

    // === Kind queries ===

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined_or_null(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Value::Double(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_function(&self) -> bool {
        match self {
            Value::Object(object) => object.is_function(),
            _ => false,
        }
    }

    /// Name of the value's kind, as used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }

    /// Result of the `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Null => "object",
            Value::Object(object) if object.is_function() => "function",
            other => other.kind_name(),
        }
    }

    // === Typed access ===

    pub fn get_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(kind_mismatch("boolean", other)),
        }
    }

    pub fn get_int(&self) -> Result<i32> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(kind_mismatch("integer", other)),
        }
    }

    /// Numeric payload; integers are widened
    pub fn get_double(&self) -> Result<f64> {
        match self {
            Value::Double(n) => Ok(*n),
            Value::Int(n) => Ok(*n as f64),
            other => Err(kind_mismatch("number", other)),
        }
    }

    pub fn get_string(&self) -> Result<JsString> {
        match self {
            Value::String(s) => Ok(*s),
            other => Err(kind_mismatch("string", other)),
        }
    }

    pub fn get_object(&self) -> Result<Object> {
        match self {
            Value::Object(o) => Ok(*o),
            other => Err(kind_mismatch("object", other)),
        }
    }

    // === Coercions ===

    pub fn to_boolean(&self) -> Result<bool> {
        Ok(match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Double(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.text()?.is_empty(),
            Value::Object(_) => true,
        })
    }

    /// Numeric coercion
    ///
    /// Objects have no primitive conversion here and fail with a TypeError.
    pub fn to_number(&self) -> Result<f64> {
        Ok(match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int(n) => *n as f64,
            Value::Double(n) => *n,
            Value::String(s) => string_to_number(&s.text()?),
            Value::Object(_) => {
                return Err(Error::type_error("cannot convert object to number"));
            }
        })
    }

    /// Integral conversion modulo `2^bits` (`bits` in 1..=53)
    pub fn to_integral_number(&self, bits: u32, signed: bool) -> Result<f64> {
        if bits == 0 || bits > 53 {
            return Err(Error::range_error(format!(
                "integral conversion to {} bits is not supported",
                bits
            )));
        }
        let n = self.to_number()?;
        if !n.is_finite() {
            return Ok(0.0);
        }
        let modulus = 2f64.powi(bits as i32);
        let mut result = n.trunc() % modulus;
        if result < 0.0 {
            result += modulus;
        }
        if signed && result >= modulus / 2.0 {
            result -= modulus;
        }
        Ok(result)
    }

    /// String coercion; objects use their `toString` method when they have one
    pub fn to_std_string(&self) -> Result<String> {
        Ok(match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Double(n) => number_to_string(*n),
            Value::String(s) => s.text()?.to_string(),
            Value::Object(object) => object.to_display_string()?,
        })
    }

    pub fn to_js_string(&self) -> Result<JsString> {
        match self {
            Value::String(s) => Ok(*s),
            other => JsString::new(&other.to_std_string()?),
        }
    }

    pub fn to_object(&self) -> Result<Object> {
        match self {
            Value::Object(o) => Ok(*o),
            other => Err(Error::type_error(format!(
                "cannot convert {} to object",
                other.kind_name()
            ))),
        }
    }

    /// Source-like rendering used for inspection (the shell prints results this way)
    pub fn to_source(&self) -> Result<String> {
        crate::convert::to_source(*self)
    }

    // === Comparison ===

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => {
                a.get_double().ok() == b.get_double().ok()
            }
            // Interned: equal contents share a handle
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> Result<bool> {
        if self.kind_name() == other.kind_name() {
            return Ok(self.strict_equals(other));
        }
        Ok(match (self, other) {
            (a, b) if a.is_undefined_or_null() && b.is_undefined_or_null() => true,
            (a, b) if a.is_undefined_or_null() || b.is_undefined_or_null() => false,
            (Value::Object(_), _) | (_, Value::Object(_)) => false,
            (a, b) => {
                let (x, y) = (a.to_number()?, b.to_number()?);
                x == y
            }
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.strict_equals(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    /// The null object handle becomes `null`
    fn from(o: Object) -> Self {
        if o.is_null() {
            Value::Null
        } else {
            Value::Object(o)
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

fn kind_mismatch(expected: &str, found: &Value) -> Error {
    Error::type_error(format!(
        "expected {}, found {}",
        expected,
        found.kind_name()
    ))
}

/// Number to string following the engine's formatting rules
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n < 0.0 {
        format!("-{}", positive_number_to_string(-n))
    } else {
        positive_number_to_string(n)
    }
}

/// Shortest round-trip digits placed by decimal exponent: plain notation
/// for 1e-6 <= n < 1e21, exponent notation otherwise
fn positive_number_to_string(n: f64) -> String {
    // `{:e}` yields the shortest digits as `d[.ddd]e<exp>`
    let scientific = format!("{:e}", n);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    // Position of the decimal point relative to the first digit
    let point = exponent + 1;

    if k <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{}.{}", int, frac)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, sign, exponent.abs())
        } else {
            format!("{}.{}e{}{}", first, rest, sign, exponent.abs())
        }
    }
}

fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    // Rust accepts "inf"/"nan" spellings that the engine does not
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}
