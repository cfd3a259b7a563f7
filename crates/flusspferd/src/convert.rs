//! Conversion between Rust types and engine values
//!
//! - [`ToValue`] turns a Rust value into an engine [`Value`]
//! - [`FromValue`] extracts a Rust value, failing with a TypeError on mismatch
//!
//! Sequences map to arrays and string-keyed maps to plain objects.
//!
//! ```no_run
//! # fn main() -> flusspferd::Result<()> {
//! use flusspferd::{FromValue, ToValue};
//!
//! let value = vec![1.5, 2.5].to_value()?;
//! let back: Vec<f64> = FromValue::from_value(value)?;
//! assert_eq!(back, vec![1.5, 2.5]);
//! # Ok(())
//! # }
//! ```

use crate::array::{create_array, Array};
use crate::error::{Error, Result};
use crate::function::function_name;
use crate::object::Object;
use crate::root::LocalRootRegion;
use crate::value::{number_to_string, JsString, Value};
use std::collections::HashMap;

/// Convert a Rust value into an engine value
pub trait ToValue {
    fn to_value(&self) -> Result<Value>;
}

/// Extract a Rust value from an engine value
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &str, found: &Value) -> Error {
    Error::type_error(format!(
        "type mismatch: expected {}, found {}",
        expected,
        found.kind_name()
    ))
}

impl ToValue for Value {
    fn to_value(&self) -> Result<Value> {
        Ok(*self)
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl ToValue for Object {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::from(*self))
    }
}

impl FromValue for Object {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(object),
            Value::Null => Ok(Object::null()),
            other => Err(mismatch("object", &other)),
        }
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::number(*self))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(n) => Ok(n as f64),
            Value::Double(n) => Ok(n),
            other => Err(mismatch("number", &other)),
        }
    }
}

impl ToValue for i32 {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Int(*self))
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Double(n) if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 => {
                Ok(n as i32)
            }
            Value::Double(n) => Err(Error::range_error(format!(
                "{} is not representable as a 32-bit integer",
                number_to_string(n)
            ))),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Bool(*self))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl ToValue for str {
    fn to_value(&self) -> Result<Value> {
        Value::string(self)
    }
}

impl ToValue for String {
    fn to_value(&self) -> Result<Value> {
        Value::string(self)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s.text()?.to_string()),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromValue for JsString {
    fn from_value(value: Value) -> Result<Self> {
        value.get_string()
    }
}

impl ToValue for () {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Undefined)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Result<Value> {
        match self {
            Some(inner) => inner.to_value(),
            None => Ok(Value::Null),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_undefined_or_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Result<Value> {
        let region = LocalRootRegion::new()?;
        let array = region.keep(create_array(&[])?.object());
        let array = Array::from_object(array)?;
        for item in self {
            let value = region.keep(item.to_value()?);
            array.push(value)?;
        }
        Ok(array.into())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Result<Value> {
        self.as_slice().to_value()
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        let array = Array::from_object(value.to_object()?)?;
        array
            .to_vec()?
            .into_iter()
            .enumerate()
            .map(|(index, element)| {
                T::from_value(element).map_err(|err| {
                    Error::type_error(format!("array element {}: {}", index, err.message()))
                })
            })
            .collect()
    }
}

impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(&self) -> Result<Value> {
        let region = LocalRootRegion::new()?;
        let object = region.keep(Object::create()?);
        let mut keys: Vec<&String> = self.keys().collect();
        keys.sort();
        for key in keys {
            let value = region.keep(self[key].to_value()?);
            object.set_property(key, value)?;
        }
        Ok(Value::Object(object))
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: Value) -> Result<Self> {
        let object = value.to_object()?;
        let mut map = HashMap::new();
        for key in object.property_names()? {
            let element = object.get_property(&key)?;
            let converted = T::from_value(element).map_err(|err| {
                Error::type_error(format!("property '{}': {}", key, err.message()))
            })?;
            map.insert(key, converted);
        }
        Ok(map)
    }
}

// === Source rendering ===

/// Source-like rendering of `value` (what the shell prints)
pub(crate) fn to_source(value: Value) -> Result<String> {
    let mut seen = Vec::new();
    render(value, true, &mut seen)
}

fn render(value: Value, top: bool, seen: &mut Vec<Object>) -> Result<String> {
    Ok(match value {
        Value::Undefined => "(void 0)".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Double(n) => number_to_string(n),
        Value::String(s) => quote(&s.text()?),
        Value::Object(object) => {
            if seen.contains(&object) {
                return Ok("<cycle>".to_string());
            }
            seen.push(object);
            let rendered = render_object(object, top, seen);
            seen.pop();
            rendered?
        }
    })
}

fn render_object(object: Object, top: bool, seen: &mut Vec<Object>) -> Result<String> {
    if object.is_function() {
        let name = function_name(object).unwrap_or_else(|| "".into());
        return Ok(format!("function {}() {{\n    [native code]\n}}", name));
    }
    if object.is_error() {
        let name = object.get_property("name")?.to_std_string()?;
        let message = object.get_property("message")?;
        let message = render(Value::String(message.to_js_string()?), false, seen)?;
        return Ok(format!("(new {}({}))", name, message));
    }
    if object.is_array() {
        let elements = Array::from_object(object)?.to_vec()?;
        let mut parts = Vec::with_capacity(elements.len());
        for element in elements {
            parts.push(render(element, false, seen)?);
        }
        return Ok(format!("[{}]", parts.join(", ")));
    }
    if let Value::Object(method) = object.get_property("toSource")? {
        if method.is_function() {
            return method.call_with(object, &[])?.to_std_string();
        }
    }

    let mut parts = Vec::new();
    for key in object.property_names()? {
        let value = object.get_property(&key)?;
        let key = if is_identifier(&key) { key } else { quote(&key) };
        parts.push(format!("{}:{}", key, render(value, false, seen)?));
    }
    let body = format!("{{{}}}", parts.join(", "));
    Ok(if top { format!("({})", body) } else { body })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Double-quoted string literal with escapes
pub(crate) fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{current_context_scope, Context};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vec_round_trip_through_array() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let value = vec![1.0, 2.5].to_value().unwrap();
        assert!(value.get_object().unwrap().is_array());
        let back: Vec<f64> = FromValue::from_value(value).unwrap();
        assert_eq!(back, vec![1.0, 2.5]);
    }

    #[test]
    fn test_element_mismatch_names_index() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let value = vec![Value::Int(1), Value::Bool(true)].to_value().unwrap();
        let err = <Vec<i32>>::from_value(value).unwrap_err();
        assert!(err.to_string().contains("array element 1"));
    }

    #[test]
    fn test_map_becomes_plain_object() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let mut map = HashMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        let value = map.to_value().unwrap();
        assert_eq!(to_source(value).unwrap(), "({a:1, b:2})");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn test_option_maps_null() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        assert_eq!(None::<i32>.to_value().unwrap(), Value::Null);
        assert_eq!(Option::<i32>::from_value(Value::Undefined).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::Int(4)).unwrap(), Some(4));
    }
}
