//! Positional-or-named parameter binding
//!
//! A [`ParamSpec`] lists a callee's parameters in order, with defaults. A call
//! may pass them positionally, or (when named parameters are enabled) by name
//! in a plain options object given as the last argument:
//!
//! ```text
//! new Buffer(16, "utf-8")
//! new Buffer({size: 16, encoding: "utf-8"})
//! new Buffer(16, {encoding: "utf-8"})
//! ```
//!
//! Unknown names, duplicate bindings, missing required parameters and surplus
//! positional arguments are argument errors (RangeError).

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::value::Value;

#[derive(Debug, Clone)]
struct ParamDef {
    name: &'static str,
    required: bool,
    default: Value,
}

/// Parameter list of a native callee
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    params: Vec<ParamDef>,
    named: bool,
    rest: bool,
}

impl ParamSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter that must be bound
    pub fn required(mut self, name: &'static str) -> Self {
        self.params.push(ParamDef {
            name,
            required: true,
            default: Value::Undefined,
        });
        self
    }

    /// Optional parameter defaulting to `undefined`
    pub fn optional(self, name: &'static str) -> Self {
        self.optional_with(name, Value::Undefined)
    }

    /// Optional parameter with a primitive default
    pub fn optional_with(mut self, name: &'static str, default: impl Into<Value>) -> Self {
        self.params.push(ParamDef {
            name,
            required: false,
            default: default.into(),
        });
        self
    }

    /// Accept a trailing options object
    pub fn named(mut self) -> Self {
        self.named = true;
        self
    }

    /// Collect surplus positional arguments instead of rejecting them
    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| argument_error(format!("unknown parameter '{}'", name)))
    }

    /// Bind call arguments
    pub fn bind(&self, args: &[Value]) -> Result<BoundParams> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut positional = args;
        let mut options = None;

        if self.named {
            if let Some((Value::Object(last), init)) = args.split_last() {
                if is_options_object(*last) {
                    options = Some(*last);
                    positional = init;
                }
            }
        }

        let mut rest = Vec::new();
        for (i, value) in positional.iter().enumerate() {
            match slots.get_mut(i) {
                Some(slot) => *slot = Some(*value),
                None if self.rest => rest.push(*value),
                None => {
                    return Err(argument_error(format!(
                        "too many arguments (expected at most {}, got {})",
                        self.params.len(),
                        positional.len()
                    )));
                }
            }
        }

        if let Some(options) = options {
            for name in options.property_names()? {
                let index = self.index_of(&name)?;
                if slots[index].is_some() {
                    return Err(argument_error(format!(
                        "parameter '{}' given twice",
                        name
                    )));
                }
                slots[index] = Some(options.get_property(&name)?);
            }
        }

        self.finish(slots, rest)
    }

    /// Bind parameters given by name from native code
    pub fn bind_named(&self, named: &NamedParams) -> Result<BoundParams> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        for (name, value) in &named.entries {
            let index = self.index_of(name)?;
            if slots[index].replace(*value).is_some() {
                return Err(argument_error(format!(
                    "parameter '{}' given twice",
                    name
                )));
            }
        }
        self.finish(slots, Vec::new())
    }

    fn finish(&self, slots: Vec<Option<Value>>, rest: Vec<Value>) -> Result<BoundParams> {
        let mut values = Vec::with_capacity(self.params.len());
        for (def, slot) in self.params.iter().zip(slots) {
            match slot {
                Some(value) => values.push(value),
                None if def.required => {
                    return Err(argument_error(format!(
                        "missing required parameter '{}'",
                        def.name
                    )));
                }
                None => values.push(def.default),
            }
        }
        Ok(BoundParams {
            names: self.params.iter().map(|p| p.name).collect(),
            values,
            rest,
        })
    }
}

/// Parameters passed by name from native code
#[derive(Debug, Clone, Default)]
pub struct NamedParams {
    entries: Vec<(String, Value)>,
}

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }
}

/// Result of binding a [`ParamSpec`]
#[derive(Debug, Clone, Default)]
pub struct BoundParams {
    names: Vec<&'static str>,
    values: Vec<Value>,
    rest: Vec<Value>,
}

impl BoundParams {
    /// Value of parameter `name` (`undefined` if no such parameter is declared)
    pub fn get(&self, name: &str) -> Value {
        self.names
            .iter()
            .position(|n| *n == name)
            .and_then(|i| self.values.get(i).copied())
            .unwrap_or_default()
    }

    /// Like [`BoundParams::get`] but `None` for `undefined`
    pub fn get_opt(&self, name: &str) -> Option<Value> {
        Some(self.get(name)).filter(|v| !v.is_undefined())
    }

    pub fn positional(&self, index: usize) -> Value {
        self.values.get(index).copied().unwrap_or_default()
    }

    /// Surplus positional arguments (when the declaration accepts them)
    pub fn rest(&self) -> &[Value] {
        &self.rest
    }
}

/// Options struct built from bound parameters
pub trait FromParams: Sized {
    fn param_spec() -> ParamSpec {
        ParamSpec::new()
    }

    fn from_params(params: &BoundParams) -> Result<Self>;
}

impl FromParams for () {
    fn from_params(_: &BoundParams) -> Result<Self> {
        Ok(())
    }
}

fn argument_error(message: String) -> Error {
    Error::range_error(format!("argument error: {}", message))
}

/// Plain, non-native object whose prototype is `Object.prototype`
fn is_options_object(object: Object) -> bool {
    if object.is_array() || object.is_function() || object.is_error() || object.is_native() {
        return false;
    }
    let Some(ctx) = Context::current() else {
        return false;
    };
    object
        .get_prototype()
        .map(|proto| proto == ctx.intrinsics().object_prototype)
        .unwrap_or(false)
}
