//! Per-invocation call record handed to native code

use crate::error::{Error, Result};
use crate::object::Object;
use crate::root::LocalRootRegion;
use crate::value::Value;

/// Positional arguments of one call
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    values: &'a [Value],
}

impl<'a> Arguments<'a> {
    pub(crate) fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument `index`, or `undefined` past the end
    pub fn get(&self, index: usize) -> Value {
        self.values.get(index).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + 'a {
        self.values.iter().copied()
    }

    pub fn as_slice(&self) -> &'a [Value] {
        self.values
    }
}

/// Receiver, arguments, result slot and callee of one native invocation
///
/// Arguments, the receiver and the result are rooted for the duration of the
/// call. A call context never outlives the invocation it describes.
pub struct CallContext<'a> {
    this: Value,
    arguments: Arguments<'a>,
    function: Object,
    region: &'a LocalRootRegion,
    result_slot: usize,
    result: Value,
    construct: bool,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        this: Value,
        arguments: &'a [Value],
        function: Object,
        region: &'a LocalRootRegion,
        construct: bool,
    ) -> Self {
        let result_slot = region.slot(Value::Undefined);
        Self {
            this,
            arguments: Arguments::new(arguments),
            function,
            region,
            result_slot,
            result: Value::Undefined,
            construct,
        }
    }

    /// The receiver as passed by the caller
    pub fn this(&self) -> Value {
        self.this
    }

    /// The receiver, which must be an object
    pub fn self_object(&self) -> Result<Object> {
        match self.this {
            Value::Object(object) => Ok(object),
            other => Err(Error::type_error(format!(
                "method called on {}, not an object",
                other.kind_name()
            ))),
        }
    }

    pub fn arguments(&self) -> Arguments<'a> {
        self.arguments
    }

    /// Shorthand for `arguments().get(index)`
    pub fn arg(&self, index: usize) -> Value {
        self.arguments.get(index)
    }

    /// The function object being invoked (null for direct native dispatch)
    pub fn function(&self) -> Object {
        self.function
    }

    /// Invoked through `new`
    pub fn is_construct_call(&self) -> bool {
        self.construct
    }

    pub fn result(&self) -> Value {
        self.result
    }

    /// Store the return value; it stays rooted until the call returns
    pub fn set_result(&mut self, value: impl Into<Value>) {
        let value = value.into();
        self.result = value;
        self.region.update(self.result_slot, value);
    }

    /// Root an intermediate value for the rest of the call
    ///
    /// The entry goes on top of the root stack. While a nested
    /// [`LocalRootRegion`](crate::LocalRootRegion) is open it lands inside
    /// that region and is released when the region drops; keep the value in
    /// the nested region (or a [`PersistentRoot`](crate::PersistentRoot))
    /// if it must outlive it.
    pub fn keep<T: crate::root::Rootable>(&self, value: T) -> T {
        self.region.keep(value)
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("this", &self.this)
            .field("arguments", &self.arguments)
            .field("result", &self.result)
            .field("construct", &self.construct)
            .finish()
    }
}
