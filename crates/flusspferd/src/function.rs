//! Native functions
//!
//! Every callable in the engine is a function object whose body is a Rust
//! closure taking a [`CallContext`]. Functions can be registered with a fixed
//! arity (validated before the body runs) or as variadic.
//!
//! ```no_run
//! # fn main() -> flusspferd::Result<()> {
//! use flusspferd::{Context, NativeFunctionBuilder, Value};
//!
//! let ctx = Context::current().expect("a current context");
//! NativeFunctionBuilder::new("add")
//!     .with_arity(2)
//!     .with_implementation(|call| {
//!         let sum = call.arg(0).to_number()? + call.arg(1).to_number()?;
//!         call.set_result(Value::number(sum));
//!         Ok(())
//!     })
//!     .install(ctx.global())?;
//! # Ok(())
//! # }
//! ```

use crate::call_context::CallContext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::heap::{ObjectData, ObjectKind};
use crate::object::Object;
use crate::property::PropertyAttributes;
use crate::root::LocalRootRegion;
use crate::value::Value;
use std::rc::Rc;
use tracing::trace;

/// Body of a native function
pub type NativeBody = Rc<dyn Fn(&mut CallContext<'_>) -> Result<()>>;

/// How the argument count is validated before the body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityCheck {
    /// Exactly `arity` arguments
    Exact,
    /// Any number of arguments; `arity` is informational
    Variadic,
}

pub(crate) struct FunctionData {
    pub name: Rc<str>,
    pub arity: u32,
    pub check: ArityCheck,
    pub constructible: bool,
    pub body: NativeBody,
}

/// Create a fixed-arity function and store it on `container` under `name`
pub fn create_native_function<F>(
    container: Object,
    name: &str,
    arity: u32,
    body: F,
) -> Result<Object>
where
    F: Fn(&mut CallContext<'_>) -> Result<()> + 'static,
{
    NativeFunctionBuilder::new(name)
        .with_arity(arity)
        .with_implementation(body)
        .install(container)
}

/// Builder for native function objects
pub struct NativeFunctionBuilder {
    name: String,
    arity: u32,
    check: ArityCheck,
    constructible: bool,
    implementation: Option<NativeBody>,
}

impl NativeFunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: 0,
            check: ArityCheck::Variadic,
            constructible: false,
            implementation: None,
        }
    }

    /// Require exactly `arity` arguments
    pub fn with_arity(mut self, arity: u32) -> Self {
        self.arity = arity;
        self.check = ArityCheck::Exact;
        self
    }

    /// Accept any number of arguments; `declared` becomes the `length` property
    pub fn variadic(mut self, declared: u32) -> Self {
        self.arity = declared;
        self.check = ArityCheck::Variadic;
        self
    }

    /// Allow `new` on the function
    pub fn constructible(mut self, constructible: bool) -> Self {
        self.constructible = constructible;
        self
    }

    pub fn with_implementation<F>(mut self, implementation: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<()> + 'static,
    {
        self.implementation = Some(Rc::new(implementation));
        self
    }

    /// Allocate the function object
    pub fn build(self) -> Result<Object> {
        let body = self.implementation.ok_or_else(|| {
            Error::binding_error(format!(
                "native function '{}' missing implementation",
                self.name
            ))
        })?;
        let ctx = Context::current_or_err()?;
        let prototype = ctx.intrinsics().function_prototype;
        let data = FunctionData {
            name: Rc::from(self.name.as_str()),
            arity: self.arity,
            check: self.check,
            constructible: self.constructible,
            body,
        };
        Ok(ctx.alloc_object(ObjectData::new(
            ObjectKind::Function(data),
            prototype.ptr(),
        )))
    }

    /// Build and define on `container` as a hidden property
    pub fn install(self, container: Object) -> Result<Object> {
        let name = self.name.clone();
        let function = self.build()?;
        container.define_property(&name, function, PropertyAttributes::HIDDEN)?;
        Ok(function)
    }
}

/// Name of a function object, if it is one
pub fn function_name(function: Object) -> Option<Rc<str>> {
    let ptr = function.ptr()?;
    let ctx = Context::current()?;
    let heap = ctx.heap();
    match &heap.object(ptr).ok()?.kind {
        ObjectKind::Function(data) => Some(data.name.clone()),
        _ => None,
    }
}

struct Callee {
    name: Rc<str>,
    arity: u32,
    check: ArityCheck,
    constructible: bool,
    body: NativeBody,
}

fn callee(ctx: &Context, function: Object) -> Result<Callee> {
    let ptr = function
        .ptr()
        .ok_or_else(|| Error::type_error("null is not a function"))?;
    let heap = ctx.heap();
    match &heap.object(ptr)?.kind {
        ObjectKind::Function(data) => Ok(Callee {
            name: data.name.clone(),
            arity: data.arity,
            check: data.check,
            constructible: data.constructible,
            body: data.body.clone(),
        }),
        _ => Err(Error::type_error("object is not a function")),
    }
}

fn check_arity(callee: &Callee, given: usize) -> Result<()> {
    if callee.check == ArityCheck::Exact && given != callee.arity as usize {
        return Err(Error::range_error(format!(
            "function '{}' expects {} argument{}, got {}",
            callee.name,
            callee.arity,
            if callee.arity == 1 { "" } else { "s" },
            given
        )));
    }
    Ok(())
}

/// Call `function` with receiver `this`
pub(crate) fn invoke(function: Object, this: Value, args: &[Value]) -> Result<Value> {
    let ctx = Context::current_or_err()?;
    let callee = callee(&ctx, function)?;
    let _depth = ctx.enter_call()?;
    check_arity(&callee, args.len())?;

    let region = LocalRootRegion::in_context(&ctx);
    region.keep(function);
    region.keep(this);
    for arg in args {
        region.keep(*arg);
    }

    trace!(function = %callee.name, args = args.len(), "native call");
    let mut call = CallContext::new(this, args, function, &region, false);
    (callee.body)(&mut call)?;
    Ok(call.result())
}

/// `new function(...args)`
pub(crate) fn construct(function: Object, args: &[Value]) -> Result<Object> {
    let ctx = Context::current_or_err()?;
    let callee = callee(&ctx, function)?;
    if !callee.constructible {
        return Err(Error::type_error(format!(
            "{} is not a constructor",
            callee.name
        )));
    }
    let _depth = ctx.enter_call()?;
    check_arity(&callee, args.len())?;

    let region = LocalRootRegion::in_context(&ctx);
    region.keep(function);
    for arg in args {
        region.keep(*arg);
    }
    let prototype = match function.get_property("prototype")? {
        Value::Object(prototype) => prototype,
        _ => ctx.intrinsics().object_prototype,
    };
    let this = region.keep(Object::create_with_prototype(prototype)?);

    trace!(function = %callee.name, args = args.len(), "native construct");
    let mut call = CallContext::new(Value::Object(this), args, function, &region, true);
    (callee.body)(&mut call)?;
    Ok(match call.result() {
        Value::Object(object) if !object.is_null() => object,
        _ => this,
    })
}
