//! Intrinsic objects
//!
//! Every context starts with a global object holding `Object`, `Array` and the
//! error constructors (`Error`, `TypeError`, `RangeError`, `ReferenceError`,
//! `SyntaxError`, `InternalError`, plus the bridge's own `BindingError`,
//! `ResourceError` and `SecurityError`).

use crate::array::{create_array, Array};
use crate::call_context::CallContext;
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::function::NativeFunctionBuilder;
use crate::heap::{ObjectData, ObjectKind};
use crate::object::Object;
use crate::property::PropertyAttributes;
use crate::root::LocalRootRegion;
use crate::value::Value;

const ERROR_KINDS: [ErrorKind; 8] = [
    ErrorKind::Type,
    ErrorKind::Range,
    ErrorKind::Reference,
    ErrorKind::Binding,
    ErrorKind::Syntax,
    ErrorKind::Engine,
    ErrorKind::Resource,
    ErrorKind::Security,
];

/// Objects every context owns; all of them are roots
#[derive(Debug, Clone, Copy)]
pub(crate) struct Intrinsics {
    pub global: Object,
    pub object_prototype: Object,
    pub function_prototype: Object,
    pub array_prototype: Object,
    pub error_prototype: Object,
    pub kind_prototypes: [Object; 8],
}

impl Intrinsics {
    pub fn empty() -> Self {
        Self {
            global: Object::null(),
            object_prototype: Object::null(),
            function_prototype: Object::null(),
            array_prototype: Object::null(),
            error_prototype: Object::null(),
            kind_prototypes: [Object::null(); 8],
        }
    }

    pub fn roots(&self, out: &mut Vec<Value>) {
        let fixed = [
            self.global,
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.error_prototype,
        ];
        out.extend(
            fixed
                .iter()
                .chain(self.kind_prototypes.iter())
                .filter(|o| !o.is_null())
                .map(|o| Value::Object(*o)),
        );
    }

    pub fn error_prototype_for(&self, kind: ErrorKind) -> Object {
        ERROR_KINDS
            .iter()
            .position(|k| *k == kind)
            .map(|i| self.kind_prototypes[i])
            .unwrap_or(self.error_prototype)
    }
}

/// Fresh error object of `kind` carrying `message`
pub(crate) fn create_error(kind: ErrorKind, message: &str) -> Result<Object> {
    let ctx = Context::current_or_err()?;
    let prototype = ctx.intrinsics().error_prototype_for(kind);
    error_object(&ctx, prototype, Value::string(message)?)
}

fn error_object(ctx: &Context, prototype: Object, message: Value) -> Result<Object> {
    let region = LocalRootRegion::in_context(ctx);
    region.keep(message);
    let error = ctx.alloc_object(ObjectData::new(ObjectKind::Error, prototype.ptr()));
    if !message.is_undefined() {
        error.define_property("message", message, PropertyAttributes::HIDDEN)?;
    }
    Ok(error)
}

/// Build the intrinsics of `ctx` (which must be current)
pub(crate) fn install(ctx: &Context) -> Result<Intrinsics> {
    let region = LocalRootRegion::in_context(ctx);
    let mut intrinsics = Intrinsics::empty();

    intrinsics.object_prototype = region.keep(Object::create_with_prototype(Object::null())?);
    intrinsics.function_prototype =
        region.keep(Object::create_with_prototype(intrinsics.object_prototype)?);
    ctx.set_intrinsics(intrinsics);

    intrinsics.global = region.keep(Object::create()?);
    intrinsics.array_prototype = region.keep(Object::create()?);
    intrinsics.error_prototype = region.keep(Object::create()?);
    for slot in intrinsics.kind_prototypes.iter_mut() {
        *slot = region.keep(Object::create_with_prototype(intrinsics.error_prototype)?);
    }
    ctx.set_intrinsics(intrinsics);

    install_object(&intrinsics)?;
    install_array(&intrinsics)?;
    install_errors(&intrinsics)?;
    Ok(intrinsics)
}

fn constructor(
    global: Object,
    name: &str,
    prototype: Object,
    body: impl Fn(&mut CallContext<'_>) -> Result<()> + 'static,
) -> Result<Object> {
    let ctor = NativeFunctionBuilder::new(name)
        .variadic(1)
        .constructible(true)
        .with_implementation(body)
        .install(global)?;
    ctor.define_property("prototype", prototype, PropertyAttributes::PERMANENT)?;
    prototype.define_property("constructor", ctor, PropertyAttributes::HIDDEN)?;
    Ok(ctor)
}

fn method(
    target: Object,
    name: &str,
    arity: u32,
    body: impl Fn(&mut CallContext<'_>) -> Result<()> + 'static,
) -> Result<()> {
    NativeFunctionBuilder::new(name)
        .variadic(arity)
        .with_implementation(body)
        .install(target)?;
    Ok(())
}

fn install_object(intrinsics: &Intrinsics) -> Result<()> {
    let proto = intrinsics.object_prototype;
    constructor(intrinsics.global, "Object", proto, |call| {
        if let Value::Object(object) = call.arg(0) {
            call.set_result(object);
        } else if !call.is_construct_call() {
            call.set_result(Object::create()?);
        }
        Ok(())
    })?;
    method(proto, "toString", 0, |call| {
        let text = match call.this() {
            Value::Object(o) if o.is_array() => "[object Array]",
            Value::Object(o) if o.is_function() => "[object Function]",
            Value::Object(o) if o.is_error() => "[object Error]",
            Value::Object(_) => "[object Object]",
            Value::Undefined => "[object Undefined]",
            Value::Null => "[object Null]",
            _ => "[object Object]",
        };
        call.set_result(Value::string(text)?);
        Ok(())
    })?;
    method(proto, "hasOwnProperty", 1, |call| {
        let name = call.arg(0).to_std_string()?;
        let has = call.self_object()?.has_own_property(&name)?;
        call.set_result(has);
        Ok(())
    })?;
    Ok(())
}

fn join(array: Array, separator: &str) -> Result<String> {
    let mut parts = Vec::new();
    for element in array.to_vec()? {
        parts.push(if element.is_undefined_or_null() {
            String::new()
        } else {
            element.to_std_string()?
        });
    }
    Ok(parts.join(separator))
}

fn this_array(call: &CallContext<'_>) -> Result<Array> {
    Array::from_object(call.self_object()?)
}

fn install_array(intrinsics: &Intrinsics) -> Result<()> {
    let proto = intrinsics.array_prototype;
    constructor(intrinsics.global, "Array", proto, |call| {
        let args = call.arguments();
        let array = match (args.len(), args.get(0)) {
            (1, Value::Int(n)) if n >= 0 => create_array(&vec![Value::Undefined; n as usize])?,
            (1, Value::Int(_)) | (1, Value::Double(_)) => {
                return Err(crate::Error::range_error("invalid array length"));
            }
            _ => create_array(args.as_slice())?,
        };
        call.set_result(array);
        Ok(())
    })?;
    method(proto, "push", 1, |call| {
        let array = this_array(call)?;
        let mut length = array.len()?;
        for value in call.arguments().iter() {
            length = array.push(value)?;
        }
        call.set_result(Value::number(length as f64));
        Ok(())
    })?;
    method(proto, "pop", 0, |call| {
        let value = this_array(call)?.pop()?;
        call.set_result(value);
        Ok(())
    })?;
    method(proto, "join", 1, |call| {
        let separator = match call.arg(0) {
            Value::Undefined => ",".to_string(),
            other => other.to_std_string()?,
        };
        let text = join(this_array(call)?, &separator)?;
        call.set_result(Value::string(&text)?);
        Ok(())
    })?;
    method(proto, "toString", 0, |call| {
        let text = join(this_array(call)?, ",")?;
        call.set_result(Value::string(&text)?);
        Ok(())
    })?;
    Ok(())
}

fn install_errors(intrinsics: &Intrinsics) -> Result<()> {
    let base = intrinsics.error_prototype;
    base.define_property("name", Value::string("Error")?, PropertyAttributes::HIDDEN)?;
    base.define_property("message", Value::string("")?, PropertyAttributes::HIDDEN)?;
    method(base, "toString", 0, |call| {
        let this = call.self_object()?;
        let name = this.get_property("name")?.to_std_string()?;
        let message = this.get_property("message")?.to_std_string()?;
        let text = if message.is_empty() {
            name
        } else {
            format!("{}: {}", name, message)
        };
        call.set_result(Value::string(&text)?);
        Ok(())
    })?;
    error_constructor(intrinsics.global, "Error", base)?;

    for (kind, prototype) in ERROR_KINDS.iter().zip(intrinsics.kind_prototypes) {
        prototype.define_property("name", Value::string(kind.name())?, PropertyAttributes::HIDDEN)?;
        error_constructor(intrinsics.global, kind.name(), prototype)?;
    }
    Ok(())
}

fn error_constructor(global: Object, name: &str, prototype: Object) -> Result<Object> {
    constructor(global, name, prototype, move |call| {
        let ctx = Context::current_or_err()?;
        let message = match call.arg(0) {
            Value::Undefined => Value::Undefined,
            other => Value::String(other.to_js_string()?),
        };
        let error = error_object(&ctx, prototype, message)?;
        call.set_result(error);
        Ok(())
    })
}
