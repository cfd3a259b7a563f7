//! Globals the shell adds to its context
//!
//! `print`, `quit`, `gc`, the `environment` projection and the `arguments`
//! array holding the script's command-line arguments.

use flusspferd::{
    create, create_array, create_native_function, CallContext, Capability, CapabilityCheck,
    ClassInfo, Context, Error, LocalRootRegion, NativeClass, NativeFunctionBuilder, NativeObject,
    NativeObjectBase, Object, PropertyAttributes, ResolveFlags, Result, Value,
};

pub fn install(ctx: &Context, args: &[String]) -> Result<()> {
    let global = ctx.global();

    NativeFunctionBuilder::new("print")
        .variadic(0)
        .with_implementation(print)
        .install(global)?;
    NativeFunctionBuilder::new("quit")
        .variadic(0)
        .with_implementation(quit)
        .install(global)?;
    create_native_function(global, "gc", 0, |_| {
        flusspferd::gc();
        Ok(())
    })?;

    let environment = create::<Environment>(())?;
    global.define_property(
        "environment",
        environment.object(),
        PropertyAttributes::NONE.dont_enumerate(),
    )?;

    let region = LocalRootRegion::new()?;
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(region.keep(Value::string(arg)?));
    }
    let arguments = create_array(&values)?;
    global.set_property("arguments", arguments.object())?;
    Ok(())
}

/// `print(...)`: arguments as strings, separated by spaces
fn print(call: &mut CallContext<'_>) -> Result<()> {
    let mut parts = Vec::with_capacity(call.arguments().len());
    for value in call.arguments().iter() {
        parts.push(value.to_std_string()?);
    }
    println!("{}", parts.join(" "));
    Ok(())
}

/// `quit([code])`
fn quit(call: &mut CallContext<'_>) -> Result<()> {
    let code = match call.arg(0) {
        Value::Undefined => 0,
        value => value.to_number()? as i32,
    };
    Err(Error::Quit(code))
}

/// Process environment as lazily resolved properties
///
/// A variable becomes a property on first read, provided the context's
/// security policy grants access to it. Presence tests never resolve.
#[derive(Debug, Default)]
pub struct Environment;

fn check_access(name: &str) -> Result<()> {
    let ctx = Context::current().ok_or_else(|| Error::engine_error("no current context"))?;
    ctx.security()
        .check(&Capability::Environment(name.to_string()))?;
    Ok(())
}

impl NativeObject for Environment {
    fn property_resolve(&mut self, this: Object, name: &str, flags: ResolveFlags) -> Result<bool> {
        if flags.contains(ResolveFlags::DETECTING) {
            return Ok(false);
        }
        let Ok(value) = std::env::var(name) else {
            return Ok(false);
        };
        check_access(name)?;
        this.define_property(name, Value::string(&value)?, PropertyAttributes::NONE)?;
        Ok(true)
    }

    fn enumerate(&self) -> Vec<String> {
        std::env::vars_os()
            .filter_map(|(name, _)| name.into_string().ok())
            .filter(|name| check_access(name).is_ok())
            .collect()
    }
}

impl NativeClass for Environment {
    type Params = ();

    fn class_info() -> ClassInfo {
        ClassInfo::new("Environment").constructible(false)
    }

    fn construct(_base: &mut NativeObjectBase, _params: ()) -> Result<Self> {
        Ok(Environment)
    }
}
