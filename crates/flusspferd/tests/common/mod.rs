//! Shared test fixtures
//!
//! Native classes used across the integration tests and a helper that makes
//! a fresh context current.

#![allow(dead_code)]

use flusspferd::{
    context, current_context_scope, BoundParams, CallContext, ClassDescription, ClassInfo,
    Context, ContextOptions, CurrentContextScope, Error, FromParams, NativeClass, NativeObject,
    NativeObjectBase, Object, ParamSpec, PropertyAttributes, ResolveFlags, Result, Value,
};
use std::cell::Cell;
use std::collections::BTreeSet;

/// Fresh context made current until the scope drops
pub fn setup() -> (Context, CurrentContextScope) {
    let ctx = context::create().expect("context");
    let scope = current_context_scope(&ctx);
    (ctx, scope)
}

/// Context without allocation-triggered collections
pub fn setup_manual_gc() -> (Context, CurrentContextScope) {
    let ctx = Context::with_options(ContextOptions::default().with_gc_threshold(0))
        .expect("context");
    let scope = current_context_scope(&ctx);
    (ctx, scope)
}

/// Evaluate `source`, panicking with the error message on failure
pub fn eval(source: &str) -> Value {
    match flusspferd::evaluate(source, "test", 1) {
        Ok(value) => value,
        Err(err) => panic!("evaluation of {:?} failed: {}", source, err),
    }
}

// ============================================================================
// StringSet
// ============================================================================

/// Set of strings with `add`, `has`, `remove` and `size` methods
#[derive(Debug, Default)]
pub struct StringSet {
    pub items: BTreeSet<String>,
}

impl NativeObject for StringSet {}

impl NativeClass for StringSet {
    type Params = ();

    fn class_info() -> ClassInfo {
        ClassInfo::new("StringSet")
    }

    fn class_description() -> ClassDescription<Self> {
        ClassDescription::new()
            .method("add", |set: &mut StringSet, call| {
                for value in call.arguments().iter() {
                    set.items.insert(value.to_std_string()?);
                }
                call.set_result(call.this());
                Ok(())
            })
            .method("has", |set: &mut StringSet, call| {
                let key = call.arg(0).to_std_string()?;
                call.set_result(set.items.contains(&key));
                Ok(())
            })
            .method("remove", |set: &mut StringSet, call| {
                let key = call.arg(0).to_std_string()?;
                call.set_result(set.items.remove(&key));
                Ok(())
            })
            .method("size", |set: &mut StringSet, call| {
                call.set_result(set.items.len() as i32);
                Ok(())
            })
    }

    fn construct(_base: &mut NativeObjectBase, _params: ()) -> Result<Self> {
        Ok(StringSet::default())
    }
}

// ============================================================================
// Counted
// ============================================================================

thread_local! {
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

/// Destructor runs observed on this thread
pub fn drops() -> usize {
    DROPS.with(|d| d.get())
}

pub fn reset_drops() {
    DROPS.with(|d| d.set(0));
}

/// Instance whose destructor is counted
#[derive(Debug)]
pub struct Counted {
    pub id: i32,
}

impl Drop for Counted {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

pub struct CountedParams {
    pub id: i32,
}

impl FromParams for CountedParams {
    fn param_spec() -> ParamSpec {
        ParamSpec::new().optional_with("id", 0).named()
    }

    fn from_params(params: &BoundParams) -> Result<Self> {
        Ok(CountedParams {
            id: params.get("id").to_number()? as i32,
        })
    }
}

impl NativeObject for Counted {}

impl NativeClass for Counted {
    type Params = CountedParams;

    fn class_info() -> ClassInfo {
        ClassInfo::new("Counted").arity(1)
    }

    fn class_description() -> ClassDescription<Self> {
        ClassDescription::new().property("id", |counted: &Counted| Ok(Value::Int(counted.id)))
    }

    fn construct(_base: &mut NativeObjectBase, params: CountedParams) -> Result<Self> {
        if params.id < 0 {
            return Err(Error::range_error("id must not be negative"));
        }
        Ok(Counted { id: params.id })
    }
}

// ============================================================================
// Environment projection
// ============================================================================

/// Projects process environment variables as lazily resolved properties
///
/// Presence tests decline to resolve, so a variable only becomes a property
/// once it has been read.
#[derive(Debug, Default)]
pub struct Environment;

impl NativeObject for Environment {
    fn property_resolve(&mut self, this: Object, name: &str, flags: ResolveFlags) -> Result<bool> {
        if flags.contains(ResolveFlags::DETECTING) {
            return Ok(false);
        }
        match std::env::var(name) {
            Ok(value) => {
                this.define_property(name, Value::string(&value)?, PropertyAttributes::NONE)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn enumerate(&self) -> Vec<String> {
        std::env::vars_os()
            .filter_map(|(name, _)| name.into_string().ok())
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

// ============================================================================
// Greeter (per-instance methods and invalid_method)
// ============================================================================

/// Registers `greet` per instance; unknown methods answer with their name
#[derive(Debug)]
pub struct Greeter {
    pub greeting: String,
    pub fallback_calls: usize,
}

pub struct GreeterParams {
    pub greeting: String,
    pub with_method: bool,
}

impl FromParams for GreeterParams {
    fn param_spec() -> ParamSpec {
        ParamSpec::new()
            .optional("greeting")
            .optional_with("with_method", true)
            .named()
    }

    fn from_params(params: &BoundParams) -> Result<Self> {
        let greeting = match params.get("greeting") {
            Value::String(s) => s.text()?.to_string(),
            _ => "hello".to_string(),
        };
        Ok(GreeterParams {
            greeting,
            with_method: params.get("with_method").to_boolean()?,
        })
    }
}

impl NativeObject for Greeter {
    fn invalid_method(&mut self, name: &str, call: &mut CallContext<'_>) -> Result<()> {
        self.fallback_calls += 1;
        call.set_result(Value::string(&format!("no method {}", name))?);
        Ok(())
    }
}

impl NativeClass for Greeter {
    type Params = GreeterParams;

    fn class_info() -> ClassInfo {
        ClassInfo::new("Greeter")
    }

    fn construct(base: &mut NativeObjectBase, params: GreeterParams) -> Result<Self> {
        if params.with_method {
            base.register_method("greet", |greeter: &mut Greeter, call| {
                let whom = call.arg(0).to_std_string()?;
                let text = format!("{}, {}", greeter.greeting, whom);
                call.set_result(Value::string(&text)?);
                Ok(())
            })?;
        }
        Ok(Greeter {
            greeting: params.greeting,
            fallback_calls: 0,
        })
    }
}
