//! Flusspferd - bridge between native Rust code and a garbage-collected
//! scripting engine
//!
//! This library provides:
//! - Values and object handles that cross the native/script boundary
//! - Scope-based rooting that keeps native-held values alive across collections
//! - Native objects with lazy property hooks, tracing and finalization
//! - Class registration turning a Rust type into a script constructor
//! - Call marshalling between script functions and Rust closures
//! - A small script evaluator and the dynamic extension ABI
//!
//! ```no_run
//! # fn main() -> flusspferd::Result<()> {
//! flusspferd::initialize();
//! let ctx = flusspferd::context::create()?;
//! let _scope = flusspferd::current_context_scope(&ctx);
//!
//! flusspferd::create_native_function(ctx.global(), "twice", 1, |call| {
//!     let n = call.arg(0).to_number()?;
//!     call.set_result(n * 2.0);
//!     Ok(())
//! })?;
//! let value = flusspferd::evaluate("twice(21)", "<main>", 1)?;
//! assert_eq!(value.to_number()?, 42.0);
//! # Ok(())
//! # }
//! ```

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod array;
pub mod call_context;
pub mod class;
pub mod context;
pub mod convert;
pub mod error;
pub mod eval;
pub mod extension;
pub mod function;
pub mod native_object;
pub mod object;
pub mod params;
pub mod property;
pub mod property_iterator;
pub mod root;
pub mod security;
pub mod tracer;
pub mod value;

mod ast;
mod heap;
mod interpreter;
mod lexer;
mod parser;
mod stdlib;
mod token;

pub use array::{create_array, Array};
pub use call_context::{Arguments, CallContext};
pub use class::{
    class_prototype, create, create_named, create_with_args, load_class, ClassDescription,
    ClassInfo, NativeClass,
};
pub use context::{
    create as create_context, current_context_scope, gc, initialize, Context, ContextOptions,
    CurrentContextScope,
};
pub use convert::{FromValue, ToValue};
pub use error::{Error, ErrorKind, Result, ThrownValue};
pub use eval::{evaluate, execute, is_compilable};
pub use extension::{invoke_extension, ExtensionEntry, RawObject, RawValue, LOAD_SYMBOL};
pub use function::{create_native_function, function_name, ArityCheck, NativeFunctionBuilder};
pub use heap::GcStats;
pub use native_object::{
    get_native, is_native, AsAny, Native, NativeObject, NativeObjectBase, NativeRef,
    NativeRefMut, NativeState, PropertyMode, ResolveFlags,
};
pub use object::Object;
pub use params::{BoundParams, FromParams, NamedParams, ParamSpec};
pub use property::PropertyAttributes;
pub use property_iterator::PropertyIterator;
pub use root::{LocalRootRegion, PersistentRoot, Root, Rootable};
pub use security::{
    Capability, CapabilityCheck, Permission, PermissionSet, SecurityContext, SecurityError,
};
pub use tracer::Tracer;
pub use value::{JsString, Value};
