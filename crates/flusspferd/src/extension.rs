//! Dynamic extension ABI
//!
//! A native extension library exports exactly one symbol,
//! [`LOAD_SYMBOL`] (`flusspferd_load`), with the C signature of
//! [`ExtensionEntry`]. The module loader (outside this crate) opens the
//! library, makes a context current and calls the entry with the container
//! object the extension should populate.
//!
//! ```no_run
//! use flusspferd::{create_native_function, Object, Result, Value};
//!
//! fn load(container: Object) -> Result<Value> {
//!     create_native_function(container, "answer", 0, |call| {
//!         call.set_result(42);
//!         Ok(())
//!     })?;
//!     Ok(Value::Undefined)
//! }
//!
//! flusspferd::flusspferd_extension!(load);
//! ```
//!
//! Handles cross the boundary as plain `{index, generation}` pairs; both sides
//! must link the same copy of this crate so they share the current context.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::heap::GcPtr;
use crate::object::Object;
use crate::value::{JsString, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Exported symbol name
pub const LOAD_SYMBOL: &str = "flusspferd_load";

/// Object handle in C layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawObject {
    pub index: u32,
    pub generation: u32,
    /// 0 for the null object
    pub present: u8,
}

/// Value in C layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawValue {
    pub tag: u8,
    /// Payload: boolean (0/1), i32, f64 bits or heap index
    pub bits: u64,
    pub generation: u32,
}

/// Entry point signature
pub type ExtensionEntry = unsafe extern "C" fn(RawObject) -> RawValue;

const TAG_UNDEFINED: u8 = 0;
const TAG_NULL: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_DOUBLE: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_OBJECT: u8 = 6;

impl From<Object> for RawObject {
    fn from(object: Object) -> Self {
        match object.ptr() {
            Some(ptr) => RawObject {
                index: ptr.index,
                generation: ptr.generation,
                present: 1,
            },
            None => RawObject {
                index: 0,
                generation: 0,
                present: 0,
            },
        }
    }
}

impl From<RawObject> for Object {
    fn from(raw: RawObject) -> Self {
        if raw.present == 0 {
            Object::null()
        } else {
            Object::from_ptr(GcPtr {
                index: raw.index,
                generation: raw.generation,
            })
        }
    }
}

impl RawValue {
    pub const UNDEFINED: RawValue = RawValue {
        tag: TAG_UNDEFINED,
        bits: 0,
        generation: 0,
    };
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        let (tag, bits, generation) = match value {
            Value::Undefined => (TAG_UNDEFINED, 0, 0),
            Value::Null => (TAG_NULL, 0, 0),
            Value::Bool(b) => (TAG_BOOL, u64::from(b), 0),
            Value::Int(n) => (TAG_INT, n as u32 as u64, 0),
            Value::Double(n) => (TAG_DOUBLE, n.to_bits(), 0),
            Value::String(s) => (TAG_STRING, u64::from(s.ptr.index), s.ptr.generation),
            Value::Object(o) => match o.ptr() {
                Some(ptr) => (TAG_OBJECT, u64::from(ptr.index), ptr.generation),
                None => (TAG_NULL, 0, 0),
            },
        };
        RawValue {
            tag,
            bits,
            generation,
        }
    }
}

impl TryFrom<RawValue> for Value {
    type Error = Error;

    fn try_from(raw: RawValue) -> Result<Self> {
        let ptr = || GcPtr {
            index: raw.bits as u32,
            generation: raw.generation,
        };
        Ok(match raw.tag {
            TAG_UNDEFINED => Value::Undefined,
            TAG_NULL => Value::Null,
            TAG_BOOL => Value::Bool(raw.bits != 0),
            TAG_INT => Value::Int(raw.bits as u32 as i32),
            TAG_DOUBLE => Value::Double(f64::from_bits(raw.bits)),
            TAG_STRING => Value::String(JsString { ptr: ptr() }),
            TAG_OBJECT => Value::Object(Object::from_ptr(ptr())),
            tag => {
                return Err(Error::binding_error(format!(
                    "invalid value tag {} from extension",
                    tag
                )));
            }
        })
    }
}

/// Extension side: run `load` for the container passed by the host
///
/// Errors and panics are logged and reported as `undefined`.
#[doc(hidden)]
pub fn run_extension(container: RawObject, load: fn(Object) -> Result<Value>) -> RawValue {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        Context::current_or_err()?;
        load(Object::from(container))
    }));
    match outcome {
        Ok(Ok(value)) => RawValue::from(value),
        Ok(Err(err)) => {
            warn!(error = %err, "extension failed to load");
            RawValue::UNDEFINED
        }
        Err(_) => {
            warn!("extension panicked while loading");
            RawValue::UNDEFINED
        }
    }
}

/// Host side: call an extension entry point with `container`
///
/// # Safety
///
/// `entry` must be a `flusspferd_load` function built against this crate's ABI.
pub unsafe fn invoke_extension(entry: ExtensionEntry, container: Object) -> Result<Value> {
    Context::current_or_err()?;
    let raw = entry(RawObject::from(container));
    Value::try_from(raw)
}

/// Export `$load: fn(Object) -> Result<Value>` as the extension entry point
#[macro_export]
macro_rules! flusspferd_extension {
    ($load:path) => {
        #[no_mangle]
        pub extern "C" fn flusspferd_load(
            container: $crate::extension::RawObject,
        ) -> $crate::extension::RawValue {
            $crate::extension::run_extension(container, $load)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_round_trip_preserves_primitives() {
        for value in [
            Value::Undefined,
            Value::Null,
            Value::Bool(true),
            Value::Int(-7),
            Value::Double(0.25),
        ] {
            let back = Value::try_from(RawValue::from(value)).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_invalid_tag_is_binding_error() {
        let raw = RawValue {
            tag: 99,
            bits: 0,
            generation: 0,
        };
        assert!(Value::try_from(raw).unwrap_err().is(crate::ErrorKind::Binding));
    }

    #[test]
    fn test_null_object_round_trip() {
        let raw = RawObject::from(Object::null());
        assert_eq!(raw.present, 0);
        assert!(Object::from(raw).is_null());
    }
}
