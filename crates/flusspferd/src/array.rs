//! Array handles

use crate::context::Context;
use crate::error::{Error, Result};
use crate::heap::{ObjectData, ObjectKind};
use crate::object::Object;
use crate::value::Value;

/// Object handle known to refer to an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Array {
    object: Object,
}

/// New array holding `values`
pub fn create_array(values: &[Value]) -> Result<Array> {
    let ctx = Context::current_or_err()?;
    let prototype = ctx.intrinsics().array_prototype;
    let object = ctx.alloc_object(ObjectData::new(
        ObjectKind::Array(values.to_vec()),
        prototype.ptr(),
    ));
    Ok(Array { object })
}

impl Array {
    /// View `object` as an array; TypeError if it is not one
    pub fn from_object(object: Object) -> Result<Array> {
        if object.is_array() {
            Ok(Array { object })
        } else {
            Err(Error::type_error("object is not an array"))
        }
    }

    pub fn object(&self) -> Object {
        self.object
    }

    fn with_elements<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        let ptr = self.object.require()?;
        let ctx = Context::current_or_err()?;
        let mut heap = ctx.heap_mut();
        match &mut heap.object_mut(ptr)?.kind {
            ObjectKind::Array(elements) => Ok(f(elements)),
            _ => Err(Error::type_error("object is not an array")),
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.with_elements(|e| e.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Element `index`; RangeError past the end
    pub fn get(&self, index: usize) -> Result<Value> {
        self.with_elements(|e| e.get(index).copied())?
            .ok_or_else(|| Error::range_error(format!("array index {} out of bounds", index)))
    }

    /// Store element `index`, growing the array with `undefined` as needed
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.object.set_property(&index.to_string(), value)
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        self.with_elements(|e| {
            e.push(value);
            e.len()
        })
    }

    pub fn pop(&self) -> Result<Value> {
        Ok(self.with_elements(|e| e.pop())?.unwrap_or_default())
    }

    /// Snapshot of the elements
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        self.with_elements(|e| e.clone())
    }
}

impl From<Array> for Object {
    fn from(array: Array) -> Object {
        array.object
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Value {
        Value::Object(array.object)
    }
}
