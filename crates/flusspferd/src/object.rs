//! Object handles
//!
//! [`Object`] is a copyable, non-rooting handle to a managed object (or the
//! null object). Property access runs native hooks: a miss on an object paired
//! with a native instance asks its `property_resolve` hook first, and reads,
//! writes, additions and deletions on such an object pass through its
//! `property_op` hook.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::heap::{GcPtr, Heap, ObjectData, ObjectKind};
use crate::native_object::{self, Instance, PropertyMode, ResolveFlags};
use crate::property::{PropertyAttributes, PropertySlot, PropertyValue};
use crate::value::Value;
use std::rc::Rc;

/// Handle to a managed object; identity comparison by handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Object {
    ptr: Option<GcPtr>,
}

/// Result of looking at one object's own storage
enum Own {
    Data(Value, PropertyAttributes),
    Accessor {
        getter: Option<GcPtr>,
        setter: Option<GcPtr>,
    },
    Missing {
        prototype: Option<GcPtr>,
        native: Option<Rc<Instance>>,
    },
}

impl Object {
    /// The null object
    pub const fn null() -> Object {
        Object { ptr: None }
    }

    pub(crate) const fn from_ptr(ptr: GcPtr) -> Object {
        Object { ptr: Some(ptr) }
    }

    pub(crate) fn ptr(&self) -> Option<GcPtr> {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    pub(crate) fn require(&self) -> Result<GcPtr> {
        self.ptr
            .ok_or_else(|| Error::type_error("not an object (null)"))
    }

    /// Plain object inheriting from `Object.prototype`
    pub fn create() -> Result<Object> {
        let ctx = Context::current_or_err()?;
        Self::create_with_prototype(ctx.intrinsics().object_prototype)
    }

    /// Plain object with the given prototype (the null object for none)
    pub fn create_with_prototype(prototype: Object) -> Result<Object> {
        let ctx = Context::current_or_err()?;
        Ok(ctx.alloc_object(ObjectData::new(ObjectKind::Plain, prototype.ptr)))
    }

    // === Classification ===

    fn with_data<R>(&self, f: impl FnOnce(&ObjectData) -> R) -> Option<R> {
        let ptr = self.ptr?;
        let ctx = Context::current()?;
        let heap = ctx.heap();
        heap.object(ptr).ok().map(f)
    }

    pub fn is_array(&self) -> bool {
        self.with_data(|d| matches!(d.kind, ObjectKind::Array(_)))
            .unwrap_or(false)
    }

    pub fn is_function(&self) -> bool {
        self.with_data(|d| matches!(d.kind, ObjectKind::Function(_)))
            .unwrap_or(false)
    }

    /// Object created by one of the error constructors
    pub fn is_error(&self) -> bool {
        self.with_data(|d| matches!(d.kind, ObjectKind::Error))
            .unwrap_or(false)
    }

    /// Paired with a live or constructing native instance
    pub fn is_native(&self) -> bool {
        self.with_data(|d| d.private.is_some()).unwrap_or(false)
    }

    /// Whether the handle still refers to a live object
    pub fn is_alive(&self) -> bool {
        self.with_data(|_| ()).is_some()
    }

    pub(crate) fn instance(&self) -> Result<Option<Rc<Instance>>> {
        let ptr = self.require()?;
        let ctx = Context::current_or_err()?;
        let heap = ctx.heap();
        Ok(heap.object(ptr)?.private.clone())
    }

    // === Prototype and parent ===

    pub fn get_prototype(&self) -> Result<Object> {
        let ptr = self.require()?;
        let ctx = Context::current_or_err()?;
        let heap = ctx.heap();
        Ok(Object {
            ptr: heap.object(ptr)?.prototype,
        })
    }

    pub fn set_prototype(&self, prototype: Object) -> Result<()> {
        let ptr = self.require()?;
        let ctx = Context::current_or_err()?;
        let mut heap = ctx.heap_mut();
        let mut cursor = prototype.ptr;
        while let Some(p) = cursor {
            if p == ptr {
                return Err(Error::type_error("cyclic prototype chain"));
            }
            cursor = heap.object(p)?.prototype;
        }
        heap.object_mut(ptr)?.prototype = prototype.ptr;
        Ok(())
    }

    pub fn get_parent(&self) -> Result<Object> {
        let ptr = self.require()?;
        let ctx = Context::current_or_err()?;
        let heap = ctx.heap();
        Ok(Object {
            ptr: heap.object(ptr)?.parent,
        })
    }

    pub fn set_parent(&self, parent: Object) -> Result<()> {
        let ptr = self.require()?;
        let ctx = Context::current_or_err()?;
        let mut heap = ctx.heap_mut();
        heap.object_mut(ptr)?.parent = parent.ptr;
        Ok(())
    }

    // === Properties ===

    /// Read a property along the prototype chain; missing properties are `undefined`
    pub fn get_property(&self, name: &str) -> Result<Value> {
        let this = self.require()?;
        let ctx = Context::current_or_err()?;
        let mut value = self
            .lookup(&ctx, this, name, ResolveFlags::QUALIFIED)?
            .unwrap_or(Value::Undefined);
        self.run_op_hook(PropertyMode::Get, name, &mut value)?;
        Ok(value)
    }

    /// Read a property that must hold an object
    pub fn get_property_object(&self, name: &str) -> Result<Object> {
        match self.get_property(name)? {
            Value::Object(object) => Ok(object),
            other => Err(Error::type_error(format!(
                "property '{}' is {}, not an object",
                name,
                other.kind_name()
            ))),
        }
    }

    /// Write a property, honouring read-only attributes and inherited setters
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let mut value = value.into();
        let this = self.require()?;
        let ctx = Context::current_or_err()?;

        let mut own = own_lookup(&ctx.heap(), this, name)?;
        if let Own::Missing {
            native: Some(instance),
            ..
        } = &own
        {
            if native_object::run_resolve(*self, instance, name, ResolveFlags::ASSIGNING)? {
                own = own_lookup(&ctx.heap(), this, name)?;
            }
        }

        match own {
            Own::Data(_, attributes) if attributes.read_only => Err(read_only(name)),
            Own::Data(..) => {
                self.run_op_hook(PropertyMode::Set, name, &mut value)?;
                store(&mut ctx.heap_mut(), this, name, value)
            }
            Own::Accessor { setter, .. } => self.call_setter(name, setter, value),
            Own::Missing { prototype, .. } => {
                let inherited = inherited_for_set(&ctx.heap(), prototype, name)?;
                match inherited {
                    Some(Own::Accessor { setter, .. }) => {
                        return self.call_setter(name, setter, value);
                    }
                    Some(Own::Data(_, attributes)) if attributes.read_only => {
                        return Err(read_only(name));
                    }
                    _ => {}
                }
                self.run_op_hook(PropertyMode::Add, name, &mut value)?;
                store(&mut ctx.heap_mut(), this, name, value)
            }
        }
    }

    /// Define (or redefine) an own data property with explicit attributes
    pub fn define_property(
        &self,
        name: &str,
        value: impl Into<Value>,
        attributes: PropertyAttributes,
    ) -> Result<()> {
        let this = self.require()?;
        let ctx = Context::current_or_err()?;
        let mut heap = ctx.heap_mut();
        let data = heap.object_mut(this)?;
        if let ObjectKind::Array(elements) = &mut data.kind {
            if let Some(index) = array_index(name) {
                return set_element(elements, index, value.into());
            }
        }
        data.properties.insert(
            name,
            PropertySlot {
                value: PropertyValue::Data(value.into()),
                attributes,
            },
        );
        Ok(())
    }

    /// Define an own accessor property backed by function objects
    pub fn define_accessor(
        &self,
        name: &str,
        getter: Option<Object>,
        setter: Option<Object>,
        attributes: PropertyAttributes,
    ) -> Result<()> {
        let this = self.require()?;
        let ctx = Context::current_or_err()?;
        let mut heap = ctx.heap_mut();
        heap.object_mut(this)?.properties.insert(
            name,
            PropertySlot {
                value: PropertyValue::Accessor {
                    getter: getter.and_then(|g| g.ptr),
                    setter: setter.and_then(|s| s.ptr),
                },
                attributes,
            },
        );
        Ok(())
    }

    /// Property present on this object or its prototype chain
    ///
    /// Native resolve hooks are asked with [`ResolveFlags::DETECTING`], so a
    /// hook may decline to materialize a property for a mere presence test.
    pub fn has_property(&self, name: &str) -> Result<bool> {
        let this = self.require()?;
        let ctx = Context::current_or_err()?;
        Ok(self
            .lookup_slot(&ctx, this, name, ResolveFlags::DETECTING)?
            .is_some())
    }

    /// Property already defined on this object itself (no resolve hooks run)
    pub fn has_own_property(&self, name: &str) -> Result<bool> {
        let this = self.require()?;
        let ctx = Context::current_or_err()?;
        let own = own_lookup(&ctx.heap(), this, name)?;
        Ok(!matches!(own, Own::Missing { .. }))
    }

    /// Remove an own property; `false` if it is permanent
    pub fn delete_property(&self, name: &str) -> Result<bool> {
        let this = self.require()?;
        let ctx = Context::current_or_err()?;
        let attributes = match own_lookup(&ctx.heap(), this, name)? {
            Own::Missing { .. } => return Ok(true),
            Own::Data(_, attributes) => attributes,
            Own::Accessor { .. } => {
                let heap = ctx.heap();
                heap.object(this)?
                    .properties
                    .get(name)
                    .map(|slot| slot.attributes)
                    .unwrap_or_default()
            }
        };
        if attributes.dont_delete {
            return Ok(false);
        }

        let mut scratch = Value::Undefined;
        self.run_op_hook(PropertyMode::Delete, name, &mut scratch)?;

        let mut heap = ctx.heap_mut();
        let data = heap.object_mut(this)?;
        if let ObjectKind::Array(elements) = &mut data.kind {
            if let Some(index) = array_index(name) {
                if let Some(slot) = elements.get_mut(index) {
                    *slot = Value::Undefined;
                }
                return Ok(true);
            }
            if name == "length" {
                return Ok(false);
            }
        }
        data.properties.remove(name);
        Ok(true)
    }

    /// Own enumerable property names in definition order (array indices first)
    pub fn property_names(&self) -> Result<Vec<String>> {
        let this = self.require()?;
        let ctx = Context::current_or_err()?;
        let heap = ctx.heap();
        let data = heap.object(this)?;
        let mut names = Vec::new();
        if let ObjectKind::Array(elements) = &data.kind {
            names.extend((0..elements.len()).map(|i| i.to_string()));
        }
        names.extend(
            data.properties
                .iter()
                .filter(|(_, slot)| !slot.attributes.dont_enumerate)
                .map(|(name, _)| name.to_string()),
        );
        Ok(names)
    }

    /// Data property on the object or its prototype chain, without running hooks or getters
    pub(crate) fn get_data_property(&self, name: &str) -> Option<Value> {
        let ctx = Context::current()?;
        let heap = ctx.heap();
        let mut cursor = self.ptr;
        while let Some(ptr) = cursor {
            match own_lookup(&heap, ptr, name).ok()? {
                Own::Data(value, _) => return Some(value),
                Own::Accessor { .. } => return None,
                Own::Missing { prototype, .. } => cursor = prototype,
            }
        }
        None
    }

    // === Calls ===

    /// Call the method `name` with this object as receiver
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.get_property(name)?;
        match method {
            Value::Object(function) if function.is_function() => {
                function.call_with(*self, args)
            }
            other => Err(Error::type_error(format!(
                "'{}' is {}, not a function",
                name,
                other.kind_name()
            ))),
        }
    }

    /// Call this function object with an explicit receiver
    pub fn call_with(&self, this: impl Into<Value>, args: &[Value]) -> Result<Value> {
        crate::function::invoke(*self, this.into(), args)
    }

    /// `new` this function object
    pub fn construct(&self, args: &[Value]) -> Result<Object> {
        crate::function::construct(*self, args)
    }

    // === Internals ===

    /// String form used by value coercion
    pub(crate) fn to_display_string(&self) -> Result<String> {
        if self.is_null() {
            return Ok("null".to_string());
        }
        let method = self.get_property("toString")?;
        if let Value::Object(function) = method {
            if function.is_function() {
                return match function.call_with(*self, &[])? {
                    Value::Object(_) => Ok("[object Object]".to_string()),
                    primitive => primitive.to_std_string(),
                };
            }
        }
        Ok("[object Object]".to_string())
    }

    fn lookup(
        &self,
        ctx: &Context,
        start: GcPtr,
        name: &str,
        flags: ResolveFlags,
    ) -> Result<Option<Value>> {
        match self.lookup_slot(ctx, start, name, flags)? {
            Some(Own::Data(value, _)) => Ok(Some(value)),
            Some(Own::Accessor { getter, .. }) => match getter {
                Some(getter) => Object::from_ptr(getter)
                    .call_with(*self, &[])
                    .map(Some),
                None => Ok(Some(Value::Undefined)),
            },
            _ => Ok(None),
        }
    }

    fn lookup_slot(
        &self,
        ctx: &Context,
        start: GcPtr,
        name: &str,
        flags: ResolveFlags,
    ) -> Result<Option<Own>> {
        let mut cursor = Some(start);
        let mut hops = 0usize;
        while let Some(ptr) = cursor {
            let own = own_lookup(&ctx.heap(), ptr, name)?;
            let own = match own {
                Own::Missing {
                    native: Some(instance),
                    ..
                } => {
                    let holder = Object::from_ptr(ptr);
                    if native_object::run_resolve(holder, &instance, name, flags)? {
                        own_lookup(&ctx.heap(), ptr, name)?
                    } else {
                        Own::Missing {
                            prototype: ctx.heap().object(ptr)?.prototype,
                            native: None,
                        }
                    }
                }
                own => own,
            };
            match own {
                Own::Missing { prototype, .. } => cursor = prototype,
                found => return Ok(Some(found)),
            }
            hops += 1;
            if hops > 10_000 {
                return Err(Error::engine_error("prototype chain too long"));
            }
        }
        Ok(None)
    }

    fn call_setter(&self, name: &str, setter: Option<GcPtr>, value: Value) -> Result<()> {
        match setter {
            Some(setter) => {
                Object::from_ptr(setter).call_with(*self, &[value])?;
                Ok(())
            }
            None => Err(read_only(name)),
        }
    }

    fn run_op_hook(&self, mode: PropertyMode, name: &str, value: &mut Value) -> Result<()> {
        match self.instance()? {
            Some(instance) => native_object::run_property_op(*self, &instance, mode, name, value),
            None => Ok(()),
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::null()
    }
}

fn read_only(name: &str) -> Error {
    Error::type_error(format!("property '{}' is read-only", name))
}

/// Canonical array index (`"0"`, `"17"`, never `"01"`)
pub(crate) fn array_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse::<u32>().ok().map(|i| i as usize)
}

const MAX_DENSE_GROWTH: usize = 1 << 20;

fn set_element(elements: &mut Vec<Value>, index: usize, value: Value) -> Result<()> {
    if index >= elements.len() {
        if index - elements.len() > MAX_DENSE_GROWTH {
            return Err(Error::range_error(format!(
                "array index {} too far past the end",
                index
            )));
        }
        elements.resize(index + 1, Value::Undefined);
    }
    elements[index] = value;
    Ok(())
}

fn own_lookup(heap: &Heap, ptr: GcPtr, name: &str) -> Result<Own> {
    let data = heap.object(ptr)?;
    match &data.kind {
        ObjectKind::Array(elements) => {
            if name == "length" {
                let attributes = PropertyAttributes::NONE.dont_enumerate().dont_delete();
                return Ok(Own::Data(
                    Value::number(elements.len() as f64),
                    attributes,
                ));
            }
            if let Some(value) = array_index(name).and_then(|i| elements.get(i)) {
                return Ok(Own::Data(*value, PropertyAttributes::NONE));
            }
        }
        ObjectKind::Function(function) if name == "length" => {
            return Ok(Own::Data(
                Value::Int(function.arity as i32),
                PropertyAttributes::PERMANENT,
            ));
        }
        _ => {}
    }
    Ok(match data.properties.get(name) {
        Some(slot) => match slot.value {
            PropertyValue::Data(value) => Own::Data(value, slot.attributes),
            PropertyValue::Accessor { getter, setter } => Own::Accessor { getter, setter },
        },
        None => Own::Missing {
            prototype: data.prototype,
            native: data.private.clone(),
        },
    })
}

/// Inherited slot that decides how an assignment to a missing own property behaves
fn inherited_for_set(heap: &Heap, mut cursor: Option<GcPtr>, name: &str) -> Result<Option<Own>> {
    while let Some(ptr) = cursor {
        match own_lookup(heap, ptr, name)? {
            Own::Missing { prototype, .. } => cursor = prototype,
            found => return Ok(Some(found)),
        }
    }
    Ok(None)
}

fn store(heap: &mut Heap, ptr: GcPtr, name: &str, value: Value) -> Result<()> {
    let data = heap.object_mut(ptr)?;
    if let ObjectKind::Array(elements) = &mut data.kind {
        if let Some(index) = array_index(name) {
            return set_element(elements, index, value);
        }
        if name == "length" {
            let length = value.to_number()?;
            if length < 0.0 || length.fract() != 0.0 || length > u32::MAX as f64 {
                return Err(Error::range_error("invalid array length"));
            }
            let length = length as usize;
            if length > elements.len() + MAX_DENSE_GROWTH {
                return Err(Error::range_error("invalid array length"));
            }
            elements.resize(length, Value::Undefined);
            return Ok(());
        }
    }
    match data.properties.get_mut(name) {
        Some(slot) => slot.value = PropertyValue::Data(value),
        None => data.properties.insert(
            name,
            PropertySlot {
                value: PropertyValue::Data(value),
                attributes: PropertyAttributes::NONE,
            },
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::current_context_scope;
    use rstest::rstest;

    #[rstest]
    #[case("0", Some(0))]
    #[case("42", Some(42))]
    #[case("01", None)]
    #[case("-1", None)]
    #[case("length", None)]
    #[case("", None)]
    fn test_array_index(#[case] name: &str, #[case] expected: Option<usize>) {
        assert_eq!(array_index(name), expected);
    }

    #[test]
    fn test_null_object_operations_are_type_errors() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let err = Object::null().get_property("x").unwrap_err();
        assert!(err.is(crate::ErrorKind::Type));
        assert!(Value::Int(1).get_object().is_err());
    }

    #[test]
    fn test_read_only_property_rejects_assignment() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let obj = Object::create().unwrap();
        obj.define_property("fixed", 1, PropertyAttributes::NONE.read_only())
            .unwrap();
        let err = obj.set_property("fixed", 2).unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert_eq!(obj.get_property("fixed").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_permanent_property_survives_delete() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let obj = Object::create().unwrap();
        obj.define_property("keep", true, PropertyAttributes::PERMANENT)
            .unwrap();
        obj.set_property("drop", true).unwrap();
        assert!(!obj.delete_property("keep").unwrap());
        assert!(obj.delete_property("drop").unwrap());
        assert!(obj.has_own_property("keep").unwrap());
        assert!(!obj.has_own_property("drop").unwrap());
    }

    #[test]
    fn test_prototype_chain_lookup_and_cycle_rejection() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let proto = Object::create().unwrap();
        proto.set_property("inherited", 7).unwrap();
        let child = Object::create_with_prototype(proto).unwrap();
        assert_eq!(child.get_property("inherited").unwrap(), Value::Int(7));
        assert!(child.has_property("inherited").unwrap());
        assert!(!child.has_own_property("inherited").unwrap());
        assert!(proto.set_prototype(child).is_err());
    }

    #[test]
    fn test_property_names_skip_hidden() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let obj = Object::create().unwrap();
        obj.set_property("b", 1).unwrap();
        obj.define_property("hidden", 2, PropertyAttributes::HIDDEN)
            .unwrap();
        obj.set_property("a", 3).unwrap();
        assert_eq!(obj.property_names().unwrap(), vec!["b", "a"]);
    }
}
