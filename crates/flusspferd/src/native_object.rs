//! Native object binding
//!
//! A native type exposed to script is paired 1:1 with a managed object. The
//! managed object's private slot holds an [`Instance`] that owns the Rust
//! value, its per-instance method table and its lifecycle state:
//!
//! ```text
//! Uninitialized -> Constructing -> Live -> Finalizing -> Destroyed
//! ```
//!
//! Only the collector finalizes a live instance (when its object is swept or
//! the context is destroyed). A failed construction detaches the instance from
//! its object, so later calls on that object fail with a binding error.

use crate::call_context::CallContext;
use crate::context::{BusyGuard, Context};
use crate::error::{Error, Result};
use crate::function::NativeFunctionBuilder;
use crate::object::Object;
use crate::property::PropertyAttributes;
use crate::root::LocalRootRegion;
use crate::tracer::Tracer;
use crate::value::Value;
use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitOr, Deref, DerefMut};
use std::rc::Rc;
use tracing::{debug, trace};

/// Upcast helper so trait objects can be downcast to their concrete type
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Hooks a native type implements to take part in property lookup and collection
pub trait NativeObject: AsAny {
    /// Report values held outside the managed graph
    fn trace(&self, _tracer: &mut Tracer) {}

    /// Property miss on the paired object
    ///
    /// Return `true` after defining `name` on `this`. Must be idempotent and
    /// limited to defining the resolved property.
    fn property_resolve(
        &mut self,
        _this: Object,
        _name: &str,
        _flags: ResolveFlags,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Observe or rewrite an add/get/set/delete on the paired object
    fn property_op(
        &mut self,
        _this: Object,
        _mode: PropertyMode,
        _name: &str,
        _value: &mut Value,
    ) -> Result<()> {
        Ok(())
    }

    /// Names `property_resolve` can materialize (used to flush lazy properties)
    fn enumerate(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called for a method name missing from the dispatch table
    fn invalid_method(&mut self, name: &str, _call: &mut CallContext<'_>) -> Result<()> {
        Err(Error::binding_error(format!("Invalid method '{}'", name)))
    }
}

/// Context of a resolve request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveFlags(u8);

impl ResolveFlags {
    pub const NONE: ResolveFlags = ResolveFlags(0);
    /// Plain `obj.name` access
    pub const QUALIFIED: ResolveFlags = ResolveFlags(1);
    /// Left-hand side of an assignment
    pub const ASSIGNING: ResolveFlags = ResolveFlags(1 << 1);
    /// Presence test (`has_property`, `in`); the property is not read
    pub const DETECTING: ResolveFlags = ResolveFlags(1 << 2);
    /// Variable declaration
    pub const DECLARING: ResolveFlags = ResolveFlags(1 << 3);

    pub fn contains(self, other: ResolveFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ResolveFlags {
    type Output = ResolveFlags;

    fn bitor(self, rhs: ResolveFlags) -> ResolveFlags {
        ResolveFlags(self.0 | rhs.0)
    }
}

/// Operation observed by [`NativeObject::property_op`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyMode {
    Add,
    Get,
    Set,
    Delete,
}

/// Lifecycle state of a native instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeState {
    Uninitialized,
    Constructing,
    Live,
    Finalizing,
    Destroyed,
}

/// Type-erased method callback
pub(crate) type ErasedMethod = Rc<dyn Fn(&mut dyn Any, &mut CallContext<'_>) -> Result<()>>;

pub(crate) fn erase_method<T, F>(f: F) -> ErasedMethod
where
    T: NativeObject,
    F: Fn(&mut T, &mut CallContext<'_>) -> Result<()> + 'static,
{
    Rc::new(move |target: &mut dyn Any, call: &mut CallContext<'_>| {
        let target = target.downcast_mut::<T>().ok_or_else(|| {
            Error::binding_error("method called on an instance of another class")
        })?;
        f(target, call)
    })
}

/// Method-name to callback table: class methods shared by every instance plus per-instance additions
#[derive(Clone, Default)]
pub(crate) struct MethodTable {
    shared: Rc<HashMap<String, ErasedMethod>>,
    own: HashMap<String, ErasedMethod>,
}

impl MethodTable {
    pub fn with_shared(shared: Rc<HashMap<String, ErasedMethod>>) -> Self {
        Self {
            shared,
            own: HashMap::new(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ErasedMethod> {
        self.own
            .get(name)
            .or_else(|| self.shared.get(name))
            .cloned()
    }
}

/// Binding state a native constructor receives
pub struct NativeObjectBase {
    object: Object,
    methods: MethodTable,
    state: Rc<Cell<NativeState>>,
}

impl NativeObjectBase {
    /// The paired managed object
    ///
    /// A weak back-reference: identity only, not traced. The object is alive
    /// for as long as the instance is live.
    pub fn self_object(&self) -> Object {
        self.object
    }

    pub fn state(&self) -> NativeState {
        self.state.get()
    }

    /// Add a method to this instance's dispatch table and expose it on the object
    pub fn register_method<T, F>(&mut self, name: &str, f: F) -> Result<()>
    where
        T: NativeObject,
        F: Fn(&mut T, &mut CallContext<'_>) -> Result<()> + 'static,
    {
        self.methods.own.insert(name.to_string(), erase_method(f));
        let trampoline = method_trampoline(name)?;
        self.object
            .define_property(name, trampoline, PropertyAttributes::HIDDEN)
    }

    /// Whether `name` is in the dispatch table
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.lookup(name).is_some()
    }
}

impl fmt::Debug for NativeObjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObjectBase")
            .field("object", &self.object)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Private-slot payload of a native object
pub(crate) struct Instance {
    state: Rc<Cell<NativeState>>,
    type_id: TypeId,
    class_name: &'static str,
    base: RefCell<NativeObjectBase>,
    data: RefCell<Option<Box<dyn NativeObject>>>,
}

impl Instance {
    pub fn new(
        object: Object,
        type_id: TypeId,
        class_name: &'static str,
        methods: MethodTable,
    ) -> Self {
        let state = Rc::new(Cell::new(NativeState::Uninitialized));
        Self {
            state: state.clone(),
            type_id,
            class_name,
            base: RefCell::new(NativeObjectBase {
                object,
                methods,
                state,
            }),
            data: RefCell::new(None),
        }
    }

    pub fn state(&self) -> NativeState {
        self.state.get()
    }

    pub fn set_state(&self, state: NativeState) {
        self.state.set(state);
    }

    pub fn base_mut(&self) -> Result<RefMut<'_, NativeObjectBase>> {
        self.base
            .try_borrow_mut()
            .map_err(|_| Error::binding_error("native instance is being constructed"))
    }

    pub fn install(&self, value: Box<dyn NativeObject>) {
        *self.data.borrow_mut() = Some(value);
        self.state.set(NativeState::Live);
    }

    fn check_live(&self) -> Result<()> {
        match self.state.get() {
            NativeState::Live => Ok(()),
            NativeState::Uninitialized | NativeState::Constructing => Err(
                Error::binding_error(format!("{} instance is not constructed yet", self.class_name)),
            ),
            NativeState::Finalizing | NativeState::Destroyed => Err(Error::binding_error(
                format!("{} instance has been finalized", self.class_name),
            )),
        }
    }

    /// Run the trace hook (mark phase)
    pub fn trace(&self, tracer: &mut Tracer) {
        if self.state.get() != NativeState::Live {
            return;
        }
        if let Ok(data) = self.data.try_borrow() {
            if let Some(data) = data.as_deref() {
                data.trace(tracer);
            }
        }
    }

    /// Drop the Rust value (sweep or context teardown)
    pub fn finalize(&self) {
        if matches!(
            self.state.get(),
            NativeState::Finalizing | NativeState::Destroyed
        ) {
            return;
        }
        self.state.set(NativeState::Finalizing);
        let data = match self.data.try_borrow_mut() {
            Ok(mut data) => data.take(),
            Err(_) => None,
        };
        drop(data);
        self.state.set(NativeState::Destroyed);
        debug!(class = self.class_name, "native instance finalized");
    }
}

/// Run the resolve hook of `holder`'s instance; a busy instance declines
pub(crate) fn run_resolve(
    holder: Object,
    instance: &Rc<Instance>,
    name: &str,
    flags: ResolveFlags,
) -> Result<bool> {
    if instance.state() != NativeState::Live {
        return Ok(false);
    }
    let ctx = Context::current_or_err()?;
    let _busy = ctx.busy_guard();
    let Ok(mut data) = instance.data.try_borrow_mut() else {
        return Ok(false);
    };
    match data.as_deref_mut() {
        Some(data) => data.property_resolve(holder, name, flags),
        None => Ok(false),
    }
}

/// Run the property-op hook of `object`'s instance; skipped while the instance is busy
pub(crate) fn run_property_op(
    object: Object,
    instance: &Rc<Instance>,
    mode: PropertyMode,
    name: &str,
    value: &mut Value,
) -> Result<()> {
    if instance.state() != NativeState::Live {
        return Ok(());
    }
    let ctx = Context::current_or_err()?;
    // Outlives the busy guard: a deferred collection runs when the guard
    // drops and must see the receiver and the value the hook produced
    let region = LocalRootRegion::in_context(&ctx);
    region.keep(object);
    let slot = region.slot(*value);
    let _busy = ctx.busy_guard();
    let Ok(mut data) = instance.data.try_borrow_mut() else {
        return Ok(());
    };
    let result = match data.as_deref_mut() {
        Some(data) => data.property_op(object, mode, name, value),
        None => Ok(()),
    };
    region.update(slot, *value);
    result
}

/// Names the instance of `object` can resolve lazily
pub(crate) fn run_enumerate(instance: &Rc<Instance>) -> Vec<String> {
    if instance.state() != NativeState::Live {
        return Vec::new();
    }
    match instance.data.try_borrow() {
        Ok(data) => data.as_deref().map(|d| d.enumerate()).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

fn instance_of(object: Object) -> Result<Rc<Instance>> {
    object
        .instance()?
        .ok_or_else(|| Error::binding_error("object is not native"))
}

/// Invoke `method` (or the table entry for `name`) on the receiver of `call`
///
/// Falls back to [`NativeObject::invalid_method`] when no callback exists.
pub(crate) fn dispatch(
    name: &str,
    method: Option<ErasedMethod>,
    call: &mut CallContext<'_>,
) -> Result<()> {
    let this = call.self_object()?;
    let instance = instance_of(this)?;
    instance.check_live()?;
    let method = match method {
        Some(method) => Some(method),
        None => instance
            .base
            .try_borrow()
            .map_err(|_| Error::binding_error("native instance is being constructed"))?
            .methods
            .lookup(name),
    };

    let ctx = Context::current_or_err()?;
    let _busy = ctx.busy_guard();
    let mut data = instance.data.try_borrow_mut().map_err(|_| {
        Error::binding_error(format!(
            "{} instance is already in use (re-entrant call to '{}')",
            instance.class_name, name
        ))
    })?;
    let data: &mut dyn NativeObject = data
        .as_deref_mut()
        .ok_or_else(|| Error::binding_error("object is not native"))?;

    trace!(class = instance.class_name, method = name, "native method dispatch");
    match method {
        Some(method) => method(data.as_any_mut(), call),
        None => data.invalid_method(name, call),
    }
}

/// Function object that dispatches `name` through the receiver's method table
pub(crate) fn method_trampoline(name: &str) -> Result<Object> {
    let method_name: Rc<str> = Rc::from(name);
    NativeFunctionBuilder::new(name)
        .variadic(0)
        .with_implementation(move |call| dispatch(&method_name, None, call))
        .build()
}

/// Function object bound to one callback (accessors)
pub(crate) fn bound_trampoline(name: &str, method: ErasedMethod) -> Result<Object> {
    let method_name: Rc<str> = Rc::from(name);
    NativeFunctionBuilder::new(name)
        .variadic(0)
        .with_implementation(move |call| dispatch(&method_name, Some(method.clone()), call))
        .build()
}

/// Typed handle to the native instance behind an object
///
/// Holding a `Native<T>` does not root the object; once the object is
/// collected the instance is finalized and borrows fail with a binding error.
pub struct Native<T: NativeObject> {
    object: Object,
    instance: Rc<Instance>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: NativeObject> Clone for Native<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object,
            instance: self.instance.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: NativeObject> Native<T> {
    pub(crate) fn new(object: Object, instance: Rc<Instance>) -> Self {
        Self {
            object,
            instance,
            _marker: PhantomData,
        }
    }

    /// The paired managed object
    pub fn object(&self) -> Object {
        self.object
    }

    pub fn state(&self) -> NativeState {
        self.instance.state()
    }

    /// Same native instance
    pub fn ptr_eq(a: &Native<T>, b: &Native<T>) -> bool {
        Rc::ptr_eq(&a.instance, &b.instance)
    }

    pub fn borrow(&self) -> Result<NativeRef<'_, T>> {
        self.instance.check_live()?;
        let ctx = Context::current_or_err()?;
        let busy = ctx.busy_guard();
        let data = self
            .instance
            .data
            .try_borrow()
            .map_err(|_| self.in_use())?;
        let guard = Ref::filter_map(data, |d| {
            d.as_deref().and_then(|d| d.as_any().downcast_ref::<T>())
        })
        .map_err(|_| Error::binding_error("object is not native"))?;
        Ok(NativeRef {
            guard,
            _busy: busy,
        })
    }

    pub fn borrow_mut(&self) -> Result<NativeRefMut<'_, T>> {
        self.instance.check_live()?;
        let ctx = Context::current_or_err()?;
        let busy = ctx.busy_guard();
        let data = self
            .instance
            .data
            .try_borrow_mut()
            .map_err(|_| self.in_use())?;
        let guard = RefMut::filter_map(data, |d| {
            d.as_deref_mut()
                .and_then(|d| d.as_any_mut().downcast_mut::<T>())
        })
        .map_err(|_| Error::binding_error("object is not native"))?;
        Ok(NativeRefMut {
            guard,
            _busy: busy,
        })
    }

    /// Call a method through the instance's dispatch table
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        let ctx = Context::current_or_err()?;
        let _depth = ctx.enter_call()?;
        let region = LocalRootRegion::in_context(&ctx);
        region.keep(self.object);
        for arg in args {
            region.keep(*arg);
        }
        let mut call = CallContext::new(
            Value::Object(self.object),
            args,
            Object::null(),
            &region,
            false,
        );
        dispatch(name, None, &mut call)?;
        Ok(call.result())
    }

    fn in_use(&self) -> Error {
        Error::binding_error(format!(
            "{} instance is already in use",
            self.instance.class_name
        ))
    }
}

impl<T: NativeObject> fmt::Debug for Native<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("class", &self.instance.class_name)
            .field("object", &self.object)
            .field("state", &self.instance.state())
            .finish()
    }
}

/// Shared borrow of a native instance; collection waits until it is released
pub struct NativeRef<'a, T> {
    guard: Ref<'a, T>,
    _busy: BusyGuard,
}

impl<T> Deref for NativeRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

/// Exclusive borrow of a native instance
pub struct NativeRefMut<'a, T> {
    guard: RefMut<'a, T>,
    _busy: BusyGuard,
}

impl<T> Deref for NativeRefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for NativeRefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Native instance of type `T` paired with `object`
pub fn get_native<T: NativeObject>(object: Object) -> Result<Native<T>> {
    let instance = instance_of(object)?;
    if instance.type_id != TypeId::of::<T>() {
        return Err(Error::type_error(format!(
            "object is a {}, not the requested native type",
            instance.class_name
        )));
    }
    instance.check_live()?;
    Ok(Native::new(object, instance))
}

/// Whether `object` is paired with a live instance of `T`
pub fn is_native<T: NativeObject>(object: Object) -> bool {
    matches!(object.instance(), Ok(Some(instance))
        if instance.type_id == TypeId::of::<T>() && instance.state() == NativeState::Live)
}
