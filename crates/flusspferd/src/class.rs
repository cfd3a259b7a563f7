//! Class registry and instance builder
//!
//! A native type becomes a script class by implementing [`NativeClass`]. The
//! first use of the type in a context builds its prototype (methods and
//! accessors from the [`ClassDescription`], then [`NativeClass::build_prototype`])
//! and its constructor, and caches the pair in the context's registry. Later
//! uses, including a second `load_class` on another container, reuse the pair.

use crate::call_context::CallContext;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::function::NativeFunctionBuilder;
use crate::native_object::{
    bound_trampoline, erase_method, method_trampoline, ErasedMethod, Instance, MethodTable,
    Native, NativeObject, NativeObjectBase, NativeState,
};
use crate::object::Object;
use crate::params::{FromParams, NamedParams};
use crate::property::PropertyAttributes;
use crate::root::LocalRootRegion;
use crate::value::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Fixed per-type description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassInfo {
    /// Constructor name (must not be empty)
    pub name: &'static str,
    /// Declared constructor arity (the constructor's `length`)
    pub arity: u32,
    /// `false`: the constructor exists but script cannot invoke it
    pub constructible: bool,
}

impl ClassInfo {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            arity: 0,
            constructible: true,
        }
    }

    pub const fn arity(mut self, arity: u32) -> Self {
        self.arity = arity;
        self
    }

    pub const fn constructible(mut self, constructible: bool) -> Self {
        self.constructible = constructible;
        self
    }
}

type Getter<T> = Rc<dyn Fn(&T) -> Result<Value>>;
type Setter<T> = Rc<dyn Fn(&mut T, Value) -> Result<()>>;

struct AccessorEntry<T> {
    name: &'static str,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
}

/// Method and property table installed on a class prototype
pub struct ClassDescription<T> {
    methods: Vec<(&'static str, ErasedMethod)>,
    accessors: Vec<AccessorEntry<T>>,
    constants: Vec<(&'static str, f64)>,
}

impl<T> Default for ClassDescription<T> {
    fn default() -> Self {
        Self {
            methods: Vec::new(),
            accessors: Vec::new(),
            constants: Vec::new(),
        }
    }
}

impl<T: NativeObject> ClassDescription<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prototype method dispatched through each instance's method table
    pub fn method<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(&mut T, &mut CallContext<'_>) -> Result<()> + 'static,
    {
        self.methods.push((name, erase_method(f)));
        self
    }

    /// Read-only accessor property on the prototype
    pub fn property<G>(mut self, name: &'static str, getter: G) -> Self
    where
        G: Fn(&T) -> Result<Value> + 'static,
    {
        self.accessors.push(AccessorEntry {
            name,
            getter: Rc::new(getter),
            setter: None,
        });
        self
    }

    /// Read-write accessor property on the prototype
    pub fn property_rw<G, S>(mut self, name: &'static str, getter: G, setter: S) -> Self
    where
        G: Fn(&T) -> Result<Value> + 'static,
        S: Fn(&mut T, Value) -> Result<()> + 'static,
    {
        self.accessors.push(AccessorEntry {
            name,
            getter: Rc::new(getter),
            setter: Some(Rc::new(setter)),
        });
        self
    }

    /// Numeric constant on the constructor
    pub fn constant(mut self, name: &'static str, value: f64) -> Self {
        self.constants.push((name, value));
        self
    }
}

/// A native type exposed to script as a class
pub trait NativeClass: NativeObject + Sized {
    /// Constructor options
    type Params: FromParams;

    fn class_info() -> ClassInfo;

    fn class_description() -> ClassDescription<Self> {
        ClassDescription::new()
    }

    /// Extra prototype setup after the description is installed
    fn build_prototype(_prototype: &Object) -> Result<()> {
        Ok(())
    }

    /// Static members on the constructor
    fn augment_constructor(_constructor: &Object) -> Result<()> {
        Ok(())
    }

    /// Native constructor; `base` is bound to the new managed object
    fn construct(base: &mut NativeObjectBase, params: Self::Params) -> Result<Self>;
}

#[derive(Clone)]
pub(crate) struct ClassEntry {
    pub name: &'static str,
    pub constructor: Object,
    pub prototype: Object,
    pub methods: Rc<HashMap<String, ErasedMethod>>,
}

/// Per-context cache of constructor/prototype pairs keyed by native type
#[derive(Default)]
pub(crate) struct ClassRegistry {
    entries: HashMap<TypeId, ClassEntry>,
}

impl ClassRegistry {
    pub fn get(&self, type_id: TypeId) -> Option<ClassEntry> {
        self.entries.get(&type_id).cloned()
    }

    pub fn insert(&mut self, type_id: TypeId, entry: ClassEntry) {
        self.entries.insert(type_id, entry);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn roots(&self, out: &mut Vec<Value>) {
        for entry in self.entries.values() {
            out.push(Value::Object(entry.constructor));
            out.push(Value::Object(entry.prototype));
        }
    }
}

/// Register `T` in the current context (if needed) and define its constructor on `container`
///
/// Returns the constructor. A container that already has a property of the
/// class name keeps it.
pub fn load_class<T: NativeClass>(container: Object) -> Result<Object> {
    let ctx = Context::current_or_err()?;
    let entry = ensure_class::<T>(&ctx)?;
    if !container.has_own_property(entry.name)? {
        container.define_property(entry.name, entry.constructor, PropertyAttributes::HIDDEN)?;
    }
    Ok(entry.constructor)
}

/// The prototype of `T` in the current context, registering the class if needed
pub fn class_prototype<T: NativeClass>() -> Result<Object> {
    let ctx = Context::current_or_err()?;
    Ok(ensure_class::<T>(&ctx)?.prototype)
}

/// Create an instance of `T` from native code
///
/// The class is loaded onto the global object on first use. The returned
/// handle does not root the new object.
pub fn create<T: NativeClass>(params: T::Params) -> Result<Native<T>> {
    let ctx = Context::current_or_err()?;
    load_class::<T>(ctx.global())?;
    let entry = ensure_class::<T>(&ctx)?;
    let region = LocalRootRegion::in_context(&ctx);
    let object = region.keep(Object::create_with_prototype(entry.prototype)?);
    let instance = attach::<T>(object, &entry, params)?;
    Ok(Native::new(object, instance))
}

/// Create an instance of `T` binding script-style arguments (positional or options object)
pub fn create_with_args<T: NativeClass>(args: &[Value]) -> Result<Native<T>> {
    let bound = T::Params::param_spec().bind(args)?;
    create::<T>(T::Params::from_params(&bound)?)
}

/// Create an instance of `T` with parameters given by name
pub fn create_named<T: NativeClass>(params: &NamedParams) -> Result<Native<T>> {
    let bound = T::Params::param_spec().bind_named(params)?;
    create::<T>(T::Params::from_params(&bound)?)
}

fn ensure_class<T: NativeClass>(ctx: &Context) -> Result<ClassEntry> {
    let type_id = TypeId::of::<T>();
    if let Some(entry) = ctx.registry().get(type_id) {
        return Ok(entry);
    }

    let info = T::class_info();
    assert!(!info.name.is_empty(), "native class name must not be empty");
    let description = T::class_description();
    let region = LocalRootRegion::in_context(ctx);

    let prototype = region.keep(Object::create()?);
    let mut methods = HashMap::new();
    for (name, method) in description.methods {
        let trampoline = method_trampoline(name)?;
        prototype.define_property(name, trampoline, PropertyAttributes::HIDDEN)?;
        methods.insert(name.to_string(), method);
    }
    for accessor in description.accessors {
        let getter = accessor.getter.clone();
        let get = erase_method::<T, _>(move |target, call| {
            let value = getter(&*target)?;
            call.set_result(value);
            Ok(())
        });
        let getter_fn = region.keep(bound_trampoline(accessor.name, get)?);
        let setter_fn = match accessor.setter {
            Some(setter) => {
                let set = erase_method::<T, _>(move |target, call| setter(target, call.arg(0)));
                Some(region.keep(bound_trampoline(accessor.name, set)?))
            }
            None => None,
        };
        prototype.define_accessor(
            accessor.name,
            Some(getter_fn),
            setter_fn,
            PropertyAttributes::HIDDEN,
        )?;
    }
    T::build_prototype(&prototype)?;
    install_defaults(prototype, info.name)?;

    let constructor = region.keep(class_constructor::<T>(info)?);
    constructor.define_property("prototype", prototype, PropertyAttributes::PERMANENT)?;
    prototype.define_property("constructor", constructor, PropertyAttributes::HIDDEN)?;
    for (name, value) in description.constants {
        constructor.define_property(name, Value::number(value), PropertyAttributes::PERMANENT)?;
    }
    T::augment_constructor(&constructor)?;

    let entry = ClassEntry {
        name: info.name,
        constructor,
        prototype,
        methods: Rc::new(methods),
    };
    ctx.registry_mut().insert(type_id, entry.clone());
    debug!(
        context = ctx.id(),
        class = info.name,
        constructible = info.constructible,
        "class registered"
    );
    Ok(entry)
}

fn install_defaults(prototype: Object, name: &'static str) -> Result<()> {
    if !prototype.has_own_property("toString")? {
        NativeFunctionBuilder::new("toString")
            .with_arity(0)
            .with_implementation(move |call| {
                call.set_result(Value::string(&format!("[object {}]", name))?);
                Ok(())
            })
            .install(prototype)?;
    }
    if !prototype.has_own_property("toSource")? {
        NativeFunctionBuilder::new("toSource")
            .with_arity(0)
            .with_implementation(move |call| {
                call.set_result(Value::string(&format!("(new {}())", name))?);
                Ok(())
            })
            .install(prototype)?;
    }
    Ok(())
}

fn class_constructor<T: NativeClass>(info: ClassInfo) -> Result<Object> {
    let name = info.name;
    NativeFunctionBuilder::new(name)
        .variadic(info.arity)
        .constructible(true)
        .with_implementation(move |call| {
            if !info.constructible {
                return Err(Error::binding_error(format!("{} is not constructible", name)));
            }
            if !call.is_construct_call() {
                return Err(Error::type_error(format!(
                    "{} constructor must be called with new",
                    name
                )));
            }
            let ctx = Context::current_or_err()?;
            let entry = ensure_class::<T>(&ctx)?;
            let bound = T::Params::param_spec().bind(call.arguments().as_slice())?;
            let params = T::Params::from_params(&bound)?;
            let this = call.self_object()?;
            attach::<T>(this, &entry, params)?;
            Ok(())
        })
        .build()
}

/// Pair `object` with a new native instance of `T`
fn attach<T: NativeClass>(
    object: Object,
    entry: &ClassEntry,
    params: T::Params,
) -> Result<Rc<Instance>> {
    let ctx = Context::current_or_err()?;
    let instance = Rc::new(Instance::new(
        object,
        TypeId::of::<T>(),
        entry.name,
        MethodTable::with_shared(entry.methods.clone()),
    ));
    {
        let mut heap = ctx.heap_mut();
        let data = heap.object_mut(object.require()?)?;
        if data.private.is_some() {
            return Err(Error::binding_error("object is already native"));
        }
        data.private = Some(instance.clone());
    }
    instance.set_state(NativeState::Constructing);

    let constructed = {
        let mut base = instance.base_mut()?;
        T::construct(&mut base, params)
    };
    match constructed {
        Ok(value) => {
            instance.install(Box::new(value));
            Ok(instance)
        }
        Err(err) => {
            if let Ok(data) = ctx.heap_mut().object_mut(object.require()?) {
                data.private = None;
            }
            instance.set_state(NativeState::Destroyed);
            debug!(class = entry.name, error = %err, "native construction failed");
            Err(err)
        }
    }
}
