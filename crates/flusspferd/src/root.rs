//! Rooting
//!
//! Values held only in native locals are invisible to the collector. A
//! [`Root`] registers one value on the context's root stack for its lifetime;
//! a [`LocalRootRegion`] releases everything registered inside it when it is
//! dropped, including on early return through `?`. Both follow strict LIFO
//! order. [`PersistentRoot`] is the non-scoped form for values kept in
//! long-lived native state.
//!
//! ```no_run
//! # fn main() -> flusspferd::Result<()> {
//! use flusspferd::{Object, Root};
//!
//! let first = Root::new(Object::create()?)?;
//! // `first` survives this allocation even if it triggers a collection
//! let second = Object::create()?;
//! second.set_property("sibling", *first)?;
//! # Ok(())
//! # }
//! ```

use crate::context::{Context, ContextInner};
use crate::error::Result;
use crate::object::Object;
use crate::value::{JsString, Value};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::rc::{Rc, Weak};
use tracing::warn;

/// Handle kinds that can be rooted
pub trait Rootable: Copy {
    fn as_value(&self) -> Value;
}

impl Rootable for Value {
    fn as_value(&self) -> Value {
        *self
    }
}

impl Rootable for Object {
    fn as_value(&self) -> Value {
        Value::from(*self)
    }
}

impl Rootable for JsString {
    fn as_value(&self) -> Value {
        Value::String(*self)
    }
}

/// Scoped root for one value (LIFO)
pub struct Root<T: Rootable> {
    ctx: Context,
    index: usize,
    value: T,
    _not_send: PhantomData<*const ()>,
}

impl<T: Rootable> Root<T> {
    /// Root `value` in the current context
    pub fn new(value: T) -> Result<Self> {
        let ctx = Context::current_or_err()?;
        let index = ctx.heap_mut().push_root(value.as_value());
        Ok(Self {
            ctx,
            index,
            value,
            _not_send: PhantomData,
        })
    }

    pub fn get(&self) -> T {
        self.value
    }

    /// Replace the protected value
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.ctx.heap_mut().set_root(self.index, value.as_value());
    }
}

impl<T: Rootable> Deref for Root<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Rootable + fmt::Debug> fmt::Debug for Root<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Root").field(&self.value).finish()
    }
}

impl<T: Rootable> Drop for Root<T> {
    fn drop(&mut self) {
        let in_order = self.ctx.heap_mut().release_root(self.index);
        if !in_order {
            warn!(index = self.index, "root released out of order");
            debug_assert!(in_order, "roots must be released in reverse order");
        }
    }
}

/// Nested protection scope
///
/// Records the root-stack height on creation and truncates back to it on drop.
pub struct LocalRootRegion {
    ctx: Context,
    height: usize,
    _not_send: PhantomData<*const ()>,
}

impl LocalRootRegion {
    pub fn new() -> Result<Self> {
        let ctx = Context::current_or_err()?;
        Ok(Self::in_context(&ctx))
    }

    pub(crate) fn in_context(ctx: &Context) -> Self {
        let height = ctx.heap().root_height();
        Self {
            ctx: ctx.clone(),
            height,
            _not_send: PhantomData,
        }
    }

    /// Protect `value` until the region ends; returns it for chaining
    ///
    /// Regions share one LIFO root stack. Called while a nested region is
    /// open, the entry sits above the nested region's height and is released
    /// when the nested region drops, not when this one does.
    pub fn keep<T: Rootable>(&self, value: T) -> T {
        self.ctx.heap_mut().push_root(value.as_value());
        value
    }

    /// Reserve a slot that can be updated with [`LocalRootRegion::update`]
    pub(crate) fn slot(&self, value: Value) -> usize {
        self.ctx.heap_mut().push_root(value)
    }

    pub(crate) fn update(&self, slot: usize, value: Value) {
        self.ctx.heap_mut().set_root(slot, value);
    }

    /// Number of values protected by this region
    pub fn len(&self) -> usize {
        self.ctx.heap().root_height().saturating_sub(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for LocalRootRegion {
    fn drop(&mut self) {
        let mut heap = self.ctx.heap_mut();
        debug_assert!(
            heap.root_height() >= self.height,
            "root region closed after an enclosing region"
        );
        heap.truncate_roots(self.height);
    }
}

/// Root that is not bound to a stack scope
///
/// Clones share one root entry; the entry is released when the last clone
/// drops. Created without a current context it protects nothing (there is no
/// collector to protect against).
#[derive(Clone)]
pub struct PersistentRoot {
    slot: Rc<PersistentSlot>,
}

struct PersistentSlot {
    ctx: Weak<ContextInner>,
    index: Option<usize>,
    value: std::cell::Cell<Value>,
}

impl PersistentRoot {
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        let (ctx, index) = match Context::current() {
            Some(ctx) => {
                let index = ctx.heap_mut().add_persistent(value);
                (ctx.weak(), Some(index))
            }
            None => (Weak::new(), None),
        };
        Self {
            slot: Rc::new(PersistentSlot {
                ctx,
                index,
                value: std::cell::Cell::new(value),
            }),
        }
    }

    pub fn get(&self) -> Value {
        self.slot.value.get()
    }

    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        self.slot.value.set(value);
        if let (Some(inner), Some(index)) = (self.slot.ctx.upgrade(), self.slot.index) {
            Context::from_inner(inner).heap_mut().set_persistent(index, value);
        }
    }
}

impl fmt::Debug for PersistentRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PersistentRoot").field(&self.get()).finish()
    }
}

impl Drop for PersistentSlot {
    fn drop(&mut self) {
        if let (Some(inner), Some(index)) = (self.ctx.upgrade(), self.index) {
            if let Some(mut heap) = inner.try_heap_mut() {
                heap.remove_persistent(index);
            }
        }
    }
}
