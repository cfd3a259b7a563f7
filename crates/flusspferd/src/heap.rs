//! Managed heap
//!
//! A non-moving slot heap. Every handle is an `{index, generation}` pair and a
//! slot's generation is bumped when it is freed, so a handle that outlived its
//! object is detected as stale instead of silently aliasing a newer allocation.
//!
//! The heap owns the context's root stack (LIFO) and persistent root table.
//! It never runs native code; the collection driver in `context` does that
//! between heap borrows.

use crate::error::{Error, Result};
use crate::function::FunctionData;
use crate::native_object::Instance;
use crate::object::Object;
use crate::property::PropertyMap;
use crate::value::{JsString, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Handle to a heap slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcPtr {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Object variants the engine knows about
pub(crate) enum ObjectKind {
    Plain,
    Array(Vec<Value>),
    Function(FunctionData),
    Error,
}

pub(crate) struct ObjectData {
    pub kind: ObjectKind,
    pub prototype: Option<GcPtr>,
    pub parent: Option<GcPtr>,
    pub properties: PropertyMap,
    /// Native instance paired with this object
    pub private: Option<Rc<Instance>>,
}

impl ObjectData {
    pub fn new(kind: ObjectKind, prototype: Option<GcPtr>) -> Self {
        Self {
            kind,
            prototype,
            parent: None,
            properties: PropertyMap::default(),
            private: None,
        }
    }

    pub fn referenced(&self, out: &mut Vec<Value>) {
        out.extend(self.prototype.map(|p| Value::Object(Object::from_ptr(p))));
        out.extend(self.parent.map(|p| Value::Object(Object::from_ptr(p))));
        self.properties.referenced(out);
        if let ObjectKind::Array(elements) = &self.kind {
            out.extend(elements.iter().copied());
        }
    }
}

pub(crate) enum HeapCell {
    Object(ObjectData),
    String(Rc<str>),
}

struct Slot {
    generation: u32,
    marked: bool,
    cell: Option<HeapCell>,
}

/// Counters reported by [`crate::Context::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Completed collection cycles
    pub gc_runs: u64,
    /// Live objects (strings excluded)
    pub live_objects: usize,
    /// Live strings
    pub live_strings: usize,
    /// Native instances finalized so far
    pub finalized: u64,
}

#[derive(Default)]
pub(crate) struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    strings: HashMap<Rc<str>, GcPtr>,
    /// LIFO roots; `None` marks an entry released out of order
    root_stack: Vec<Option<Value>>,
    persistent: Vec<Option<Value>>,
    persistent_free: Vec<usize>,
    pub allocs_since_gc: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    // === Allocation ===

    fn alloc(&mut self, cell: HeapCell) -> GcPtr {
        self.allocs_since_gc += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.cell = Some(cell);
            slot.marked = false;
            return GcPtr {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            marked: false,
            cell: Some(cell),
        });
        GcPtr {
            index,
            generation: 0,
        }
    }

    pub fn alloc_object(&mut self, data: ObjectData) -> GcPtr {
        self.alloc(HeapCell::Object(data))
    }

    /// Interned string: equal contents share one slot while it is alive
    pub fn intern(&mut self, text: &str) -> GcPtr {
        if let Some(&ptr) = self.strings.get(text) {
            return ptr;
        }
        let text: Rc<str> = Rc::from(text);
        let ptr = self.alloc(HeapCell::String(text.clone()));
        self.strings.insert(text, ptr);
        ptr
    }

    // === Access ===

    fn cell(&self, ptr: GcPtr) -> Option<&HeapCell> {
        let slot = self.slots.get(ptr.index as usize)?;
        if slot.generation != ptr.generation {
            return None;
        }
        slot.cell.as_ref()
    }

    #[cfg(test)]
    pub fn is_live(&self, ptr: GcPtr) -> bool {
        self.cell(ptr).is_some()
    }

    pub fn object(&self, ptr: GcPtr) -> Result<&ObjectData> {
        match self.cell(ptr) {
            Some(HeapCell::Object(data)) => Ok(data),
            Some(HeapCell::String(_)) => Err(Error::type_error("handle is not an object")),
            None => Err(stale()),
        }
    }

    pub fn object_mut(&mut self, ptr: GcPtr) -> Result<&mut ObjectData> {
        let slot = self
            .slots
            .get_mut(ptr.index as usize)
            .filter(|slot| slot.generation == ptr.generation)
            .ok_or_else(stale)?;
        match slot.cell.as_mut() {
            Some(HeapCell::Object(data)) => Ok(data),
            Some(HeapCell::String(_)) => Err(Error::type_error("handle is not an object")),
            None => Err(stale()),
        }
    }

    pub fn string(&self, ptr: GcPtr) -> Result<Rc<str>> {
        match self.cell(ptr) {
            Some(HeapCell::String(text)) => Ok(text.clone()),
            Some(HeapCell::Object(_)) => Err(Error::type_error("handle is not a string")),
            None => Err(stale()),
        }
    }

    // === Root stack ===

    pub fn push_root(&mut self, value: Value) -> usize {
        self.root_stack.push(Some(value));
        self.root_stack.len() - 1
    }

    pub fn set_root(&mut self, index: usize, value: Value) {
        if let Some(entry) = self.root_stack.get_mut(index) {
            *entry = Some(value);
        }
    }

    pub fn root(&self, index: usize) -> Option<Value> {
        self.root_stack.get(index).copied().flatten()
    }

    pub fn root_height(&self) -> usize {
        self.root_stack.len()
    }

    /// Release the root at `index`; returns `false` when the release was not LIFO
    pub fn release_root(&mut self, index: usize) -> bool {
        let len = self.root_stack.len();
        if index >= len {
            // Already released by an enclosing region
            return false;
        }
        if index + 1 == len {
            self.root_stack.pop();
            while matches!(self.root_stack.last(), Some(None)) {
                self.root_stack.pop();
            }
            true
        } else {
            self.root_stack[index] = None;
            false
        }
    }

    pub fn truncate_roots(&mut self, height: usize) {
        self.root_stack.truncate(height);
    }

    // === Persistent roots ===

    pub fn add_persistent(&mut self, value: Value) -> usize {
        match self.persistent_free.pop() {
            Some(index) => {
                self.persistent[index] = Some(value);
                index
            }
            None => {
                self.persistent.push(Some(value));
                self.persistent.len() - 1
            }
        }
    }

    pub fn set_persistent(&mut self, index: usize, value: Value) {
        if let Some(entry) = self.persistent.get_mut(index) {
            *entry = Some(value);
        }
    }

    pub fn remove_persistent(&mut self, index: usize) {
        if let Some(entry) = self.persistent.get_mut(index) {
            if entry.take().is_some() {
                self.persistent_free.push(index);
            }
        }
    }

    #[cfg(test)]
    pub fn persistent_count(&self) -> usize {
        self.persistent.len() - self.persistent_free.len()
    }

    // === Collection ===

    /// Values on the root stack and in the persistent table
    pub fn roots(&self, out: &mut Vec<Value>) {
        out.extend(self.root_stack.iter().flatten().copied());
        out.extend(self.persistent.iter().flatten().copied());
    }

    /// Mark the cell behind `value` and queue its children
    ///
    /// Returns the paired native instance of a newly marked object so the
    /// caller can run its trace hook once the heap borrow is released.
    pub fn mark(&mut self, value: Value, worklist: &mut Vec<Value>) -> Option<Rc<Instance>> {
        let ptr = value.gc_ptr()?;
        let slot = self.slots.get_mut(ptr.index as usize)?;
        if slot.generation != ptr.generation || slot.marked || slot.cell.is_none() {
            return None;
        }
        slot.marked = true;
        match slot.cell.as_ref() {
            Some(HeapCell::Object(data)) => {
                data.referenced(worklist);
                data.private.clone()
            }
            _ => None,
        }
    }

    /// Free every unmarked slot, returning the native instances that lost their object
    pub fn sweep(&mut self) -> Vec<Rc<Instance>> {
        let mut orphans = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.marked || slot.cell.is_none() {
                slot.marked = false;
                continue;
            }
            match slot.cell.take() {
                Some(HeapCell::Object(data)) => orphans.extend(data.private),
                Some(HeapCell::String(text)) => {
                    self.strings.remove(&text);
                }
                None => {}
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
        self.allocs_since_gc = 0;
        orphans
    }

    /// Detach every native instance (context teardown)
    pub fn drain_instances(&mut self) -> Vec<Rc<Instance>> {
        let mut instances = Vec::new();
        for slot in &mut self.slots {
            if let Some(HeapCell::Object(data)) = slot.cell.as_mut() {
                instances.extend(data.private.take());
            }
        }
        instances
    }

    pub fn live_counts(&self) -> (usize, usize) {
        let mut objects = 0;
        let mut strings = 0;
        for slot in &self.slots {
            match slot.cell {
                Some(HeapCell::Object(_)) => objects += 1,
                Some(HeapCell::String(_)) => strings += 1,
                None => {}
            }
        }
        (objects, strings)
    }
}

fn stale() -> Error {
    Error::binding_error("stale handle: the value was collected")
}

impl Value {
    pub(crate) fn gc_ptr(&self) -> Option<GcPtr> {
        match self {
            Value::String(JsString { ptr }) => Some(*ptr),
            Value::Object(object) => object.ptr(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(heap: &mut Heap) -> GcPtr {
        heap.alloc_object(ObjectData::new(ObjectKind::Plain, None))
    }

    fn obj(ptr: GcPtr) -> Value {
        Value::Object(Object::from_ptr(ptr))
    }

    fn collect(heap: &mut Heap) -> Vec<Rc<Instance>> {
        let mut worklist = Vec::new();
        heap.roots(&mut worklist);
        while let Some(v) = worklist.pop() {
            heap.mark(v, &mut worklist);
        }
        heap.sweep()
    }

    #[test]
    fn test_interned_strings_share_slot() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        let c = heap.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*heap.string(a).unwrap(), "hello");
    }

    #[test]
    fn test_unrooted_object_swept_and_handle_goes_stale() {
        let mut heap = Heap::new();
        let kept = plain(&mut heap);
        let dropped = plain(&mut heap);
        heap.push_root(obj(kept));

        collect(&mut heap);

        assert!(heap.is_live(kept));
        assert!(!heap.is_live(dropped));
        let err = heap.object(dropped).err().unwrap();
        assert!(err.to_string().contains("stale handle"));
    }

    #[test]
    fn test_reused_slot_has_new_generation() {
        let mut heap = Heap::new();
        let first = plain(&mut heap);
        collect(&mut heap);
        let second = plain(&mut heap);
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert!(heap.object(first).is_err());
        assert!(heap.object(second).is_ok());
    }

    #[test]
    fn test_marking_follows_properties_and_prototype() {
        let mut heap = Heap::new();
        let proto = plain(&mut heap);
        let child = heap.alloc_object(ObjectData::new(ObjectKind::Plain, Some(proto)));
        let name = heap.intern("payload");
        let value = plain(&mut heap);
        heap.object_mut(child).unwrap().properties.insert(
            "field",
            crate::property::PropertySlot {
                value: crate::property::PropertyValue::Data(obj(value)),
                attributes: Default::default(),
            },
        );
        heap.push_root(obj(child));

        collect(&mut heap);

        assert!(heap.is_live(proto));
        assert!(heap.is_live(value));
        assert!(!heap.is_live(name));
    }

    #[test]
    fn test_out_of_order_release_tombstones() {
        let mut heap = Heap::new();
        let a = heap.push_root(Value::Int(1));
        let b = heap.push_root(Value::Int(2));
        assert!(!heap.release_root(a));
        assert_eq!(heap.root_height(), 2);
        assert!(heap.release_root(b));
        assert_eq!(heap.root_height(), 0);
    }

    #[test]
    fn test_persistent_slots_are_reused() {
        let mut heap = Heap::new();
        let a = heap.add_persistent(Value::Null);
        heap.remove_persistent(a);
        let b = heap.add_persistent(Value::Bool(true));
        assert_eq!(a, b);
        assert_eq!(heap.persistent_count(), 1);
    }
}
