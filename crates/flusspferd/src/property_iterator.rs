//! Snapshot iteration over enumerable own properties
//!
//! Creating a [`PropertyIterator`] first flushes lazily resolvable properties:
//! a native object's [`crate::NativeObject::enumerate`] names are resolved
//! (and therefore defined) one by one. The enumerable own keys are then
//! snapshotted. Iteration yields keys from that snapshot only; a key deleted
//! after the snapshot is skipped and a key added after it is never yielded,
//! so resolution during iteration cannot reorder or duplicate keys.

use crate::error::Result;
use crate::native_object::{self, ResolveFlags};
use crate::object::Object;
use crate::root::PersistentRoot;
use std::collections::VecDeque;

/// Iterator over property names of one object
pub struct PropertyIterator {
    object: Object,
    _root: PersistentRoot,
    keys: VecDeque<String>,
}

impl PropertyIterator {
    pub fn new(object: Object) -> Result<Self> {
        let root = PersistentRoot::new(object);
        if let Some(instance) = object.instance()? {
            for name in native_object::run_enumerate(&instance) {
                if !object.has_own_property(&name)? {
                    native_object::run_resolve(object, &instance, &name, ResolveFlags::NONE)?;
                }
            }
        }
        let keys = object.property_names()?.into();
        Ok(Self {
            object,
            _root: root,
            keys,
        })
    }

    /// Keys left to visit (some may be skipped if deleted meanwhile)
    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

impl Iterator for PropertyIterator {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(key) = self.keys.pop_front() {
            match self.object.has_own_property(&key) {
                Ok(true) => return Some(Ok(key)),
                Ok(false) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{current_context_scope, Context};

    #[test]
    fn test_snapshot_semantics() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let object = Object::create().unwrap();
        let _root = crate::Root::new(object).unwrap();
        for name in ["a", "b", "c"] {
            object.set_property(name, 1).unwrap();
        }

        let mut iter = PropertyIterator::new(object).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), "a");
        object.delete_property("b").unwrap();
        object.set_property("d", 1).unwrap();
        let rest: Vec<String> = iter.map(|k| k.unwrap()).collect();
        assert_eq!(rest, vec!["c"]);
    }
}
