//! Mark-phase adapter handed to native objects
//!
//! During a collection the engine calls [`crate::NativeObject::trace`] on every
//! reachable native instance. The hook reports each value it holds outside the
//! managed object graph (in Rust collections, caches, cross-references); any
//! value it forgets is collectable while still in use.
//!
//! ```no_run
//! use flusspferd::{NativeObject, Tracer, Value};
//!
//! struct Cache {
//!     entries: Vec<Value>,
//! }
//!
//! impl NativeObject for Cache {
//!     fn trace(&self, tracer: &mut Tracer) {
//!         for entry in &self.entries {
//!             tracer.trace("cache entry", *entry);
//!         }
//!     }
//! }
//! ```

use crate::value::Value;
use tracing::trace;

/// Collects the values reported by trace hooks during one mark pass
#[derive(Debug, Default)]
pub struct Tracer {
    pending: Vec<Value>,
    traced: usize,
}

impl Tracer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare that the caller holds `value`
    ///
    /// `name` only labels the edge in trace-level logs.
    pub fn trace(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if value.gc_ptr().is_none() {
            return;
        }
        trace!(edge = name, "traced native reference");
        self.traced += 1;
        self.pending.push(value);
    }

    /// Number of handles reported during this pass
    pub fn traced(&self) -> usize {
        self.traced
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Value> {
        self.pending.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    #[test]
    fn test_primitives_are_ignored() {
        let mut tracer = Tracer::new();
        tracer.trace("number", Value::Int(3));
        tracer.trace("null object", Object::null());
        assert_eq!(tracer.traced(), 0);
        assert_eq!(tracer.drain().count(), 0);
    }
}
