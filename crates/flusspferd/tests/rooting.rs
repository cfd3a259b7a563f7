//! Rooting discipline across collections
//!
//! Values reachable only from native frames survive exactly as long as a
//! root protects them; regions release in LIFO order.

mod common;

use common::*;
use flusspferd::{
    create, current_context_scope, gc, ClassInfo, Context, ContextOptions, ErrorKind,
    LocalRootRegion, NativeClass, NativeObject, NativeObjectBase, Object, PersistentRoot,
    PropertyMode, Result, Root, Tracer, Value,
};
use pretty_assertions::{assert_eq, assert_ne};
use proptest::prelude::*;

#[test]
fn test_identity_round_trip_through_value() {
    let (_ctx, _scope) = setup();
    let object = Object::create().unwrap();
    let _root = Root::new(object).unwrap();

    let value = Value::from(object);
    let back = value.get_object().unwrap();
    assert_eq!(back, object);
    assert!(value.strict_equals(&Value::Object(object)));

    let other = Object::create().unwrap();
    assert_ne!(other, object);
}

#[test]
fn test_rooted_object_survives_collection() {
    let (ctx, _scope) = setup_manual_gc();
    let object = Object::create().unwrap();
    let root = Root::new(object).unwrap();
    object.set_property("answer", 42).unwrap();

    for _ in 0..3 {
        ctx.gc();
    }

    assert!(root.get().is_alive());
    assert_eq!(root.get_property("answer").unwrap(), Value::Int(42));
}

#[test]
fn test_unrooted_object_is_collected() {
    let (ctx, _scope) = setup_manual_gc();
    let object = Object::create().unwrap();
    ctx.gc();

    assert!(!object.is_alive());
    let err = object.get_property("anything").unwrap_err();
    assert!(err.is(ErrorKind::Binding));
    assert!(err.message().contains("stale handle"));
}

#[test]
fn test_reachable_through_rooted_graph() {
    let (ctx, _scope) = setup_manual_gc();
    let outer = Object::create().unwrap();
    let _root = Root::new(outer).unwrap();
    let inner = Object::create().unwrap();
    outer.set_property("child", inner).unwrap();

    ctx.gc();
    assert!(inner.is_alive());

    outer.delete_property("child").unwrap();
    ctx.gc();
    assert!(!inner.is_alive());
}

#[test]
fn test_persistent_root_outlives_stack_regions() {
    let (ctx, _scope) = setup_manual_gc();
    let persistent = {
        let region = LocalRootRegion::new().unwrap();
        let object = region.keep(Object::create().unwrap());
        PersistentRoot::new(object)
    };
    ctx.gc();

    let object = persistent.get().get_object().unwrap();
    assert!(object.is_alive());

    let clone = persistent.clone();
    drop(persistent);
    ctx.gc();
    assert!(object.is_alive(), "a clone keeps the entry");

    drop(clone);
    ctx.gc();
    assert!(!object.is_alive());
}

#[test]
fn test_keep_lands_in_innermost_open_region() {
    let (ctx, _scope) = setup_manual_gc();
    let outer = LocalRootRegion::new().unwrap();
    let object = {
        let _inner = LocalRootRegion::new().unwrap();
        outer.keep(Object::create().unwrap())
    };
    assert!(outer.is_empty());
    ctx.gc();
    assert!(!object.is_alive());
}

// ============================================================================
// Values held by native instances
// ============================================================================

/// Holds an object outside the managed graph, optionally reporting it
#[derive(Debug, Default)]
struct Holder {
    hidden: Option<Object>,
    traced: bool,
}

impl NativeObject for Holder {
    fn trace(&self, tracer: &mut Tracer) {
        if let (true, Some(hidden)) = (self.traced, self.hidden) {
            tracer.trace("hidden", hidden);
        }
    }
}

impl NativeClass for Holder {
    type Params = ();

    fn class_info() -> ClassInfo {
        ClassInfo::new("Holder")
    }

    fn construct(_base: &mut NativeObjectBase, _params: ()) -> Result<Self> {
        Ok(Holder::default())
    }
}

fn hold(traced: bool) -> (Root<Object>, Object) {
    let holder = create::<Holder>(()).unwrap();
    let root = Root::new(holder.object()).unwrap();
    let hidden = Object::create().unwrap();
    {
        let mut data = holder.borrow_mut().unwrap();
        data.hidden = Some(hidden);
        data.traced = traced;
    }
    (root, hidden)
}

#[test]
fn test_traced_hidden_reference_survives() {
    let (ctx, _scope) = setup_manual_gc();
    let (_holder, hidden) = hold(true);
    ctx.gc();
    ctx.gc();
    assert!(hidden.is_alive());
}

#[test]
fn test_untraced_hidden_reference_is_collected() {
    let (ctx, _scope) = setup_manual_gc();
    let (_holder, hidden) = hold(false);
    ctx.gc();
    assert!(!hidden.is_alive());
}

/// Replaces the value of `fresh` reads and of new properties with new objects
#[derive(Debug, Default)]
struct Rewriter;

impl NativeObject for Rewriter {
    fn property_op(
        &mut self,
        _this: Object,
        mode: PropertyMode,
        name: &str,
        value: &mut Value,
    ) -> Result<()> {
        match (mode, name) {
            (PropertyMode::Get, "fresh") | (PropertyMode::Add, _) => {
                *value = Value::from(Object::create()?);
            }
            _ => {}
        }
        Ok(())
    }
}

impl NativeClass for Rewriter {
    type Params = ();

    fn class_info() -> ClassInfo {
        ClassInfo::new("Rewriter")
    }

    fn construct(_base: &mut NativeObjectBase, _params: ()) -> Result<Self> {
        Ok(Rewriter)
    }
}

/// Context that collects on every allocation
fn setup_eager_gc() -> (Context, flusspferd::CurrentContextScope) {
    let ctx = Context::with_options(ContextOptions::default().with_gc_threshold(1))
        .expect("context");
    let scope = current_context_scope(&ctx);
    (ctx, scope)
}

#[test]
fn test_property_op_result_survives_deferred_collection() {
    let (ctx, _scope) = setup_eager_gc();
    let rewriter = create::<Rewriter>(()).unwrap();
    let _root = Root::new(rewriter.object()).unwrap();
    let before = ctx.stats().gc_runs;

    let fresh = rewriter
        .object()
        .get_property("fresh")
        .unwrap()
        .get_object()
        .unwrap();

    assert!(ctx.stats().gc_runs > before, "the collection ran after the hook");
    assert!(fresh.is_alive());
}

#[test]
fn test_property_op_stored_value_survives_deferred_collection() {
    let (ctx, _scope) = setup_eager_gc();
    let rewriter = create::<Rewriter>(()).unwrap();
    let _root = Root::new(rewriter.object()).unwrap();

    rewriter.object().set_property("stored", 0).unwrap();
    ctx.gc();

    let stored = rewriter
        .object()
        .get_property("stored")
        .unwrap()
        .get_object()
        .unwrap();
    assert!(stored.is_alive());
}

#[test]
fn test_gc_without_context_is_noop() {
    gc();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Nested regions: after the inner region closes, exactly the outer
    /// region's values remain protected and survive a collection.
    #[test]
    fn prop_regions_release_lifo(outer_count in 0usize..8, inner_count in 0usize..8) {
        let (ctx, _scope) = setup_manual_gc();
        let outer = LocalRootRegion::new().unwrap();
        let kept: Vec<Object> = (0..outer_count)
            .map(|_| outer.keep(Object::create().unwrap()))
            .collect();

        let dropped: Vec<Object> = {
            let inner = LocalRootRegion::new().unwrap();
            let objects: Vec<Object> = (0..inner_count)
                .map(|_| inner.keep(Object::create().unwrap()))
                .collect();
            prop_assert_eq!(inner.len(), inner_count);
            prop_assert_eq!(outer.len(), outer_count + inner_count);
            objects
        };

        prop_assert_eq!(outer.len(), outer_count);
        ctx.gc();
        prop_assert!(kept.iter().all(|o| o.is_alive()));
        prop_assert!(dropped.iter().all(|o| !o.is_alive()));
    }

    /// Roots created and dropped in reverse order leave the stack balanced.
    #[test]
    fn prop_roots_balance(count in 1usize..16) {
        let (_ctx, _scope) = setup_manual_gc();
        let region = LocalRootRegion::new().unwrap();
        {
            let mut roots = Vec::new();
            for i in 0..count {
                roots.push(Root::new(Value::Int(i as i32)).unwrap());
            }
            prop_assert_eq!(region.len(), count);
            while let Some(root) = roots.pop() {
                drop(root);
            }
        }
        prop_assert_eq!(region.len(), 0);
    }
}
