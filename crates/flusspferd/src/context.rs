//! Execution contexts
//!
//! A [`Context`] owns one managed heap, its class registry and its intrinsic
//! objects. Exactly one context is current per thread at a time; it is selected
//! with [`current_context_scope`], which restores the previous one on drop.
//! Every value operation in the crate runs against the current context.
//!
//! Collection is synchronous: it runs when an object allocation crosses the
//! configured threshold or when [`Context::gc`] is called. While native code
//! holds a borrow of a native instance the cycle is deferred and runs as soon
//! as the last borrow ends.

use crate::class::ClassRegistry;
use crate::error::{Error, Result};
use crate::heap::{GcStats, Heap, ObjectData};
use crate::object::Object;
use crate::security::{CapabilityCheck, SecurityContext};
use crate::stdlib::Intrinsics;
use crate::tracer::Tracer;
use crate::value::Value;
use flusspferd_config::Config;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use tracing::{debug, trace};

static INIT: Once = Once::new();
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// Process-wide initialization; idempotent
pub fn initialize() {
    INIT.call_once(|| {
        debug!(version = crate::VERSION, "flusspferd initialized");
    });
}

/// Create a context with default options
pub fn create() -> Result<Context> {
    Context::create()
}

/// Make `ctx` current until the returned scope is dropped
pub fn current_context_scope(ctx: &Context) -> CurrentContextScope {
    CurrentContextScope::enter(ctx.clone())
}

/// Collect garbage in the current context (no-op without one)
pub fn gc() {
    if let Some(ctx) = Context::current() {
        ctx.gc();
    }
}

/// Context creation options
#[derive(Clone)]
pub struct ContextOptions {
    /// Allocations between automatic collections; 0 disables them
    pub gc_threshold: usize,
    /// Nesting limit for native calls
    pub max_call_depth: u32,
    /// Capability checks consulted before file and environment access
    pub security: Rc<dyn CapabilityCheck>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            gc_threshold: flusspferd_config::config::DEFAULT_GC_THRESHOLD,
            max_call_depth: flusspferd_config::config::DEFAULT_MAX_CALL_DEPTH,
            security: Rc::new(SecurityContext::new()),
        }
    }
}

impl ContextOptions {
    /// Options from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            gc_threshold: config.runtime.gc_threshold,
            max_call_depth: config.runtime.max_call_depth,
            security: Rc::new(SecurityContext::from_config(&config.permissions)),
        }
    }

    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }

    pub fn with_security(mut self, security: impl CapabilityCheck + 'static) -> Self {
        self.security = Rc::new(security);
        self
    }
}

impl fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOptions")
            .field("gc_threshold", &self.gc_threshold)
            .field("max_call_depth", &self.max_call_depth)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ContextInner {
    id: u64,
    heap: RefCell<Heap>,
    registry: RefCell<ClassRegistry>,
    intrinsics: Cell<Option<Intrinsics>>,
    gc_threshold: usize,
    max_call_depth: u32,
    security: RefCell<Rc<dyn CapabilityCheck>>,
    /// Live borrows of native instances; collection waits for zero
    busy: Cell<usize>,
    pending_gc: Cell<bool>,
    in_gc: Cell<bool>,
    call_depth: Cell<u32>,
    gc_runs: Cell<u64>,
    finalized: Cell<u64>,
}

/// Handle to an execution context (cheap to clone)
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// Create a context with default options
    pub fn create() -> Result<Context> {
        Self::with_options(ContextOptions::default())
    }

    /// Create a context and install its intrinsic objects
    pub fn with_options(options: ContextOptions) -> Result<Context> {
        initialize();
        let inner = ContextInner {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            heap: RefCell::new(Heap::new()),
            registry: RefCell::new(ClassRegistry::default()),
            intrinsics: Cell::new(None),
            gc_threshold: options.gc_threshold,
            max_call_depth: options.max_call_depth,
            security: RefCell::new(options.security),
            busy: Cell::new(0),
            pending_gc: Cell::new(false),
            in_gc: Cell::new(false),
            call_depth: Cell::new(0),
            gc_runs: Cell::new(0),
            finalized: Cell::new(0),
        };
        let ctx = Context {
            inner: Rc::new(inner),
        };

        {
            let _scope = current_context_scope(&ctx);
            let intrinsics = crate::stdlib::install(&ctx)?;
            ctx.inner.intrinsics.set(Some(intrinsics));
        }

        debug!(
            context = ctx.inner.id,
            gc_threshold = ctx.inner.gc_threshold,
            "context created"
        );
        Ok(ctx)
    }

    /// The current context of this thread
    pub fn current() -> Option<Context> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    pub(crate) fn current_or_err() -> Result<Context> {
        Self::current().ok_or_else(|| Error::engine_error("no current context"))
    }

    /// The global object
    pub fn global(&self) -> Object {
        self.intrinsics().global
    }

    /// Identity comparison
    pub fn ptr_eq(a: &Context, b: &Context) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn security(&self) -> Rc<dyn CapabilityCheck> {
        self.inner.security.borrow().clone()
    }

    pub fn set_security(&self, security: impl CapabilityCheck + 'static) {
        *self.inner.security.borrow_mut() = Rc::new(security);
    }

    pub fn stats(&self) -> GcStats {
        let (live_objects, live_strings) = self.heap().live_counts();
        GcStats {
            gc_runs: self.inner.gc_runs.get(),
            live_objects,
            live_strings,
            finalized: self.inner.finalized.get(),
        }
    }

    // === Collection ===

    /// Run a full collection cycle (deferred while native instances are borrowed)
    pub fn gc(&self) {
        let inner = &self.inner;
        if inner.in_gc.get() {
            return;
        }
        if inner.busy.get() > 0 {
            if !inner.pending_gc.replace(true) {
                debug!(
                    context = inner.id,
                    borrowed = inner.busy.get(),
                    "collection deferred while native instances are borrowed"
                );
            }
            return;
        }
        inner.pending_gc.set(false);
        inner.in_gc.set(true);

        let mut worklist = Vec::new();
        self.collect_roots(&mut worklist);
        let mut tracer = Tracer::new();
        loop {
            let mut natives = Vec::new();
            {
                let mut heap = inner.heap.borrow_mut();
                while let Some(value) = worklist.pop() {
                    natives.extend(heap.mark(value, &mut worklist));
                }
            }
            if natives.is_empty() {
                break;
            }
            // Trace hooks run without the heap borrowed
            for instance in natives {
                instance.trace(&mut tracer);
            }
            worklist.extend(tracer.drain());
        }

        let orphans = inner.heap.borrow_mut().sweep();
        let finalized = orphans.len();
        for instance in orphans {
            instance.finalize();
        }

        inner.finalized.set(inner.finalized.get() + finalized as u64);
        inner.gc_runs.set(inner.gc_runs.get() + 1);
        inner.in_gc.set(false);

        debug!(
            context = inner.id,
            run = inner.gc_runs.get(),
            finalized,
            traced = tracer.traced(),
            "collection finished"
        );
    }

    fn collect_roots(&self, out: &mut Vec<Value>) {
        self.heap().roots(out);
        if let Some(intrinsics) = self.inner.intrinsics.get() {
            intrinsics.roots(out);
        }
        self.inner.registry.borrow().roots(out);
    }

    // === Crate internals ===

    pub(crate) fn heap(&self) -> Ref<'_, Heap> {
        self.inner.heap.borrow()
    }

    pub(crate) fn heap_mut(&self) -> RefMut<'_, Heap> {
        self.inner.heap.borrow_mut()
    }

    pub(crate) fn registry(&self) -> Ref<'_, ClassRegistry> {
        self.inner.registry.borrow()
    }

    pub(crate) fn registry_mut(&self) -> RefMut<'_, ClassRegistry> {
        self.inner.registry.borrow_mut()
    }

    pub(crate) fn intrinsics(&self) -> Intrinsics {
        // Only missing before `stdlib::install` publishes the first prototypes
        self.inner
            .intrinsics
            .get()
            .unwrap_or_else(Intrinsics::empty)
    }

    /// Publish intrinsics while `stdlib::install` builds them
    pub(crate) fn set_intrinsics(&self, intrinsics: Intrinsics) {
        self.inner.intrinsics.set(Some(intrinsics));
    }

    pub(crate) fn weak(&self) -> Weak<ContextInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<ContextInner>) -> Context {
        Context { inner }
    }

    /// Allocate an object, collecting first when the threshold is reached
    ///
    /// Handles referenced by `data` are protected during that collection.
    pub(crate) fn alloc_object(&self, data: ObjectData) -> Object {
        let threshold = self.inner.gc_threshold;
        if threshold > 0
            && !self.inner.in_gc.get()
            && self.heap().allocs_since_gc >= threshold
        {
            let mut pinned = Vec::new();
            data.referenced(&mut pinned);
            let height = {
                let mut heap = self.heap_mut();
                let height = heap.root_height();
                for value in pinned {
                    heap.push_root(value);
                }
                height
            };
            trace!(context = self.inner.id, "allocation threshold reached");
            self.gc();
            self.heap_mut().truncate_roots(height);
        }
        let ptr = self.heap_mut().alloc_object(data);
        Object::from_ptr(ptr)
    }

    /// Mark a native instance as borrowed until the guard drops
    pub(crate) fn busy_guard(&self) -> BusyGuard {
        self.inner.busy.set(self.inner.busy.get() + 1);
        BusyGuard {
            inner: self.inner.clone(),
        }
    }

    pub(crate) fn enter_call(&self) -> Result<CallDepthGuard> {
        let depth = self.inner.call_depth.get();
        if depth >= self.inner.max_call_depth {
            return Err(Error::range_error("too much recursion"));
        }
        self.inner.call_depth.set(depth + 1);
        Ok(CallDepthGuard {
            inner: self.inner.clone(),
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.inner.id).finish()
    }
}

impl ContextInner {
    pub(crate) fn try_heap_mut(&self) -> Option<RefMut<'_, Heap>> {
        self.heap.try_borrow_mut().ok()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // Every remaining native instance is finalized with its context
        let instances = self.heap.get_mut().drain_instances();
        let count = instances.len();
        for instance in instances {
            instance.finalize();
        }
        debug!(context = self.id, finalized = count, "context destroyed");
    }
}

pub(crate) struct BusyGuard {
    inner: Rc<ContextInner>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let busy = self.inner.busy.get() - 1;
        self.inner.busy.set(busy);
        if busy == 0 && self.inner.pending_gc.get() {
            Context::from_inner(self.inner.clone()).gc();
        }
    }
}

pub(crate) struct CallDepthGuard {
    inner: Rc<ContextInner>,
}

impl Drop for CallDepthGuard {
    fn drop(&mut self) {
        self.inner.call_depth.set(self.inner.call_depth.get() - 1);
    }
}

/// RAII make-current scope; restores the previously current context on drop
pub struct CurrentContextScope {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl CurrentContextScope {
    pub fn enter(ctx: Context) -> Self {
        let depth = CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(ctx);
            stack.len()
        });
        Self {
            depth,
            _not_send: PhantomData,
        }
    }
}

impl Drop for CurrentContextScope {
    fn drop(&mut self) {
        let popped = CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "context scopes must nest");
            stack.pop()
        });
        // The context may be destroyed here; do it outside the stack borrow
        drop(popped);
    }
}
