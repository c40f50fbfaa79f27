//! Bridge context - one value owning every registry
//!
//! Design: Instead of process-wide globals, a [`Bridge`] owns
//! - the engine seam and the handle registry built on it
//! - the identity map of live instances
//! - the class table, plus classes declared for a later init level
//! - the method-bind cache used by engine class wrappers
//! - the documentation index and configuration
//!
//! Tests build as many bridges as they like; the C entry point keeps one in a
//! `OnceCell`. Class records hold a `Weak<Bridge>`, instances hold strong
//! references through their base wrapper, so a bridge lives until its last
//! instance is freed.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::config::BridgeConfig;
use crate::engine::headless::HeadlessEngine;
use crate::engine::{EngineInterface, MethodBind, ObjectPtr};
use crate::error::RegistrationError;
use crate::handle::HandleRegistry;
use crate::logging::{debug, info, log_class_registered, log_class_unregistered, log_missing_bind};
use crate::object::{IdentityMap, Instance, InstanceCell};
use crate::register::{
    init_level, ClassBuilder, ClassOps, ClassRecord, DocIndex, ExtensionClass, Extra, InitLevel,
};

thread_local! {
    /// Bridges with engine callbacks running on this thread, innermost last
    static ACTIVE: RefCell<Vec<Weak<Bridge>>> = RefCell::new(Vec::new());
}

/// Keeps a bridge active on the current thread; see [`Bridge::enter`]
#[must_use = "the bridge is only active while the scope is alive"]
pub struct BridgeScope {
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for BridgeScope {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

type Declaration = Box<dyn FnOnce(&Arc<Bridge>) -> Result<(), RegistrationError> + Send>;

#[derive(Default)]
struct ClassTable {
    records: HashMap<String, Arc<dyn ClassOps>>,
    /// Registration order, for reverse-order teardown
    order: Vec<String>,
}

/// Counters reported by [`Bridge::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub classes: usize,
    pub instances: usize,
    /// Live tracked handles; 0 when tracking is off
    pub handles: usize,
    pub forwarders: usize,
    pub calls: u64,
}

pub struct Bridge {
    engine: Arc<dyn EngineInterface>,
    handles: HandleRegistry,
    identity: IdentityMap,
    classes: RwLock<ClassTable>,
    pending: Mutex<Vec<(InitLevel, String, Declaration)>>,
    binds: DashMap<(&'static str, &'static str), MethodBind>,
    docs: DocIndex,
    config: BridgeConfig,
    editor: bool,
    calls: AtomicU64,
    forwarders: Arc<AtomicUsize>,
    this: Weak<Bridge>,
}

impl Bridge {
    pub fn new(engine: Arc<dyn EngineInterface>, config: BridgeConfig) -> Arc<Self> {
        let editor = config.editor.unwrap_or_else(|| engine.is_editor());
        let docs = if editor && config.docs.enabled {
            DocIndex::load_or_report(&config.docs_path(), engine.as_ref())
        } else {
            DocIndex::new()
        };
        let handles = HandleRegistry::new(Arc::clone(&engine), config.handles.track);
        info!(
            target: "classdb",
            extension = %config.extension,
            editor,
            tracking = config.handles.track,
            "bridge created"
        );
        Arc::new_cyclic(|this| Self {
            engine,
            handles,
            identity: IdentityMap::new(),
            classes: RwLock::new(ClassTable::default()),
            pending: Mutex::new(Vec::new()),
            binds: DashMap::new(),
            docs,
            config,
            editor,
            calls: AtomicU64::new(0),
            forwarders: Arc::new(AtomicUsize::new(0)),
            this: this.clone(),
        })
    }

    /// Make this bridge the one object-typed variants resolve against on the
    /// current thread, until the returned scope drops
    ///
    /// Engine callbacks enter their bridge before decoding arguments.
    pub fn enter(&self) -> BridgeScope {
        ACTIVE.with(|active| active.borrow_mut().push(self.this.clone()));
        BridgeScope {
            _thread_bound: PhantomData,
        }
    }

    /// Innermost bridge entered on this thread
    pub fn current() -> Option<Arc<Bridge>> {
        ACTIVE.with(|active| active.borrow().last().and_then(Weak::upgrade))
    }

    /// Bridge over a fresh in-process engine
    pub fn headless() -> (Arc<Self>, Arc<HeadlessEngine>) {
        Self::headless_with(BridgeConfig::default())
    }

    pub fn headless_with(config: BridgeConfig) -> (Arc<Self>, Arc<HeadlessEngine>) {
        let engine = Arc::new(HeadlessEngine::new());
        let bridge = Self::new(Arc::clone(&engine) as Arc<dyn EngineInterface>, config);
        (bridge, engine)
    }

    #[inline]
    pub fn engine(&self) -> &Arc<dyn EngineInterface> {
        &self.engine
    }

    #[inline]
    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    #[inline]
    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn docs(&self) -> &DocIndex {
        &self.docs
    }

    pub fn is_editor(&self) -> bool {
        self.editor
    }

    fn arc(&self) -> Arc<Bridge> {
        match self.this.upgrade() {
            Some(this) => this,
            None => panic!("bridge used during teardown"),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register `T` now
    ///
    /// # Panics
    /// On any [`RegistrationError`]; see [`try_register`](Self::try_register).
    pub fn register<T: ExtensionClass>(&self, extras: Vec<Extra<T>>) {
        if let Err(err) = self.try_register::<T>(extras) {
            panic!("{err}");
        }
    }

    pub fn try_register<T: ExtensionClass>(
        &self,
        extras: Vec<Extra<T>>,
    ) -> Result<(), RegistrationError> {
        let this = self.arc();
        let name = T::class_name();
        if self.is_registered(&name) {
            return Err(RegistrationError::DuplicateClass(name));
        }

        let mut builder = ClassBuilder::<T>::new(name.clone());
        T::register(&mut builder);
        for extra in extras {
            builder.apply(extra);
        }
        let record = Arc::new(ClassRecord::build(builder, &this)?);

        {
            let mut classes = self.classes.write();
            if classes.records.contains_key(&name) {
                return Err(RegistrationError::DuplicateClass(name));
            }
            classes
                .records
                .insert(name.clone(), Arc::clone(&record) as Arc<dyn ClassOps>);
            classes.order.push(name.clone());
        }
        record.register_with(self.engine.as_ref());
        log_class_registered(
            &name,
            <T::Base as crate::classes::EngineClass>::NAME,
            crate::register::is_tool::<T>(),
        );
        Ok(())
    }

    /// Queue `T` for [`initialize`](Self::initialize) at its level: editor
    /// for tool classes, scene otherwise
    pub fn declare<T: ExtensionClass>(&self, extras: Vec<Extra<T>>) {
        let level = init_level::<T>();
        let name = T::class_name();
        debug!(target: "classdb", class = %name, level = ?level, "class declared");
        self.pending.lock().push((
            level,
            name,
            Box::new(move |bridge: &Arc<Bridge>| bridge.try_register::<T>(extras)),
        ));
    }

    /// Register every class declared for `level`, in declaration order
    ///
    /// # Panics
    /// On the first registration error.
    pub fn initialize(&self, level: InitLevel) {
        let due: Vec<_> = {
            let mut pending = self.pending.lock();
            let (due, rest) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|(at, _, _)| *at == level);
            *pending = rest;
            due
        };
        debug!(target: "classdb", level = ?level, classes = due.len(), "initializing");
        let this = self.arc();
        for (_, _, declaration) in due {
            if let Err(err) = declaration(&this) {
                panic!("{err}");
            }
        }
    }

    /// Unregister the classes registered at `level`, newest first
    pub fn deinitialize(&self, level: InitLevel) {
        let names: Vec<String> = {
            let classes = self.classes.read();
            classes
                .order
                .iter()
                .rev()
                .filter(|name| {
                    classes
                        .records
                        .get(*name)
                        .is_some_and(|record| record.level() == level)
                })
                .cloned()
                .collect()
        };
        for name in names {
            if let Err(err) = self.unregister(&name) {
                debug!(target: "classdb", error = %err, "skipped during deinitialize");
            }
        }
    }

    /// Free the class's live instances, then remove it from the engine
    pub fn unregister(&self, class: &str) -> Result<(), RegistrationError> {
        if !self.is_registered(class) {
            return Err(RegistrationError::NotRegistered(class.to_string()));
        }
        for object in self.identity.objects_of(class) {
            if self.identity.contains(object) {
                self.engine.destroy_object(object);
            }
        }
        self.engine.unregister_class(class);
        {
            let mut classes = self.classes.write();
            classes.records.remove(class);
            classes.order.retain(|name| name != class);
        }
        log_class_unregistered(class);
        Ok(())
    }

    pub fn is_registered(&self, class: &str) -> bool {
        self.classes.read().records.contains_key(class)
    }

    /// Registered class names, in registration order
    pub fn classes(&self) -> Vec<String> {
        self.classes.read().order.clone()
    }

    fn record(&self, class: &str) -> Option<Arc<dyn ClassOps>> {
        self.classes.read().records.get(class).cloned()
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Construct a new engine object of class `T`
    ///
    /// # Panics
    /// When `T` is not registered or the engine refuses construction.
    pub fn instantiate<T: ExtensionClass>(&self) -> Instance<T> {
        let name = T::class_name();
        if !self.is_registered(&name) {
            panic!("{}", RegistrationError::NotRegistered(name));
        }
        let object = self.engine.construct_object(&name);
        match self.instance::<T>(object) {
            Some(instance) => instance,
            None => panic!("engine did not construct an instance of `{name}`"),
        }
    }

    /// Typed handle to the live instance behind `object`
    pub fn instance<T: ExtensionClass>(&self, object: ObjectPtr) -> Option<Instance<T>> {
        self.identity
            .load_as::<InstanceCell<T>>(object)
            .map(Instance::from_cell)
    }

    /// Bind the declared children of an extension object now
    pub(crate) fn bind_children_of(&self, object: ObjectPtr) {
        let record = self
            .engine
            .object_class(object)
            .and_then(|class| self.record(&class));
        if let Some(record) = record {
            record.bind_children_of(object);
        }
    }

    // ------------------------------------------------------------------
    // Outbound calls
    // ------------------------------------------------------------------

    /// Resolve an engine method once; later lookups hit the cache
    pub fn method_bind(
        &self,
        class: &'static str,
        method: &'static str,
        hash: i64,
    ) -> Option<MethodBind> {
        if let Some(bind) = self.binds.get(&(class, method)) {
            return Some(*bind);
        }
        match self.engine.method_bind(class, method, hash) {
            Some(bind) => {
                self.binds.insert((class, method), bind);
                Some(bind)
            }
            None => {
                log_missing_bind(class, method);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub(crate) fn count_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn forwarder_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.forwarders)
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            classes: self.classes.read().records.len(),
            instances: self.identity.len(),
            handles: self.handles.live_count(),
            forwarders: self.forwarders.load(Ordering::Acquire),
            calls: self.calls.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("extension", &self.config.extension)
            .field("stats", &self.stats())
            .finish()
    }
}
