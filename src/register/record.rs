//! Registered class: immutable metadata plus the inbound callbacks

use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::builder::{
    ClassBuilder, ForwarderContext, MethodEntry, PropertyEntry, SignalEntry, SignalField,
    StaticEntry, StaticKind,
};
use super::class::{init_level, is_tool, ExtensionClass, InitLevel};
use super::docs::ClassDocs;
use super::method::CtorFn;
use super::naming::{is_valid_class_name, snake_case};
use super::signals::Forwarder;
use super::virtuals::{HostMethod, VirtualTable};
use crate::bridge::Bridge;
use crate::classes::{virtual_slots, EngineClass, RawObject};
use crate::engine::{
    ClassCallbacks, ClassInfo, EngineInterface, MethodFlags, MethodInfo, ObjectPtr,
    PropertyInfo, PropertyUsage, SignalInfo, VirtualId,
};
use crate::error::{CallError, RegistrationError};
use crate::handle::HandleRegistry;
use crate::logging::{debug, error, log_instance_created, log_instance_freed, warn};
use crate::object::{InstanceCell, Retired};
use crate::scene::{self, ChildEntry};
use crate::variant::{RawVariant, Signal, Variant};

type Args = SmallVec<[Variant; 4]>;

/// Type-erased view of a registered class, kept by the bridge
pub(crate) trait ClassOps: ClassCallbacks {
    fn name(&self) -> &str;

    fn level(&self) -> InitLevel;

    /// Bind declared children of `object` now instead of at its ready
    fn bind_children_of(&self, object: ObjectPtr);
}

pub(crate) struct ClassRecord<T: ExtensionClass> {
    name: String,
    parent: &'static str,
    tool: bool,
    level: InitLevel,
    bridge: Weak<Bridge>,
    docs: ClassDocs,
    properties: Vec<PropertyEntry<T>>,
    methods: Vec<MethodEntry<T>>,
    /// Engine name -> index into `methods`, overrides excluded
    exported: HashMap<String, usize>,
    statics: Vec<StaticEntry<T>>,
    static_names: HashMap<String, usize>,
    constants: Vec<(String, i64)>,
    fields: Arc<InstanceFields<T>>,
    virtuals: VirtualTable,
    ctor: Option<CtorFn<T>>,
}

/// Signal and child fields of a class, plus its free hook
pub(crate) struct InstanceFields<T: ExtensionClass> {
    signals: Vec<SignalEntry<T>>,
    children: Vec<ChildEntry<T>>,
    on_free: Option<Box<dyn Fn(&mut T) + Send + Sync>>,
}

impl<T: ExtensionClass> InstanceFields<T> {
    /// Release signal, channel and child fields, then run the free hook
    fn tear_down(&self, value: &mut T) {
        for entry in &self.signals {
            match &entry.field {
                SignalField::Plain(lens) => *lens(value) = Signal::default(),
                SignalField::Channel { close, .. } => close(value),
            }
        }
        for child in &self.children {
            child.clear(value);
        }
        if let Some(hook) = &self.on_free {
            hook(value);
        }
    }
}

impl<T: ExtensionClass> ClassRecord<T> {
    /// Validate a filled builder
    pub(crate) fn build(
        builder: ClassBuilder<T>,
        bridge: &Arc<Bridge>,
    ) -> Result<Self, RegistrationError> {
        let ClassBuilder {
            class,
            docs,
            properties,
            methods,
            statics,
            constants,
            signals,
            children,
            on_free,
            ctor,
            errors,
        } = builder;

        if !is_valid_class_name(&class) {
            return Err(RegistrationError::InvalidName(class));
        }
        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }
        let parent = <T::Base as EngineClass>::NAME;
        if !bridge.engine().class_exists(parent) {
            return Err(RegistrationError::UnknownParent {
                class,
                parent: parent.to_string(),
            });
        }

        let slots = virtual_slots::<T::Base>();
        let host_methods: Vec<HostMethod<'_>> = methods
            .iter()
            .map(|m| HostMethod {
                host: &m.host,
                params: &m.params,
            })
            .collect();
        let (virtuals, overrides) =
            VirtualTable::build(&class, &slots, &host_methods, !children.is_empty())?;

        let mut members = MemberSet::new(&class);
        for property in &properties {
            members.insert(&property.name)?;
        }
        let mut exported = HashMap::new();
        for (index, method) in methods.iter().enumerate() {
            if overrides[index] {
                continue;
            }
            let name = method.rename.clone().unwrap_or_else(|| snake_case(&method.host));
            members.insert(&name)?;
            exported.insert(name, index);
        }
        let mut static_names = HashMap::new();
        for (index, function) in statics.iter().enumerate() {
            let name = function.rename.clone().unwrap_or_else(|| snake_case(&function.host));
            members.insert(&name)?;
            static_names.insert(name, index);
        }
        for signal in &signals {
            members.insert(&signal.name)?;
        }
        for (name, _) in &constants {
            members.insert(name)?;
        }

        let docs = match bridge.docs().class(&class) {
            Some(sidecar) => docs.or(sidecar),
            None => docs,
        };

        Ok(Self {
            tool: is_tool::<T>(),
            level: init_level::<T>(),
            name: class,
            parent,
            bridge: Arc::downgrade(bridge),
            docs,
            properties,
            methods,
            exported,
            statics,
            static_names,
            constants,
            fields: Arc::new(InstanceFields {
                signals,
                children,
                on_free,
            }),
            virtuals,
            ctor,
        })
    }

    /// Hand the class and its members to the engine's class database
    pub(crate) fn register_with(self: &Arc<Self>, engine: &dyn EngineInterface) {
        engine.register_class(ClassInfo {
            name: self.name.clone(),
            parent: self.parent.to_string(),
            tool: self.tool,
            doc: self.docs.description.clone(),
            callbacks: Arc::clone(self) as Arc<dyn ClassCallbacks>,
        });

        let mut group: Option<&str> = None;
        for property in &self.properties {
            if let Some(next) = property.group.as_deref() {
                if group != Some(next) {
                    engine.register_property_group(&self.name, next, "");
                    group = Some(next);
                }
            }
            engine.register_property(
                &self.name,
                PropertyInfo {
                    name: property.name.clone(),
                    variant_type: property.ty,
                    hint: property.hint.clone(),
                    usage: PropertyUsage::DEFAULT,
                    doc: self.member_doc(&property.name, &property.doc),
                },
            );
        }

        let mut exported: Vec<(&String, &usize)> = self.exported.iter().collect();
        exported.sort_by_key(|(_, index)| **index);
        for (name, &index) in exported {
            let method = &self.methods[index];
            engine.register_method(
                &self.name,
                MethodInfo {
                    name: name.clone(),
                    params: method.params.clone(),
                    ret: method.ret,
                    flags: MethodFlags::NORMAL,
                    doc: self.member_doc(name, &method.doc),
                },
            );
        }

        let mut statics: Vec<(&String, &usize)> = self.static_names.iter().collect();
        statics.sort_by_key(|(_, index)| **index);
        for (name, &index) in statics {
            let function = &self.statics[index];
            engine.register_method(
                &self.name,
                MethodInfo {
                    name: name.clone(),
                    params: function.params.clone(),
                    ret: function.ret,
                    flags: MethodFlags::NORMAL | MethodFlags::STATIC,
                    doc: self.member_doc(name, &function.doc),
                },
            );
        }

        for signal in &self.fields.signals {
            engine.register_signal(
                &self.name,
                SignalInfo {
                    name: signal.name.clone(),
                    params: signal.params.clone(),
                    doc: self.member_doc(&signal.name, &signal.doc),
                },
            );
        }

        for (name, value) in &self.constants {
            engine.register_constant(&self.name, name, *value);
        }
    }

    fn member_doc(&self, member: &str, explicit: &Option<String>) -> Option<String> {
        explicit
            .clone()
            .or_else(|| self.docs.members.get(member).cloned())
    }

    fn bridge(&self) -> Option<Arc<Bridge>> {
        let bridge = self.bridge.upgrade();
        if bridge.is_none() {
            warn!(target: "classdb", class = %self.name, "callback after bridge shutdown");
        }
        bridge
    }

    fn cell(&self, bridge: &Bridge, object: ObjectPtr) -> Option<Arc<InstanceCell<T>>> {
        bridge.identity().load_as::<InstanceCell<T>>(object)
    }

    /// Construct the engine object and attach a fresh host value
    fn create(&self, bridge: &Arc<Bridge>, ctor: Option<&CtorFn<T>>) -> ObjectPtr {
        let engine = bridge.engine();
        let object = engine.construct_object(self.parent);
        if object.is_null() {
            let message = format!("`{}`: engine refused to construct `{}`", self.name, self.parent);
            error!(target: "classdb", "{message}");
            engine.report_error(&message);
            return ObjectPtr::NULL;
        }
        engine.attach_instance(object, &self.name);

        let base = T::Base::from_raw(RawObject::new(object, Arc::clone(bridge)));
        let mut value = match ctor.or(self.ctor.as_ref()) {
            Some(ctor) => ctor(base.clone()),
            None => T::init(base.clone()),
        };
        let forwarders = self.attach_signals(bridge, object, &mut value);

        let cell = Arc::new(InstanceCell::new(object, self.name.clone(), base, value));
        for forwarder in forwarders {
            cell.add_forwarder(forwarder);
        }
        bridge.identity().store(object, cell);
        log_instance_created(&self.name, object);
        object
    }

    /// Bind signal fields and start one forwarder per channel field
    fn attach_signals(&self, bridge: &Bridge, object: ObjectPtr, value: &mut T) -> Vec<Forwarder> {
        let mut forwarders = Vec::new();
        for entry in &self.fields.signals {
            let signal = Signal::bound(object, entry.name.clone(), bridge.handles().clone());
            match &entry.field {
                SignalField::Plain(lens) => *lens(value) = signal,
                SignalField::Channel { open, .. } => {
                    let ctx = ForwarderContext {
                        thread_name: format!(
                            "{}:{}.{}",
                            bridge.config().signals.thread_prefix,
                            self.name,
                            entry.name
                        ),
                        signal,
                        running: bridge.forwarder_counter(),
                    };
                    match open(value, ctx) {
                        Ok(forwarder) => forwarders.push(forwarder),
                        Err(err) => {
                            let message = format!(
                                "`{}.{}`: cannot start signal forwarder: {err}",
                                self.name, entry.name
                            );
                            error!(target: "signals", "{message}");
                            bridge.engine().report_error(&message);
                        }
                    }
                }
            }
        }
        forwarders
    }

    fn finish(
        &self,
        handles: &HandleRegistry,
        method: &str,
        result: Result<Variant, CallError>,
    ) -> RawVariant {
        match result {
            Ok(value) => value.into_engine(handles),
            Err(err) => {
                let message = format!("`{}::{method}`: {err}", self.name);
                error!(target: "classdb", "{message}");
                handles.engine().report_error(&message);
                RawVariant::NIL
            }
        }
    }
}

fn decode(args: &[RawVariant], handles: &HandleRegistry) -> Args {
    args.iter().map(|arg| Variant::from_raw(arg, handles)).collect()
}

impl<T: ExtensionClass> ClassCallbacks for ClassRecord<T> {
    fn create_instance(&self) -> ObjectPtr {
        match self.bridge() {
            Some(bridge) => self.create(&bridge, None),
            None => ObjectPtr::NULL,
        }
    }

    fn free_instance(&self, object: ObjectPtr) {
        let Some(bridge) = self.bridge() else {
            return;
        };
        let Some(binding) = bridge.identity().delete(object) else {
            warn!(target: "classdb", class = %self.name, object = %object, "free of unknown instance");
            return;
        };
        let Ok(cell) = binding.into_any().downcast::<InstanceCell<T>>() else {
            error!(target: "classdb", class = %self.name, object = %object, "instance bound to another class");
            return;
        };

        for forwarder in cell.take_forwarders() {
            forwarder.stop();
        }
        let fields = Arc::clone(&self.fields);
        let retired = cell.retire(Box::new(move |mut value: T| fields.tear_down(&mut value)));
        if retired == Retired::Deferred {
            debug!(target: "classdb", class = %self.name, object = %object, "instance freed from its own call; teardown runs when the call returns");
        }
        log_instance_freed(&self.name, object);
    }

    fn get_virtual(&self, name: &str) -> Option<VirtualId> {
        self.virtuals.resolve(name)
    }

    fn call_virtual(&self, object: ObjectPtr, id: VirtualId, args: &[RawVariant]) -> RawVariant {
        let Some(bridge) = self.bridge() else {
            return RawVariant::NIL;
        };
        let _scope = bridge.enter();
        bridge.count_call();
        let Some(entry) = self.virtuals.get(id) else {
            return RawVariant::NIL;
        };
        let Some(cell) = self.cell(&bridge, object) else {
            warn!(target: "classdb", class = %self.name, object = %object, virtual_name = entry.engine_name, "virtual call without instance");
            return RawVariant::NIL;
        };
        if entry.binds_children {
            scene::bind_children(&bridge, &cell, &self.fields.children);
        }
        let Some(index) = entry.method else {
            return RawVariant::NIL;
        };
        let method = &self.methods[index];
        let args = decode(args, bridge.handles());
        let result = (method.call)(&mut cell.bind(), &args);
        self.finish(bridge.handles(), &method.host, result)
    }

    fn get_property(&self, object: ObjectPtr, name: &str) -> Option<RawVariant> {
        let bridge = self.bridge()?;
        let property = self.properties.iter().find(|p| p.name == name)?;
        let cell = self.cell(&bridge, object)?;
        let value = (property.get)(&cell.bind());
        Some(value.into_engine(bridge.handles()))
    }

    fn set_property(&self, object: ObjectPtr, name: &str, value: &RawVariant) -> bool {
        let Some(bridge) = self.bridge() else {
            return false;
        };
        let Some(property) = self.properties.iter().find(|p| p.name == name) else {
            return false;
        };
        let Some(cell) = self.cell(&bridge, object) else {
            return false;
        };
        let _scope = bridge.enter();
        let value = Variant::from_raw(value, bridge.handles());
        let result = (property.set)(&mut cell.bind(), &value);
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(target: "classdb", class = %self.name, property = name, error = %err, "property rejected value");
                false
            }
        }
    }

    fn call_method(
        &self,
        object: Option<ObjectPtr>,
        method: &str,
        args: &[RawVariant],
    ) -> Result<RawVariant, CallError> {
        let no_such_method = || CallError::NoSuchMethod {
            class: self.name.clone(),
            method: method.to_string(),
        };
        let bridge = self.bridge().ok_or_else(no_such_method)?;
        let _scope = bridge.enter();
        bridge.count_call();
        let handles = bridge.handles();

        if let Some(&index) = self.exported.get(method) {
            let object = object.ok_or_else(|| CallError::NotStatic {
                method: method.to_string(),
            })?;
            let cell = self
                .cell(&bridge, object)
                .ok_or(CallError::NoInstance(object.addr()))?;
            let args = decode(args, handles);
            let result = (self.methods[index].call)(&mut cell.bind(), &args)?;
            return Ok(result.into_engine(handles));
        }

        let index = *self.static_names.get(method).ok_or_else(no_such_method)?;
        let result = match &self.statics[index].kind {
            StaticKind::Function(call) => call(&decode(args, handles))?,
            StaticKind::Ctor(ctor) => {
                if !args.is_empty() {
                    return Err(CallError::ArgCountMismatch {
                        method: method.to_string(),
                        expected: 0,
                        got: args.len(),
                    });
                }
                Variant::Object(self.create(&bridge, Some(ctor)))
            }
        };
        Ok(result.into_engine(handles))
    }
}

impl<T: ExtensionClass> ClassOps for ClassRecord<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> InitLevel {
        self.level
    }

    fn bind_children_of(&self, object: ObjectPtr) {
        let Some(bridge) = self.bridge() else {
            return;
        };
        if let Some(cell) = self.cell(&bridge, object) {
            scene::bind_children(&bridge, &cell, &self.fields.children);
        }
    }
}

/// Engine-visible member names of one class
struct MemberSet<'a> {
    class: &'a str,
    names: std::collections::HashSet<String>,
}

impl<'a> MemberSet<'a> {
    fn new(class: &'a str) -> Self {
        Self {
            class,
            names: Default::default(),
        }
    }

    fn insert(&mut self, name: &str) -> Result<(), RegistrationError> {
        if self.names.insert(name.to_string()) {
            Ok(())
        } else {
            Err(RegistrationError::DuplicateMember {
                class: self.class.to_string(),
                member: name.to_string(),
            })
        }
    }
}
