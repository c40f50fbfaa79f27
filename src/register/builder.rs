//! Declaration vocabulary for host classes

use std::io;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use super::class::ExtensionClass;
use super::docs::ClassDocs;
use super::extras::Extra;
use super::method::{
    CtorFn, FunctionKind, IntoMethod, IntoStatic, MethodFn, SignalArgs, StaticFn,
};
use super::naming::is_constructor_name;
use super::signals::{Forwarder, SignalChannel};
use crate::classes::AsNode;
use crate::engine::PropertyHint;
use crate::error::{ConvertError, RegistrationError};
use crate::scene::{Child, ChildEntry, ChildType};
use crate::variant::{FromVariant, Signal, ToVariant, Variant, VariantType, VariantTyped};

pub(crate) struct PropertyEntry<T> {
    pub name: String,
    pub ty: VariantType,
    pub hint: PropertyHint,
    pub group: Option<String>,
    pub doc: Option<String>,
    pub get: Box<dyn Fn(&T) -> Variant + Send + Sync>,
    pub set: Box<dyn Fn(&mut T, &Variant) -> Result<(), ConvertError> + Send + Sync>,
}

pub(crate) struct MethodEntry<T> {
    /// Host name, e.g. `Process`
    pub host: String,
    /// Engine name when exported; defaults to the snake_case host name
    pub rename: Option<String>,
    pub params: Vec<VariantType>,
    pub ret: VariantType,
    pub doc: Option<String>,
    pub call: MethodFn<T>,
}

pub(crate) enum StaticKind<T: ExtensionClass> {
    Function(StaticFn),
    /// Builds a new instance and returns its object
    Ctor(CtorFn<T>),
}

pub(crate) struct StaticEntry<T: ExtensionClass> {
    pub host: String,
    pub rename: Option<String>,
    pub params: Vec<VariantType>,
    pub ret: VariantType,
    pub doc: Option<String>,
    pub kind: StaticKind<T>,
}

/// What a forwarder needs from the instance it serves
pub(crate) struct ForwarderContext {
    pub thread_name: String,
    pub signal: Signal,
    pub running: Arc<AtomicUsize>,
}

type OpenFn<T> = Box<dyn Fn(&mut T, ForwarderContext) -> io::Result<Forwarder> + Send + Sync>;

pub(crate) enum SignalField<T> {
    Plain(fn(&mut T) -> &mut Signal),
    Channel {
        open: OpenFn<T>,
        close: Box<dyn Fn(&mut T) + Send + Sync>,
    },
}

pub(crate) struct SignalEntry<T> {
    pub name: String,
    pub params: Vec<VariantType>,
    pub doc: Option<String>,
    pub field: SignalField<T>,
}

/// Collects a class's members during [`ExtensionClass::register`]
pub struct ClassBuilder<T: ExtensionClass> {
    pub(crate) class: String,
    pub(crate) docs: ClassDocs,
    pub(crate) properties: Vec<PropertyEntry<T>>,
    pub(crate) methods: Vec<MethodEntry<T>>,
    pub(crate) statics: Vec<StaticEntry<T>>,
    pub(crate) constants: Vec<(String, i64)>,
    pub(crate) signals: Vec<SignalEntry<T>>,
    pub(crate) children: Vec<ChildEntry<T>>,
    pub(crate) on_free: Option<Box<dyn Fn(&mut T) + Send + Sync>>,
    pub(crate) ctor: Option<CtorFn<T>>,
    pub(crate) errors: Vec<RegistrationError>,
}

impl<T: ExtensionClass> ClassBuilder<T> {
    pub(crate) fn new(class: String) -> Self {
        Self {
            class,
            docs: ClassDocs::default(),
            properties: Vec::new(),
            methods: Vec::new(),
            statics: Vec::new(),
            constants: Vec::new(),
            signals: Vec::new(),
            children: Vec::new(),
            on_free: None,
            ctor: None,
            errors: Vec::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Class description shown in the editor
    pub fn docs(&mut self, description: impl Into<String>) -> &mut Self {
        self.docs.description = Some(description.into());
        self
    }

    /// Export a field as an engine property
    ///
    /// Signal-typed fields are rejected; declare them with [`signal`](Self::signal).
    pub fn property<P>(
        &mut self,
        name: impl Into<String>,
        get: fn(&T) -> &P,
        get_mut: fn(&mut T) -> &mut P,
    ) -> PropertyBuilder<'_, T>
    where
        P: ToVariant + FromVariant + VariantTyped + 'static,
    {
        let name = name.into();
        if P::VARIANT_TYPE == VariantType::Signal {
            self.errors.push(RegistrationError::InvalidProperty {
                class: self.class.clone(),
                member: name.clone(),
                reason: "signal fields are declared with `signal`",
            });
        }
        self.properties.push(PropertyEntry {
            name,
            ty: P::VARIANT_TYPE,
            hint: PropertyHint::None,
            group: None,
            doc: None,
            get: Box::new(move |value: &T| get(value).to_variant()),
            set: Box::new(move |value: &mut T, variant: &Variant| {
                *get_mut(value) = P::from_variant(variant)?;
                Ok(())
            }),
        });
        let index = self.properties.len() - 1;
        PropertyBuilder {
            entry: &mut self.properties[index],
        }
    }

    /// Register a host method; a name matching a base virtual (`Process`
    /// for `_process`) overrides it instead of being exported
    pub fn method<M, F>(&mut self, host_name: impl Into<String>, f: F) -> MethodBuilder<'_>
    where
        F: IntoMethod<T, M>,
    {
        let host = host_name.into();
        let (params, ret) = F::signature();
        self.methods.push(MethodEntry {
            call: f.into_method(host.clone()),
            host,
            rename: None,
            params,
            ret,
            doc: None,
        });
        let index = self.methods.len() - 1;
        let entry = &mut self.methods[index];
        MethodBuilder {
            rename: &mut entry.rename,
            doc: &mut entry.doc,
        }
    }

    /// Register a static method
    pub fn static_method<M, F>(&mut self, host_name: impl Into<String>, f: F) -> MethodBuilder<'_>
    where
        F: IntoStatic<M>,
    {
        let host = host_name.into();
        let (params, ret) = F::signature();
        self.statics.push(StaticEntry {
            kind: StaticKind::Function(f.into_static(host.clone())),
            host,
            rename: None,
            params,
            ret,
            doc: None,
        });
        let index = self.statics.len() - 1;
        let entry = &mut self.statics[index];
        MethodBuilder {
            rename: &mut entry.rename,
            doc: &mut entry.doc,
        }
    }

    pub fn constant(&mut self, name: impl Into<String>, value: i64) -> &mut Self {
        self.constants.push((name.into(), value));
        self
    }

    /// Signal bound to a [`Signal`] field at construction
    pub fn signal<A: SignalArgs>(
        &mut self,
        name: impl Into<String>,
        lens: fn(&mut T) -> &mut Signal,
    ) -> MemberDoc<'_> {
        self.signals.push(SignalEntry {
            name: name.into(),
            params: A::param_types(),
            doc: None,
            field: SignalField::Plain(lens),
        });
        let index = self.signals.len() - 1;
        MemberDoc(&mut self.signals[index].doc)
    }

    /// Signal fed by a [`SignalChannel`] field through a forwarder thread
    pub fn signal_channel<A: SignalArgs>(
        &mut self,
        name: impl Into<String>,
        lens: fn(&mut T) -> &mut SignalChannel<A>,
    ) -> MemberDoc<'_> {
        let open = move |value: &mut T, ctx: ForwarderContext| -> io::Result<Forwarder> {
            let (sender, receiver) = flume::unbounded::<A>();
            let forwarder = Forwarder::spawn(ctx.thread_name, receiver, ctx.signal, ctx.running)?;
            lens(value).open(sender);
            Ok(forwarder)
        };
        self.signals.push(SignalEntry {
            name: name.into(),
            params: A::param_types(),
            doc: None,
            field: SignalField::Channel {
                open: Box::new(open),
                close: Box::new(move |value: &mut T| lens(value).close()),
            },
        });
        let index = self.signals.len() - 1;
        MemberDoc(&mut self.signals[index].doc)
    }

    /// Child node bound on first ready, created when missing
    pub fn child<N: ChildType>(
        &mut self,
        name: impl Into<String>,
        lens: fn(&mut T) -> &mut Child<N>,
    ) -> &mut Self
    where
        T::Base: AsNode,
    {
        self.push_child(name.into(), false, lens)
    }

    /// Like [`child`](Self::child); a created child is attached as internal
    pub fn internal_child<N: ChildType>(
        &mut self,
        name: impl Into<String>,
        lens: fn(&mut T) -> &mut Child<N>,
    ) -> &mut Self
    where
        T::Base: AsNode,
    {
        self.push_child(name.into(), true, lens)
    }

    fn push_child<N: ChildType>(
        &mut self,
        name: String,
        internal: bool,
        lens: fn(&mut T) -> &mut Child<N>,
    ) -> &mut Self {
        self.children
            .push(ChildEntry::new(self.class.clone(), name, internal, lens));
        self
    }

    /// Hook run on ready, after children are bound
    pub fn on_ready<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.method("Ready", move |value: &mut T| f(value));
        self
    }

    /// Teardown hook run after signal, channel and child fields are released
    pub fn on_free<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.on_free = Some(Box::new(f));
        self
    }

    pub(crate) fn apply(&mut self, extra: Extra<T>) {
        match extra {
            Extra::Docs(docs) => {
                self.docs = std::mem::take(&mut self.docs).or(&docs);
            }
            Extra::Constants(constants) => {
                self.constants.extend(constants);
            }
            Extra::Function(function) => {
                let (name, doc, kind) = function.into_parts();
                match kind {
                    FunctionKind::Ctor(ctor) if is_constructor_name(&name) => {
                        if self.ctor.is_some() {
                            self.errors.push(RegistrationError::DuplicateMember {
                                class: self.class.clone(),
                                member: name,
                            });
                        } else {
                            self.ctor = Some(ctor);
                        }
                    }
                    FunctionKind::Ctor(ctor) => self.statics.push(StaticEntry {
                        host: name,
                        rename: None,
                        params: Vec::new(),
                        ret: VariantType::Object,
                        doc,
                        kind: StaticKind::Ctor(ctor),
                    }),
                    FunctionKind::Static {
                        signature: (params, ret),
                        call,
                    } => self.statics.push(StaticEntry {
                        host: name,
                        rename: None,
                        params,
                        ret,
                        doc,
                        kind: StaticKind::Function(call),
                    }),
                }
            }
        }
    }
}

/// Property options
pub struct PropertyBuilder<'a, T> {
    entry: &'a mut PropertyEntry<T>,
}

impl<'a, T> PropertyBuilder<'a, T> {
    /// Show under a named group in the inspector
    pub fn group(self, group: impl Into<String>) -> Self {
        self.entry.group = Some(group.into());
        self
    }

    /// Numeric range hint
    pub fn range(self, min: f64, max: f64, step: f64) -> Self {
        self.entry.hint = PropertyHint::Range { min, max, step };
        self
    }

    pub fn doc(self, text: impl Into<String>) -> Self {
        self.entry.doc = Some(text.into());
        self
    }

    /// Engine-visible name
    pub fn rename(self, name: impl Into<String>) -> Self {
        self.entry.name = name.into();
        self
    }
}

/// Method options
pub struct MethodBuilder<'a> {
    rename: &'a mut Option<String>,
    doc: &'a mut Option<String>,
}

impl MethodBuilder<'_> {
    /// Engine-visible name; ignored for virtual overrides
    pub fn rename(self, name: impl Into<String>) -> Self {
        *self.rename = Some(name.into());
        self
    }

    pub fn doc(self, text: impl Into<String>) -> Self {
        *self.doc = Some(text.into());
        self
    }
}

/// Documentation for a signal
pub struct MemberDoc<'a>(&'a mut Option<String>);

impl MemberDoc<'_> {
    pub fn doc(self, text: impl Into<String>) -> Self {
        *self.0 = Some(text.into());
        self
    }
}
