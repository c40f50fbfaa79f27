//! Scene-graph child binding
//!
//! Design: A class declares child fields of type [`Child<N>`]. The first
//! `_ready` delivered to an instance binds every declared child, before the
//! host's own ready hook runs:
//! - a child with the field's name exists: check its runtime class against
//!   the declared one (fatal on mismatch), then reuse the live host instance
//!   from the identity map or wrap the engine object
//! - no such child: construct the declared class, name it after the field,
//!   attach it (internal children stay hidden), and bind the new child's own
//!   declared children right away
//!
//! Binding is one-directional and happens once per instance.

use std::fmt;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::classes::{EditorPlugin, EngineClass, Node, Node2D, Node3D, RawObject};
use crate::engine::ObjectPtr;
use crate::error::RegistrationError;
use crate::logging::log_child_bound;
use crate::object::{Instance, InstanceCell};
use crate::register::ExtensionClass;

#[cfg(test)]
mod tests;

/// Node type a [`Child`] field can hold
pub trait ChildType: Sized + Send + 'static {
    /// Engine class constructed when the child is missing
    fn class_name() -> String;

    /// Wrap an existing engine object already known to be of this class
    fn from_object(bridge: &Arc<Bridge>, object: ObjectPtr) -> Option<Self>;
}

macro_rules! engine_child {
    ($($name:ident),* $(,)?) => {$(
        impl ChildType for $name {
            fn class_name() -> String {
                <$name as EngineClass>::NAME.to_string()
            }

            fn from_object(bridge: &Arc<Bridge>, object: ObjectPtr) -> Option<Self> {
                Some($name::from_raw(RawObject::new(object, Arc::clone(bridge))))
            }
        }
    )*};
}

engine_child!(Node, Node2D, Node3D, EditorPlugin);

impl<U: ExtensionClass> ChildType for Instance<U> {
    fn class_name() -> String {
        U::class_name()
    }

    fn from_object(bridge: &Arc<Bridge>, object: ObjectPtr) -> Option<Self> {
        bridge.instance::<U>(object)
    }
}

/// Declared child node, bound when the owner first becomes ready
pub struct Child<N> {
    node: Option<N>,
}

impl<N> Child<N> {
    pub fn get(&self) -> Option<&N> {
        self.node.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.node.is_some()
    }

    pub(crate) fn set(&mut self, node: N) {
        self.node = Some(node);
    }

    pub(crate) fn clear(&mut self) {
        self.node = None;
    }
}

impl<N> Default for Child<N> {
    fn default() -> Self {
        Self { node: None }
    }
}

impl<N: fmt::Debug> fmt::Debug for Child<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Child").field(&self.node).finish()
    }
}

type BindFn<T> = Box<dyn Fn(&Arc<Bridge>, &Node, &InstanceCell<T>) + Send + Sync>;

/// Registration-time record of one child field
pub(crate) struct ChildEntry<T: ExtensionClass> {
    pub name: String,
    pub internal: bool,
    pub class: String,
    bind: BindFn<T>,
    clear: Box<dyn Fn(&mut T) + Send + Sync>,
}

impl<T: ExtensionClass> ChildEntry<T> {
    pub(crate) fn new<N: ChildType>(
        owner: String,
        name: String,
        internal: bool,
        lens: fn(&mut T) -> &mut Child<N>,
    ) -> Self {
        let field = name.clone();
        Self {
            name,
            internal,
            class: N::class_name(),
            bind: Box::new(move |bridge: &Arc<Bridge>, parent: &Node, cell: &InstanceCell<T>| {
                let node = resolve::<N>(bridge, parent, &owner, &field, internal);
                lens(&mut cell.bind()).set(node);
            }),
            clear: Box::new(move |value: &mut T| lens(value).clear()),
        }
    }

    pub(crate) fn clear(&self, value: &mut T) {
        (self.clear)(value)
    }
}

/// Bind every declared child of `cell`'s instance; no-op after the first call
pub(crate) fn bind_children<T: ExtensionClass>(
    bridge: &Arc<Bridge>,
    cell: &InstanceCell<T>,
    children: &[ChildEntry<T>],
) {
    if children.is_empty() || !cell.begin_child_binding() {
        return;
    }
    let parent = Node::from_raw(cell.base().raw().clone());
    for entry in children {
        (entry.bind)(bridge, &parent, cell);
    }
}

fn resolve<N: ChildType>(
    bridge: &Arc<Bridge>,
    parent: &Node,
    owner: &str,
    name: &str,
    internal: bool,
) -> N {
    let declared = N::class_name();
    let engine = bridge.engine();

    if let Some(existing) = parent.get_node_or_null(name) {
        let found = engine.object_class(existing.object()).unwrap_or_default();
        if !engine.is_parent_class(&found, &declared) {
            panic!(
                "{}",
                RegistrationError::ChildClassMismatch {
                    class: owner.to_string(),
                    child: name.to_string(),
                    expected: declared,
                    found,
                }
            );
        }
        let Some(node) = N::from_object(bridge, existing.object()) else {
            panic!("child `{name}` of `{owner}` has no live `{declared}` instance");
        };
        log_child_bound(parent.object(), name, false);
        return node;
    }

    let object = engine.construct_object(&declared);
    if object.is_null() {
        panic!("cannot construct child `{name}` of `{owner}`: unknown class `{declared}`");
    }
    let child = Node::from_raw(RawObject::new(object, Arc::clone(bridge)));
    child.set_name(name);
    parent.add_child(&child, internal);
    bridge.bind_children_of(object);
    log_child_bound(parent.object(), name, true);

    match N::from_object(bridge, object) {
        Some(node) => node,
        None => panic!("child `{name}` of `{owner}` has no live `{declared}` instance"),
    }
}
