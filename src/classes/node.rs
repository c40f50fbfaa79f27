//! Node, Node2D, Node3D, EditorPlugin

use glam::{Vec2, Vec3};

use super::{
    engine_class, upcast, AsNode, AsNode2D, AsNode3D, AsObject, EngineClass, Object, RawObject,
    VirtualSlot,
};
use crate::engine::ObjectPtr;
use crate::frame::CallFrame;
use crate::handle::HandleKind;
use crate::variant::VariantType;

/// Engine method hashes
mod hash {
    pub const GET_NAME: i64 = 2002593661;
    pub const SET_NAME: i64 = 83702148;
    pub const ADD_CHILD: i64 = 3863233950;
    pub const GET_CHILD_COUNT: i64 = 894402480;
    pub const GET_CHILD: i64 = 541253412;
    pub const GET_NODE_OR_NULL: i64 = 2734337346;
    pub const GET_PARENT: i64 = 3160264692;
    pub const GET_POSITION_2D: i64 = 3341600327;
    pub const SET_POSITION_2D: i64 = 743155724;
    pub const GET_POSITION_3D: i64 = 3360562783;
    pub const SET_POSITION_3D: i64 = 3460891852;
}

engine_class! {
    /// Scene-tree node
    Node: Object,
    tool = false,
    virtuals = [
        VirtualSlot::new("_ready", &[], VariantType::Nil),
        VirtualSlot::new("_process", &[VariantType::Float], VariantType::Nil),
        VirtualSlot::new("_physics_process", &[VariantType::Float], VariantType::Nil),
        VirtualSlot::new("_enter_tree", &[], VariantType::Nil),
        VirtualSlot::new("_exit_tree", &[], VariantType::Nil),
    ]
}

upcast!(Node:
    AsObject::as_object -> Object,
    AsNode::as_node -> Node,
);

impl Node {
    fn wrap(&self, ptr: ObjectPtr) -> Option<Node> {
        (!ptr.is_null()).then(|| Node::from_raw(RawObject::new(ptr, self.0.bridge().clone())))
    }

    pub fn get_name(&self) -> String {
        let raw: usize =
            unsafe { self.0.ptrcall("Node", "get_name", hash::GET_NAME, CallFrame::new()) };
        let handles = self.0.bridge().handles();
        let name = handles.pin_half(HandleKind::String, raw);
        handles.read_string(name.get())
    }

    pub fn set_name(&self, name: &str) {
        let name = self.0.bridge().handles().string(name);
        let mut frame = CallFrame::new();
        frame.push(name.get());
        unsafe { self.0.ptrcall_void("Node", "set_name", hash::SET_NAME, frame) }
    }

    /// Attach `child`; internal children are hidden from ordinary listings
    pub fn add_child(&self, child: &impl AsNode, internal: bool) {
        let mut frame = CallFrame::new();
        frame.push(child.as_node().object()).push(internal);
        unsafe { self.0.ptrcall_void("Node", "add_child", hash::ADD_CHILD, frame) }
    }

    pub fn get_child_count(&self, include_internal: bool) -> i64 {
        let mut frame = CallFrame::new();
        frame.push(include_internal);
        unsafe {
            self.0
                .ptrcall("Node", "get_child_count", hash::GET_CHILD_COUNT, frame)
        }
    }

    pub fn get_child(&self, index: i64, include_internal: bool) -> Option<Node> {
        let mut frame = CallFrame::new();
        frame.push(index).push(include_internal);
        let ptr: ObjectPtr = unsafe { self.0.ptrcall("Node", "get_child", hash::GET_CHILD, frame) };
        self.wrap(ptr)
    }

    /// Resolve a relative path such as `Body/Sprite`
    pub fn get_node_or_null(&self, path: &str) -> Option<Node> {
        let path = self.0.bridge().handles().string(path);
        let mut frame = CallFrame::new();
        frame.push(path.get());
        let ptr: ObjectPtr = unsafe {
            self.0
                .ptrcall("Node", "get_node_or_null", hash::GET_NODE_OR_NULL, frame)
        };
        self.wrap(ptr)
    }

    pub fn get_parent(&self) -> Option<Node> {
        let ptr: ObjectPtr =
            unsafe { self.0.ptrcall("Node", "get_parent", hash::GET_PARENT, CallFrame::new()) };
        self.wrap(ptr)
    }

    pub fn get_class(&self) -> String {
        self.as_object().get_class()
    }

    pub fn is_class(&self, class: &str) -> bool {
        self.as_object().is_class(class)
    }
}

engine_class! {
    /// 2D scene node
    Node2D: Node,
    tool = false,
    virtuals = []
}

upcast!(Node2D:
    AsObject::as_object -> Object,
    AsNode::as_node -> Node,
    AsNode2D::as_node_2d -> Node2D,
);

impl Node2D {
    pub fn get_position(&self) -> Vec2 {
        unsafe {
            self.0
                .ptrcall("Node2D", "get_position", hash::GET_POSITION_2D, CallFrame::new())
        }
    }

    pub fn set_position(&self, position: Vec2) {
        let mut frame = CallFrame::new();
        frame.push(position);
        unsafe {
            self.0
                .ptrcall_void("Node2D", "set_position", hash::SET_POSITION_2D, frame)
        }
    }
}

engine_class! {
    /// 3D scene node
    Node3D: Node,
    tool = false,
    virtuals = []
}

upcast!(Node3D:
    AsObject::as_object -> Object,
    AsNode::as_node -> Node,
    AsNode3D::as_node_3d -> Node3D,
);

impl Node3D {
    pub fn get_position(&self) -> Vec3 {
        unsafe {
            self.0
                .ptrcall("Node3D", "get_position", hash::GET_POSITION_3D, CallFrame::new())
        }
    }

    pub fn set_position(&self, position: Vec3) {
        let mut frame = CallFrame::new();
        frame.push(position);
        unsafe {
            self.0
                .ptrcall_void("Node3D", "set_position", hash::SET_POSITION_3D, frame)
        }
    }
}

engine_class! {
    /// Editor plugin; extensions deriving from it run in the editor
    EditorPlugin: Node,
    tool = true,
    virtuals = [
        VirtualSlot::new("_get_plugin_name", &[], VariantType::String),
        VirtualSlot::new("_has_main_screen", &[], VariantType::Bool),
        VirtualSlot::new("_make_visible", &[VariantType::Bool], VariantType::Nil),
    ]
}

upcast!(EditorPlugin:
    AsObject::as_object -> Object,
    AsNode::as_node -> Node,
);
