//! Shared host classes for the integration tests

#![allow(dead_code)]

use extbridge::engine::headless::HeadlessEngine;
use extbridge::logging::{init_logging, Level, LogConfig};
use extbridge::{
    Bridge, BridgeConfig, Child, ClassBuilder, EditorPlugin, ExtensionClass, Node, Node2D,
    Signal, SignalChannel,
};
use std::sync::Arc;

/// Headless bridge with warnings logged to stderr
pub fn bridge() -> (Arc<Bridge>, Arc<HeadlessEngine>) {
    bridge_with(BridgeConfig::default())
}

pub fn bridge_with(config: BridgeConfig) -> (Arc<Bridge>, Arc<HeadlessEngine>) {
    let _ = init_logging(LogConfig::new().with_level(Level::WARN));
    Bridge::headless_with(config)
}

/// Player with a property group, an override, a plain signal and a channel
pub struct Player {
    pub speed: f64,
    pub lives: i64,
    pub distance: f64,
    pub died: Signal,
    pub scored: SignalChannel<(String,)>,
}

impl ExtensionClass for Player {
    type Base = Node2D;

    fn init(_base: Node2D) -> Self {
        Player {
            speed: 4.0,
            lives: 3,
            distance: 0.0,
            died: Signal::default(),
            scored: SignalChannel::default(),
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder
            .property("speed", |p| &p.speed, |p| &mut p.speed)
            .group("Movement")
            .range(0.0, 20.0, 0.5)
            .doc("Units per second");
        builder
            .property("lives", |p| &p.lives, |p| &mut p.lives)
            .group("Health");
        builder.method("Process", |p: &mut Player, delta: f64| {
            p.distance += p.speed * delta;
        });
        builder.method("Hurt", |p: &mut Player| {
            p.lives -= 1;
            if p.lives == 0 {
                p.died.emit(());
            }
            p.lives
        });
        builder.method("Score", |p: &mut Player, label: String| p.scored.send((label,)));
        builder.signal::<()>("died", |p| &mut p.died);
        builder
            .signal_channel::<(String,)>("scored", |p| &mut p.scored)
            .doc("Sent from any thread");
    }
}

/// Level root with a declared `Foo` child and a ready hook
pub struct Level1 {
    pub foo: Child<Node>,
    pub children_at_ready: i64,
}

impl ExtensionClass for Level1 {
    type Base = Node;

    fn class_name() -> String {
        "Level".to_string()
    }

    fn init(_base: Node) -> Self {
        Level1 {
            foo: Child::default(),
            children_at_ready: -1,
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.child("Foo", |l| &mut l.foo).on_ready(|l: &mut Level1| {
            if let Some(foo) = l.foo.get() {
                l.children_at_ready = foo.get_parent().map_or(0, |parent| {
                    parent.get_child_count(true)
                });
            }
        });
    }
}

/// Editor-only tool class
pub struct Toolbox;

impl ExtensionClass for Toolbox {
    type Base = EditorPlugin;

    fn init(_base: EditorPlugin) -> Self {
        Toolbox
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.method("GetPluginName", |_: &Toolbox| "Toolbox".to_string());
    }
}
