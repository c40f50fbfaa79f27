mod common;

use common::{bridge, Player};
use extbridge::variant::RawVariant;
use extbridge::{ClassBuilder, EngineInterface, ExtensionClass, Node, SignalChannel, Variant};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

fn labels(engine: &extbridge::engine::headless::HeadlessEngine) -> Vec<Variant> {
    engine
        .take_emissions()
        .into_iter()
        .filter(|e| e.signal == "scored")
        .flat_map(|e| e.args)
        .collect()
}

#[test]
fn test_channel_emits_in_order_and_joins() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);
    let player = bridge.instantiate::<Player>();
    assert_eq!(bridge.stats().forwarders, 1);

    {
        let mut value = player.bind();
        for label in ["a", "b", "c"] {
            assert!(value.scored.send((label.to_string(),)));
        }
        value.scored.close();
        assert!(!value.scored.send(("d".to_string(),)));
    }

    engine.free(player.object());
    assert_eq!(bridge.stats().forwarders, 0);
    assert_eq!(
        labels(&engine),
        vec![
            Variant::String("a".to_string()),
            Variant::String("b".to_string()),
            Variant::String("c".to_string()),
        ]
    );
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn test_channel_fed_through_engine_method() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);
    let player = engine.create("Player");

    let label = engine.string_new("goal");
    let sent = engine
        .call_method(
            player,
            "score",
            &[RawVariant::from_handle(
                extbridge::VariantType::String,
                label,
            )],
        )
        .unwrap();
    assert!(sent.as_bool());

    engine.free(player);
    assert_eq!(labels(&engine), vec![Variant::String("goal".to_string())]);
}

#[test]
fn test_channel_sender_from_other_threads() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);
    let player = bridge.instantiate::<Player>();
    let sender = player.bind().scored.sender().expect("open channel");

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let sender = sender.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    sender.send((format!("{n}:{i}"),)).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    drop(sender);

    engine.free(player.object());
    let received = labels(&engine);
    assert_eq!(received.len(), 100);
    // Per-sender order is preserved
    for n in 0..4 {
        let prefix = format!("{n}:");
        let mine: Vec<_> = received
            .iter()
            .filter_map(|v| match v {
                Variant::String(s) if s.starts_with(&prefix) => Some(s.clone()),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = (0..25).map(|i| format!("{n}:{i}")).collect();
        assert_eq!(mine, expected);
    }
}

static RELEASED: AtomicUsize = AtomicUsize::new(0);

struct Beacon {
    pulse: SignalChannel<(i64,)>,
}

impl ExtensionClass for Beacon {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Beacon {
            pulse: SignalChannel::default(),
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.signal_channel::<(i64,)>("pulse", |b| &mut b.pulse);
        builder.on_free(|b: &mut Beacon| {
            // Channel fields are closed before the hook runs
            assert!(!b.pulse.is_open());
            RELEASED.fetch_add(1, Ordering::SeqCst);
        });
    }
}

#[test]
fn test_free_closes_channels_before_hook() {
    let (bridge, engine) = bridge();
    bridge.register::<Beacon>(vec![]);
    let beacon = bridge.instantiate::<Beacon>();
    beacon.bind().pulse.send((7,));

    engine.free(beacon.object());
    assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.stats().forwarders, 0);
    let pulses: Vec<_> = engine
        .take_emissions()
        .into_iter()
        .map(|e| (e.signal, e.args))
        .collect();
    assert_eq!(pulses, vec![("pulse".to_string(), vec![Variant::Int(7)])]);
}
