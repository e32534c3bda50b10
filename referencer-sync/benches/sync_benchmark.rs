use criterion::{criterion_group, criterion_main, Criterion};
use referencer_sync::action::Action;
use referencer_sync::model::{Arrow, Endpoint, Highlight};
use referencer_sync::protocol::{ClientMessage, ServerMessage};
use referencer_sync::registry::ConnectionRegistry;
use referencer_sync::storage::WorkspaceStore;
use serde_json::json;
use std::hint::black_box;

/// Workspace with `layers` layers of 20 highlights and 5 arrows each.
fn populated_store(layers: usize) -> WorkspaceStore {
    let store = WorkspaceStore::open_in_memory().unwrap();
    store.ensure_workspace("bench").unwrap();
    for l in 0..layers {
        let layer_id = format!("layer-{l}");
        store.add_layer("bench", &layer_id, &layer_id, "#ffaa00").unwrap();
        for h in 0..20 {
            let highlight = Highlight {
                id: format!("{layer_id}-h{h}"),
                editor_index: 0,
                start: h * 10,
                end: h * 10 + 5,
                text: "lorem".to_string(),
                annotation: String::new(),
            };
            store.add_highlight("bench", &layer_id, &highlight).unwrap();
        }
        for a in 0..5 {
            let arrow = Arrow {
                id: format!("{layer_id}-a{a}"),
                source: Endpoint { editor_index: 0, start: a, end: a + 3, text: "abc".to_string() },
                target: Endpoint { editor_index: 0, start: a + 50, end: a + 53, text: "xyz".to_string() },
                arrow_style: "solid".to_string(),
            };
            store.add_arrow("bench", &layer_id, &arrow).unwrap();
        }
    }
    store
}

fn bench_full_state(c: &mut Criterion) {
    let store = populated_store(10);

    c.bench_function("full_state_10_layers_250_children", |b| {
        b.iter(|| {
            black_box(store.full_state(black_box("bench")).unwrap());
        })
    });
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let snapshot = populated_store(10).full_state("bench").unwrap();
    let msg = ServerMessage::state(snapshot);

    c.bench_function("snapshot_encode_10_layers", |b| {
        b.iter(|| {
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_action_decode(c: &mut Criterion) {
    let frame = json!({
        "type": "addArrow",
        "payload": {
            "layerId": "layer-0",
            "arrow": {
                "id": "a1",
                "from": {"editorIndex": 0, "from": 0, "to": 5, "text": "hello"},
                "to": {"editorIndex": 1, "from": 3, "to": 9, "text": "world"}
            }
        },
        "requestId": "r-1"
    })
    .to_string();

    c.bench_function("action_decode_add_arrow", |b| {
        b.iter(|| {
            let envelope = ClientMessage::decode(black_box(&frame)).unwrap();
            black_box(Action::decode(&envelope.flattened_payload()).unwrap());
        })
    });
}

fn bench_apply_action(c: &mut Criterion) {
    let store = populated_store(1);
    let action = Action::decode(&json!({
        "actionType": "updateHighlightAnnotation",
        "layerId": "layer-0",
        "highlightId": "layer-0-h3",
        "annotation": "note"
    }))
    .unwrap();

    c.bench_function("apply_update_annotation", |b| {
        b.iter(|| {
            action.apply(black_box(&store), "bench").unwrap();
        })
    });
}

fn bench_broadcast_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = ConnectionRegistry::new(1024);
    let mut receivers = Vec::new();
    rt.block_on(async {
        for _ in 0..100 {
            receivers.push(registry.connect("bench").await.1);
        }
    });
    let msg = ServerMessage::action(
        json!({"actionType": "toggleLayerVisibility", "id": "layer-0"}),
        "source",
        None,
    );

    c.bench_function("broadcast_100_peers", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(registry.broadcast("bench", &msg, None).await);
            });
            for rx in &mut receivers {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

criterion_group!(
    benches,
    bench_full_state,
    bench_snapshot_encode,
    bench_action_decode,
    bench_apply_action,
    bench_broadcast_fanout,
);
criterion_main!(benches);
