//! Integration tests for object synchronization.
//!
//! Uses tokio's paused-time control to drive the periodic update tick
//! deterministically, and linked mock runtimes to simulate a two-peer
//! session.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::error::SyncError;
use common::types::ClientId;
use live_protocol::{newer, LiveEvent};
use live_sync::sync::{LiveObjectSynchronizer, SynchronizerRegistry};
use live_sync::telemetry::names;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_test_utils::{CapturingTelemetry, MockRuntime};

/// Let spawned synchronizer tasks drain their queues.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Register an object whose getter always returns `state`.
fn fixed_state_object(
    object_id: &str,
    runtime: &Arc<MockRuntime>,
    telemetry: &Arc<CapturingTelemetry>,
    state: Value,
) -> LiveObjectSynchronizer {
    LiveObjectSynchronizer::new(
        object_id,
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        move |_connecting| Ok(Some(state.clone())),
        |_connecting, _state, _sender| Ok(()),
    )
    .unwrap()
}

// ============================================================================
// Connect coalescing and deferral
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_same_turn_registrations_coalesce_into_one_connect() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    let _o2 = fixed_state_object("o2", &runtime, &telemetry, json!({"v": 1}));
    let _o3 = fixed_state_object("o3", &runtime, &telemetry, json!({"v": 1}));
    settle().await;

    let connects = runtime.sent_of_kind("connect");
    assert_eq!(connects.len(), 1, "expected one coalesced connect");
    assert_eq!(
        connects[0].content,
        json!({ "o1": {"v": 1}, "o2": {"v": 1}, "o3": {"v": 1} })
    );
}

#[tokio::test(start_paused = true)]
async fn test_connect_deferred_until_runtime_connects() {
    let runtime = MockRuntime::disconnected();
    let telemetry = CapturingTelemetry::shared();

    let _o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    settle().await;
    assert!(runtime.sent().is_empty(), "nothing may be sent while disconnected");

    runtime.set_connected(true, Some("c1"));
    settle().await;

    let connects = runtime.sent_of_kind("connect");
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].content, json!({ "o1": {"v": 1} }));
}

#[tokio::test(start_paused = true)]
async fn test_empty_connect_state_emits_no_signal() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(None),
        |_connecting, _state, _sender| Ok(()),
    )
    .unwrap();
    settle().await;

    assert!(runtime.sent_of_kind("connect").is_empty());
}

// ============================================================================
// Periodic updates
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_update_fires_on_the_interval() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    settle().await;
    runtime.clear_sent();

    tokio::time::advance(Duration::from_millis(4_999)).await;
    settle().await;
    assert!(runtime.sent_of_kind("update").is_empty());

    tokio::time::advance(Duration::from_millis(2)).await;
    settle().await;
    assert_eq!(runtime.sent_of_kind("update").len(), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(runtime.sent_of_kind("update").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_one_update_per_tick_regardless_of_object_count() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    let _o2 = fixed_state_object("o2", &runtime, &telemetry, json!({"v": 2}));
    let _o3 = fixed_state_object("o3", &runtime, &telemetry, json!({"v": 3}));
    settle().await;
    runtime.clear_sent();

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    let updates = runtime.sent_of_kind("update");
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].content,
        json!({ "o1": {"v": 1}, "o2": {"v": 2}, "o3": {"v": 3} })
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_update_when_all_objects_return_none() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(None),
        |_connecting, _state, _sender| Ok(()),
    )
    .unwrap();
    settle().await;

    tokio::time::advance(Duration::from_secs(11)).await;
    settle().await;
    assert!(runtime.sent_of_kind("update").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failing_getter_is_isolated_to_its_object() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Err("state store unavailable".into()),
        |_connecting, _state, _sender| Ok(()),
    )
    .unwrap();
    let _o2 = fixed_state_object("o2", &runtime, &telemetry, json!({"v": 7}));
    settle().await;
    runtime.clear_sent();
    telemetry.clear();

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    let updates = runtime.sent_of_kind("update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].content, json!({ "o2": {"v": 7} }));
    assert_eq!(telemetry.count_named(names::GET_STATE_ERROR), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disposed_object_leaves_the_next_tick() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    let _o2 = fixed_state_object("o2", &runtime, &telemetry, json!({"v": 2}));
    settle().await;
    runtime.clear_sent();

    o1.dispose();
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    let updates = runtime.sent_of_kind("update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].content, json!({ "o2": {"v": 2} }));
}

// ============================================================================
// Inbound demux and the connect pong
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_remote_connect_gets_immediate_pong() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let applied: Arc<Mutex<Vec<(bool, Value, ClientId)>>> = Arc::default();
    let applied_clone = applied.clone();
    let _o1 = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(Some(json!({"v": 2}))),
        move |connecting, state, sender| {
            applied_clone
                .lock()
                .unwrap()
                .push((connecting, state.clone(), sender.clone()));
            Ok(())
        },
    )
    .unwrap();
    settle().await;
    runtime.clear_sent();

    // A joining peer announces o1 with its initial state.
    runtime.deliver_signal("connect", Some("joiner"), json!({ "o1": {"v": 1} }), false);
    settle().await;

    // The joiner's state was applied with the connecting flag...
    let applied = applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].0);
    assert_eq!(applied[0].1, json!({"v": 1}));
    assert_eq!(applied[0].2, ClientId::from("joiner"));

    // ...and fresh state went out immediately, without waiting a tick.
    let updates = runtime.sent_of_kind("update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].content, json!({ "o1": {"v": 2} }));
}

#[tokio::test(start_paused = true)]
async fn test_pong_references_only_recognized_ids() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 2}));
    settle().await;
    runtime.clear_sent();

    runtime.deliver_signal(
        "connect",
        Some("joiner"),
        json!({ "o1": {"v": 1}, "unknown": {"v": 9} }),
        false,
    );
    settle().await;

    let updates = runtime.sent_of_kind("update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].content, json!({ "o1": {"v": 2} }));
}

#[tokio::test(start_paused = true)]
async fn test_local_signals_are_ignored() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let applied: Arc<Mutex<Vec<Value>>> = Arc::default();
    let applied_clone = applied.clone();
    let _o1 = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(Some(json!({"v": 1}))),
        move |_connecting, state, _sender| {
            applied_clone.lock().unwrap().push(state.clone());
            Ok(())
        },
    )
    .unwrap();
    settle().await;

    // The mock echoes our own connect back with local = true; it must not
    // be applied, and no pong may answer it.
    assert!(applied.lock().unwrap().is_empty());
    assert!(runtime.sent_of_kind("update").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_non_record_states_are_skipped() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let applied: Arc<Mutex<Vec<Value>>> = Arc::default();
    let applied_clone = applied.clone();
    let _o1 = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(None),
        move |_connecting, state, _sender| {
            applied_clone.lock().unwrap().push(state.clone());
            Ok(())
        },
    )
    .unwrap();
    settle().await;

    runtime.deliver_signal("update", Some("peer"), json!({ "o1": 42 }), false);
    runtime.deliver_signal("update", Some("peer"), json!({ "o1": null }), false);
    runtime.deliver_signal("update", Some("peer"), json!([1, 2, 3]), false);
    runtime.deliver_signal("update", Some("peer"), json!({ "o1": {"v": 5} }), false);
    settle().await;

    let applied = applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0], json!({"v": 5}));
}

#[tokio::test(start_paused = true)]
async fn test_failing_applier_is_isolated_per_id() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let applied: Arc<Mutex<Vec<String>>> = Arc::default();
    let _o1 = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(None),
        |_connecting, _state, _sender| Err("applier exploded".into()),
    )
    .unwrap();
    let applied_clone = applied.clone();
    let _o2 = LiveObjectSynchronizer::new(
        "o2",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(None),
        move |_connecting, _state, _sender| {
            applied_clone.lock().unwrap().push("o2".to_string());
            Ok(())
        },
    )
    .unwrap();
    settle().await;
    telemetry.clear();

    runtime.deliver_signal(
        "update",
        Some("peer"),
        json!({ "o1": {"v": 1}, "o2": {"v": 2} }),
        false,
    );
    settle().await;

    assert_eq!(applied.lock().unwrap().as_slice(), ["o2"]);
    assert_eq!(telemetry.count_named(names::APPLY_STATE_ERROR), 1);
}

// ============================================================================
// Registration lifecycle and the registry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_registration_is_rejected() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let _o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    let duplicate = LiveObjectSynchronizer::new(
        "o1",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        |_connecting| Ok(None),
        |_connecting, _state, _sender| Ok(()),
    );
    assert!(matches!(
        duplicate,
        Err(SyncError::DuplicateRegistration { .. })
    ));

    // The failed construction must not have leaked a registry reference.
    let container_id = container_id_of(&runtime);
    assert!(SynchronizerRegistry::global().contains(container_id));
    drop(_o1);
    settle().await;
    assert!(!SynchronizerRegistry::global().contains(container_id));
}

#[tokio::test(start_paused = true)]
async fn test_registry_shares_one_synchronizer_per_container() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();
    let container_id = container_id_of(&runtime);

    let o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    let o2 = fixed_state_object("o2", &runtime, &telemetry, json!({"v": 2}));
    assert!(SynchronizerRegistry::global().contains(container_id));

    o1.dispose();
    assert!(SynchronizerRegistry::global().contains(container_id));

    o2.dispose();
    assert!(!SynchronizerRegistry::global().contains(container_id));

    // Dispose is idempotent.
    o2.dispose();
    assert!(!SynchronizerRegistry::global().contains(container_id));
}

#[tokio::test(start_paused = true)]
async fn test_registered_ids_partition_into_connected_and_deferred() {
    let runtime = MockRuntime::disconnected();
    let telemetry = CapturingTelemetry::shared();
    let container_id = container_id_of(&runtime);

    let _o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    let _o2 = fixed_state_object("o2", &runtime, &telemetry, json!({"v": 2}));
    settle().await;

    let synchronizer = SynchronizerRegistry::global().get(container_id).unwrap();
    assert_eq!(synchronizer.object_count(), 2);
    assert!(synchronizer.connected_object_ids().is_empty());
    assert_eq!(synchronizer.pending_object_ids(), ["o1", "o2"]);

    runtime.set_connected(true, Some("c1"));
    settle().await;

    assert!(synchronizer.pending_object_ids().is_empty());
    assert_eq!(synchronizer.connected_object_ids(), ["o1", "o2"]);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_and_reregister_reconnects() {
    let runtime = MockRuntime::connected("c1");
    let telemetry = CapturingTelemetry::shared();

    let o1 = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 1}));
    settle().await;
    assert_eq!(runtime.sent_of_kind("connect").len(), 1);

    o1.dispose();
    settle().await;

    let _again = fixed_state_object("o1", &runtime, &telemetry, json!({"v": 8}));
    settle().await;

    let connects = runtime.sent_of_kind("connect");
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1].content, json!({ "o1": {"v": 8} }));
}

// ============================================================================
// Two-peer convergence under the freshness rule
// ============================================================================

/// Shared "latest writer wins" store resolving concurrent writes with the
/// freshness order over `(timestamp, clientId)` embedded in the state.
fn freshness_store(initial: Value) -> Arc<Mutex<Value>> {
    Arc::new(Mutex::new(initial))
}

fn stamp_of(state: &Value) -> LiveEvent {
    serde_json::from_value(json!({
        "name": "doc",
        "clientId": state["clientId"],
        "timestamp": state["timestamp"],
    }))
    .unwrap()
}

fn register_store(
    runtime: &Arc<MockRuntime>,
    telemetry: &Arc<CapturingTelemetry>,
    store: &Arc<Mutex<Value>>,
) -> LiveObjectSynchronizer {
    let get_store = store.clone();
    let apply_store = store.clone();
    LiveObjectSynchronizer::new(
        "doc",
        runtime.clone(),
        runtime.clone(),
        telemetry.clone(),
        move |_connecting| Ok(Some(get_store.lock().unwrap().clone())),
        move |_connecting, state, _sender| {
            let mut current = apply_store.lock().unwrap();
            if newer(&stamp_of(state), &stamp_of(&current)) {
                *current = state.clone();
            }
            Ok(())
        },
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_peers_converge_to_newest_state() {
    // Each peer owns its own container runtime; the mocks are linked into
    // one session.
    let peer_a = MockRuntime::connected("A");
    let peer_b = MockRuntime::connected("B");
    MockRuntime::link(&peer_a, &peer_b);
    let telemetry = CapturingTelemetry::shared();

    // Same timestamp: the lexicographically larger client id must win.
    let store_a = freshness_store(json!({"value": "from-a", "timestamp": 1_000, "clientId": "A"}));
    let store_b = freshness_store(json!({"value": "from-b", "timestamp": 1_000, "clientId": "B"}));

    let _sync_a = register_store(&peer_a, &telemetry, &store_a);
    settle().await;
    let _sync_b = register_store(&peer_b, &telemetry, &store_b);
    settle().await;

    assert_eq!(store_a.lock().unwrap()["value"], "from-b");
    assert_eq!(store_b.lock().unwrap()["value"], "from-b");
}

#[tokio::test(start_paused = true)]
async fn test_convergence_is_arrival_order_independent() {
    let peer_a = MockRuntime::connected("A");
    let peer_b = MockRuntime::connected("B");
    MockRuntime::link(&peer_a, &peer_b);
    let telemetry = CapturingTelemetry::shared();

    // B holds the older write this time; A's higher timestamp must win on
    // both sides even though B registers (and connects) second.
    let store_a = freshness_store(json!({"value": "newer", "timestamp": 2_000, "clientId": "A"}));
    let store_b = freshness_store(json!({"value": "older", "timestamp": 1_000, "clientId": "B"}));

    let _sync_b = register_store(&peer_b, &telemetry, &store_b);
    settle().await;
    let _sync_a = register_store(&peer_a, &telemetry, &store_a);
    settle().await;

    assert_eq!(store_a.lock().unwrap()["value"], "newer");
    assert_eq!(store_b.lock().unwrap()["value"], "newer");
}

/// Read the container identity through the container trait; `MockRuntime`
/// implements both signaler traits, so the method name needs the path.
fn container_id_of(runtime: &Arc<MockRuntime>) -> common::types::ContainerId {
    live_sync::signaler::ContainerSignaler::container_id(runtime.as_ref())
}
