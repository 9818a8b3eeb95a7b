//! End-to-end control-plane tests over in-process peers.
//!
//! Workers and clients attach to the coordinator through raw message
//! channels, exactly like the WebSocket glue does, so the whole command
//! surface and the invocation protocol are exercised without a socket.

use salix_common::protocol::{parse_peer_frame, PeerFrame, Request, Response};
use salix_common::server::PeerHandle;
use salix_common::{Coordinator, CoordinatorSettings};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct TestPeer {
    handle: PeerHandle,
}

impl TestPeer {
    fn connect(coordinator: &Arc<Coordinator>) -> Self {
        TestPeer {
            handle: coordinator.attach(),
        }
    }

    fn send(&self, value: serde_json::Value) {
        self.handle
            .sender
            .send(value.to_string())
            .expect("coordinator is gone");
    }

    async fn recv(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(2), self.handle.receiver.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("coordinator closed the channel")
    }

    async fn recv_response(&mut self) -> Response {
        let text = self.recv().await;
        serde_json::from_str(&text).expect("frame was not a response")
    }

    async fn request(&mut self, value: serde_json::Value) -> Response {
        self.send(value);
        self.recv_response().await
    }
}

/// What the scripted worker does with one invocation.
#[derive(Clone, Copy, Debug)]
enum Reply {
    Value(bool),
    /// Swallow the request and never answer.
    Silent,
    /// Drop the connection instead of answering.
    Disconnect,
}

struct Worker {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Worker {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Register the given leaves, then serve scripted invocation replies.
async fn spawn_worker(
    coordinator: &Arc<Coordinator>,
    actions: &[&str],
    conditions: &[&str],
    script: &[(&str, &[Reply])],
) -> Worker {
    let mut peer = TestPeer::connect(coordinator);
    for name in actions {
        let response = peer
            .request(json!({"command": "register_action", "name": name}))
            .await;
        assert!(response.is_ok(), "registering '{name}': {response:?}");
    }
    for name in conditions {
        let response = peer
            .request(json!({"command": "register_condition", "name": name}))
            .await;
        assert!(response.is_ok(), "registering '{name}': {response:?}");
    }

    let mut script: HashMap<String, VecDeque<Reply>> = script
        .iter()
        .map(|(name, replies)| (name.to_string(), replies.iter().copied().collect()))
        .collect();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let observed = calls.clone();

    tokio::spawn(async move {
        while let Some(text) = peer.handle.receiver.recv().await {
            let Ok(PeerFrame::Request(Request::InvokeFunc {
                name,
                request_id: Some(request_id),
            })) = parse_peer_frame(&text)
            else {
                continue;
            };
            observed.lock().unwrap().push(name.clone());
            match script.get_mut(&name).and_then(|q| q.pop_front()) {
                Some(Reply::Value(value)) => {
                    peer.send(json!({"request_id": request_id, "result": value}));
                }
                Some(Reply::Silent) => {}
                Some(Reply::Disconnect) => return,
                None => {
                    peer.send(json!({
                        "request_id": request_id,
                        "error": format!("'{name}' exhausted its script"),
                    }));
                }
            }
        }
    });

    Worker { calls }
}

fn coordinator() -> Arc<Coordinator> {
    Coordinator::new(CoordinatorSettings {
        invoke_timeout: Duration::from_secs(5),
        tick_interval: Duration::from_millis(10),
    })
}

#[tokio::test]
async fn single_action_success() {
    let coordinator = coordinator();
    let worker = spawn_worker(&coordinator, &["greet"], &[], &[("greet", &[Reply::Value(true)])]).await;

    let mut client = TestPeer::connect(&coordinator);
    let response = client
        .request(json!({
            "command": "create_tree",
            "tree_id": "t1",
            "tree_structure": {"type": "ActionNode", "action": "greet"},
        }))
        .await;
    assert!(response.is_ok());

    let response = client
        .request(json!({"command": "run_tree", "tree_id": "t1"}))
        .await;
    assert!(response.is_ok());
    let result = response.result.expect("run_tree returns the outcome");
    assert!(result.is_success());
    assert_eq!(worker.calls(), vec!["greet"]);

    // The context recorded exactly one evaluation.
    let response = client
        .request(json!({"command": "get_tree", "tree_id": "t1"}))
        .await;
    let tree = response.tree.expect("get_tree returns the structure");
    assert_eq!(tree.context.len(), 1);
    assert_eq!(tree.context[0].leaf, "greet");
    assert!(tree.context[0].status.is_success());
}

#[tokio::test]
async fn sequence_fails_fast() {
    let coordinator = coordinator();
    let worker = spawn_worker(
        &coordinator,
        &["a", "b", "c"],
        &[],
        &[
            ("a", &[Reply::Value(true)]),
            ("b", &[Reply::Value(false)]),
            ("c", &[Reply::Value(true)]),
        ],
    )
    .await;

    let mut client = TestPeer::connect(&coordinator);
    client
        .request(json!({
            "command": "create_tree",
            "tree_id": "seq",
            "tree_structure": {"type": "SequenceNode", "children": [
                {"type": "ActionNode", "action": "a"},
                {"type": "ActionNode", "action": "b"},
                {"type": "ActionNode", "action": "c"},
            ]},
        }))
        .await;

    let response = client
        .request(json!({"command": "run_tree", "tree_id": "seq"}))
        .await;
    assert!(response.result.unwrap().is_failure());
    // b's failure short-circuits; c is never invoked.
    assert_eq!(worker.calls(), vec!["a", "b"]);
}

#[tokio::test]
async fn parallel_threshold() {
    let coordinator = coordinator();
    let _worker = spawn_worker(
        &coordinator,
        &["a", "b", "c", "d"],
        &[],
        &[
            ("a", &[Reply::Value(true)]),
            ("b", &[Reply::Value(true)]),
            ("c", &[Reply::Value(false)]),
            ("d", &[Reply::Value(false)]),
        ],
    )
    .await;

    let mut client = TestPeer::connect(&coordinator);
    client
        .request(json!({
            "command": "create_tree",
            "tree_id": "par",
            "tree_structure": {"type": "ParallelNode", "success_threshold": 2, "children": [
                {"type": "ActionNode", "action": "a"},
                {"type": "ActionNode", "action": "b"},
                {"type": "ActionNode", "action": "c"},
                {"type": "ActionNode", "action": "d"},
            ]},
        }))
        .await;

    let response = client
        .request(json!({"command": "run_tree", "tree_id": "par"}))
        .await;
    assert!(response.result.unwrap().is_success());
}

#[tokio::test]
async fn worker_disconnect_mid_tick() {
    let coordinator = coordinator();
    let _worker = spawn_worker(&coordinator, &["slow"], &[], &[("slow", &[Reply::Disconnect])]).await;

    let mut client = TestPeer::connect(&coordinator);
    client
        .request(json!({
            "command": "create_tree",
            "tree_id": "t",
            "tree_structure": {"type": "ActionNode", "action": "slow"},
        }))
        .await;

    let response = client
        .request(json!({"command": "run_tree", "tree_id": "t"}))
        .await;
    let result = response.result.unwrap();
    assert!(result.is_failure());
    assert_eq!(
        result.reason,
        Some(salix_core::FailureReason::LeafUnavailable)
    );

    // The registry no longer lists the vanished worker's leaf.
    let response = client.request(json!({"command": "get_actions"})).await;
    assert_eq!(response.actions, Some(vec![]));
}

#[tokio::test]
async fn timeout_decorator_with_silent_worker() {
    let coordinator = coordinator();
    let worker = spawn_worker(
        &coordinator,
        &["never_replies"],
        &[],
        &[("never_replies", &[Reply::Silent])],
    )
    .await;

    let mut client = TestPeer::connect(&coordinator);
    client
        .request(json!({
            "command": "create_tree",
            "tree_id": "t",
            "tree_structure": {"type": "TimeoutDecorator", "timeout_ms": 100,
                "child": {"type": "ActionNode", "action": "never_replies"}},
        }))
        .await;

    let started = std::time::Instant::now();
    let response = client
        .request(json!({"command": "run_tree", "tree_id": "t"}))
        .await;
    let result = response.result.unwrap();
    assert!(result.is_failure());
    assert_eq!(result.reason, Some(salix_core::FailureReason::Timeout));
    // The deadline fired, not the 5s invocation timeout.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(worker.calls(), vec!["never_replies"]);
}

#[tokio::test]
async fn repeat_decorator_fails_fast() {
    let coordinator = coordinator();
    let worker = spawn_worker(
        &coordinator,
        &["flaky"],
        &[],
        &[(
            "flaky",
            &[Reply::Value(true), Reply::Value(false), Reply::Value(true)],
        )],
    )
    .await;

    let mut client = TestPeer::connect(&coordinator);
    client
        .request(json!({
            "command": "create_tree",
            "tree_id": "t",
            "tree_structure": {"type": "RepeatDecorator", "count": 3,
                "child": {"type": "ActionNode", "action": "flaky"}},
        }))
        .await;

    let response = client
        .request(json!({"command": "run_tree", "tree_id": "t"}))
        .await;
    assert!(response.result.unwrap().is_failure());
    // Two invocations observed, the third never happens.
    assert_eq!(worker.calls(), vec!["flaky", "flaky"]);
}

#[tokio::test]
async fn registration_is_unique_across_sessions() {
    let coordinator = coordinator();
    let _first = spawn_worker(&coordinator, &["greet"], &[], &[]).await;

    let mut second = TestPeer::connect(&coordinator);
    let response = second
        .request(json!({"command": "register_action", "name": "greet"}))
        .await;
    assert!(!response.is_ok());
    assert_eq!(
        response.code,
        Some(salix_common::ErrorCode::DuplicateLeaf)
    );
}

#[tokio::test]
async fn session_teardown_removes_registrations() {
    let coordinator = coordinator();
    let mut worker_peer = TestPeer::connect(&coordinator);
    assert!(worker_peer
        .request(json!({"command": "register_action", "name": "fleeting"}))
        .await
        .is_ok());

    let mut client = TestPeer::connect(&coordinator);
    let response = client.request(json!({"command": "get_actions"})).await;
    assert_eq!(response.actions, Some(vec!["fleeting".to_string()]));

    drop(worker_peer);
    // Give the session task a moment to observe the closed channel.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = client.request(json!({"command": "get_actions"})).await;
    assert_eq!(response.actions, Some(vec![]));
}

#[tokio::test]
async fn stop_tree_cancels_a_running_tree() {
    let coordinator = coordinator();
    let _worker = spawn_worker(&coordinator, &["slow"], &[], &[("slow", &[Reply::Silent])]).await;

    let mut client = TestPeer::connect(&coordinator);
    client
        .request(json!({
            "command": "create_tree",
            "tree_id": "t",
            "tree_structure": {"type": "ActionNode", "action": "slow"},
        }))
        .await;

    // Pipeline run_tree and stop_tree; commands are handled concurrently.
    client.send(json!({"command": "run_tree", "tree_id": "t"}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.send(json!({"command": "stop_tree", "tree_id": "t"}));

    let mut run_result = None;
    let mut stop_acked = false;
    for _ in 0..2 {
        let response = client.recv_response().await;
        match &response.result {
            Some(outcome) => run_result = Some(outcome.clone()),
            None => {
                assert!(response.is_ok());
                stop_acked = true;
            }
        }
    }
    assert!(stop_acked);
    let outcome = run_result.expect("the run must report back");
    assert!(outcome.is_failure());
    assert_eq!(outcome.reason, Some(salix_core::FailureReason::Cancelled));
}

#[tokio::test]
async fn direct_invoke_func() {
    let coordinator = coordinator();
    let _worker = spawn_worker(
        &coordinator,
        &["greet"],
        &[],
        &[("greet", &[Reply::Value(true)])],
    )
    .await;

    let mut client = TestPeer::connect(&coordinator);
    let response = client
        .request(json!({"command": "invoke_func", "name": "greet"}))
        .await;
    assert!(response.is_ok());
    assert!(response.result.unwrap().is_success());

    let response = client
        .request(json!({"command": "invoke_func", "name": "ghost"}))
        .await;
    assert_eq!(
        response.code,
        Some(salix_common::ErrorCode::LeafUnavailable)
    );
}

#[tokio::test]
async fn tree_crud_round_trip() {
    let coordinator = coordinator();
    let _worker = spawn_worker(
        &coordinator,
        &["greet"],
        &["ready"],
        &[
            ("greet", &[Reply::Value(true)]),
            ("ready", &[Reply::Value(true)]),
        ],
    )
    .await;

    let mut client = TestPeer::connect(&coordinator);
    let structure = json!({"type": "ActionNode", "action": "greet"});
    assert!(client
        .request(
            json!({"command": "create_tree", "tree_id": "t", "tree_structure": structure.clone()})
        )
        .await
        .is_ok());

    // Creating it again collides.
    let response = client
        .request(json!({"command": "create_tree", "tree_id": "t", "tree_structure": structure}))
        .await;
    assert_eq!(response.code, Some(salix_common::ErrorCode::DuplicateTree));

    // Update swaps the structure.
    let updated = json!({"type": "ConditionNode", "condition": "ready"});
    assert!(client
        .request(json!({"command": "update_tree", "tree_id": "t", "tree_structure": updated}))
        .await
        .is_ok());
    let response = client
        .request(json!({"command": "get_tree", "tree_id": "t"}))
        .await;
    let tree = response.tree.unwrap();
    assert!(matches!(
        tree.root,
        salix_common::NodeSpec::Condition { .. }
    ));

    let response = client.request(json!({"command": "get_conditions"})).await;
    assert_eq!(response.conditions, Some(vec!["ready".to_string()]));

    assert!(client
        .request(json!({"command": "delete_tree", "tree_id": "t"}))
        .await
        .is_ok());
    let response = client
        .request(json!({"command": "run_tree", "tree_id": "t"}))
        .await;
    assert_eq!(response.code, Some(salix_common::ErrorCode::UnknownTree));

    // delete_all_tree is idempotent even when empty.
    assert!(client
        .request(json!({"command": "delete_all_tree"}))
        .await
        .is_ok());
}

#[tokio::test]
async fn unknown_command_is_answered() {
    let coordinator = coordinator();
    let mut client = TestPeer::connect(&coordinator);
    let response = client.request(json!({"command": "levitate"})).await;
    assert_eq!(
        response.code,
        Some(salix_common::ErrorCode::UnknownCommand)
    );

    let response = client.request(json!({"gibberish": true})).await;
    assert_eq!(response.code, Some(salix_common::ErrorCode::SchemaError));
}
