//! Integration tests for the match registry and its actors.
//!
//! Covers node affinity, the join bridge (accept, reject, backpressure,
//! timeout), removal, shutdown and panic supervision.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::time::Duration;

use bytes::Bytes;
use match_service::actors::{
    JoinAttempt, JoinOutcome, LocalMatchRegistry, MatchDataMessage, JOIN_ATTEMPT_TIMEOUT,
};
use match_service::errors::MatchError;
use match_service::identifier::MatchId;
use match_service::presence::MatchPresence;
use match_service::session::SessionInfo;
use match_service::tracker::Tracker;
use match_test_utils::{envelopes, test_session, MockLogic, TestNode, OP_TERMINATE, TEST_NODE};
use uuid::Uuid;

fn attempt(session: &SessionInfo) -> JoinAttempt {
    JoinAttempt {
        user_id: session.user_id,
        session_id: session.session_id,
        username: session.username.clone(),
        from_node: TEST_NODE.to_string(),
    }
}

fn data_from(session: &SessionInfo, op_code: i64) -> MatchDataMessage {
    MatchDataMessage {
        user_id: session.user_id,
        session_id: session.session_id,
        username: session.username.clone(),
        node: TEST_NODE.to_string(),
        op_code,
        data: Bytes::from_static(b"payload"),
    }
}

async fn wait_for_removal(registry: &LocalMatchRegistry, id: Uuid) -> bool {
    for _ in 0..200 {
        if !registry.contains(id).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

// ============================================================================
// Node affinity and lookups
// ============================================================================

#[tokio::test]
async fn test_join_unknown_match_is_not_found() {
    let node = TestNode::new();
    let alice = test_session("alice");

    let outcome = node
        .registry
        .join(Uuid::new_v4(), TEST_NODE, attempt(&alice))
        .await;

    assert_eq!(outcome, JoinOutcome::NotFound);
    assert!(!outcome.found());
    assert!(!outcome.allowed());
}

#[tokio::test]
async fn test_operations_for_other_node_are_not_found() {
    let logic = MockLogic::accepting();
    let node = TestNode::with_logic(&logic);
    let alice = test_session("alice");

    let wire_id = node.create_authoritative("mock").await;
    let match_id = MatchId::parse(&wire_id).unwrap();

    let outcome = node
        .registry
        .join(match_id.id(), "node-b", attempt(&alice))
        .await;
    assert_eq!(outcome, JoinOutcome::NotFound);

    node.registry
        .send_data(match_id.id(), "node-b", data_from(&alice, 1))
        .await;
    node.registry
        .leave(
            match_id.id(),
            "node-b",
            vec![attempt(&alice).presence()],
        )
        .await;

    // Only a local join reaches the logic
    let outcome = node
        .registry
        .join(match_id.id(), TEST_NODE, attempt(&alice))
        .await;
    assert_eq!(outcome, JoinOutcome::Accepted);
    let calls = logic.calls();
    assert_eq!(calls.join_count(), 1);
    assert_eq!(calls.data_count(), 0);
    assert_eq!(calls.leave_count(), 0);
}

#[tokio::test]
async fn test_new_match_with_unknown_module_fails() {
    let node = TestNode::new();

    let result = node.registry.new_match("arena").await;

    assert!(matches!(result, Err(MatchError::ModuleNotFound(name)) if name == "arena"));
    assert_eq!(node.registry.match_count().await, 0);
}

// ============================================================================
// Join bridge
// ============================================================================

#[tokio::test]
async fn test_join_outcome_follows_logic_decision() {
    let accepting = MockLogic::accepting();
    let rejecting = MockLogic::rejecting();
    let node = TestNode::builder(TEST_NODE)
        .module("accept", &accepting)
        .module("reject", &rejecting)
        .build();
    let alice = test_session("alice");

    let open = MatchId::parse(&node.create_authoritative("accept").await).unwrap();
    let closed = MatchId::parse(&node.create_authoritative("reject").await).unwrap();

    let outcome = node.registry.join(open.id(), TEST_NODE, attempt(&alice)).await;
    assert_eq!(outcome, JoinOutcome::Accepted);
    assert!(outcome.found() && outcome.allowed());

    let outcome = node
        .registry
        .join(closed.id(), TEST_NODE, attempt(&alice))
        .await;
    assert_eq!(outcome, JoinOutcome::Rejected);
    assert!(outcome.found() && !outcome.allowed());

    let joins = accepting.calls().joins();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].session_id, alice.session_id);
    assert_eq!(joins[0].from_node, TEST_NODE);
}

#[tokio::test]
async fn test_saturated_mailbox_rejects_without_waiting() {
    let logic = MockLogic::stalling();
    let node = TestNode::builder(TEST_NODE)
        .module("mock", &logic)
        .mailbox_capacity(1)
        .build();
    let alice = test_session("alice");
    let bob = test_session("bob");

    let handle = node.registry.new_match("mock").await.unwrap();
    let id = handle.match_id().id();

    // First join parks the actor inside the logic callback
    let registry = std::sync::Arc::clone(&node.registry);
    let stalled = attempt(&alice);
    tokio::spawn(async move { registry.join(id, TEST_NODE, stalled).await });
    for _ in 0..200 {
        if logic.calls().join_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(logic.calls().join_count(), 1);

    // Fill the single mailbox slot
    assert!(handle.queue_data(data_from(&alice, 1)));

    let start = std::time::Instant::now();
    let outcome = node.registry.join(id, TEST_NODE, attempt(&bob)).await;

    assert_eq!(outcome, JoinOutcome::Rejected);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(handle.mailbox().messages_dropped() >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_logic_times_out_as_rejection() {
    let logic = MockLogic::stalling();
    let node = TestNode::with_logic(&logic);
    let alice = test_session("alice");

    let match_id = MatchId::parse(&node.create_authoritative("mock").await).unwrap();

    let start = tokio::time::Instant::now();
    let outcome = node
        .registry
        .join(match_id.id(), TEST_NODE, attempt(&alice))
        .await;

    assert_eq!(outcome, JoinOutcome::Rejected);
    assert!(start.elapsed() >= JOIN_ATTEMPT_TIMEOUT);
    // The match itself survives a slow callback
    assert!(node.registry.contains(match_id.id()).await);
}

// ============================================================================
// Removal and shutdown
// ============================================================================

#[tokio::test]
async fn test_remove_match_closes_actor_and_evicts_stream() {
    let logic = MockLogic::accepting();
    let node = TestNode::with_logic(&logic);
    let alice = test_session("alice");

    let handle = node.registry.new_match("mock").await.unwrap();
    let wire_id = handle.match_id().to_string();
    let reply = node.send(&alice, envelopes::join("1", &wire_id)).await;
    assert!(matches!(
        reply.and_then(|r| r.message),
        Some(match_service::envelope::EnvelopeMessage::Match(_))
    ));

    let stream = handle.match_id().stream();
    assert!(node.tracker.stream_exists(&stream));

    node.registry
        .remove_match(handle.match_id().id(), &stream)
        .await;

    assert!(handle.is_closed());
    assert!(!node.registry.contains(handle.match_id().id()).await);
    assert!(!node.tracker.stream_exists(&stream));
    assert_eq!(node.registry.metrics().match_count(), 0);

    let outcome = node
        .registry
        .join(handle.match_id().id(), TEST_NODE, attempt(&alice))
        .await;
    assert_eq!(outcome, JoinOutcome::NotFound);
}

#[tokio::test]
async fn test_remove_unknown_match_still_evicts_stream() {
    let node = TestNode::new();
    let alice = test_session("alice");
    let match_id = MatchId::from_parts(Uuid::new_v4(), TEST_NODE);
    let stream = match_id.stream();
    node.tracker
        .track(alice.session_id, &stream, alice.user_id, alice.presence_meta());

    node.registry.remove_match(match_id.id(), &stream).await;
    // Idempotent
    node.registry.remove_match(match_id.id(), &stream).await;

    assert!(!node.tracker.stream_exists(&stream));
    assert_eq!(node.registry.match_count().await, 0);
}

#[tokio::test]
async fn test_stop_closes_matches_and_refuses_work() {
    let logic = MockLogic::accepting();
    let node = TestNode::with_logic(&logic);
    let alice = test_session("alice");

    let first = node.registry.new_match("mock").await.unwrap();
    let second = node.registry.new_match("mock").await.unwrap();
    assert_eq!(node.registry.match_count().await, 2);

    node.registry.stop().await;

    assert!(node.registry.is_stopped());
    assert!(first.is_closed());
    assert!(second.is_closed());
    assert_eq!(node.registry.match_count().await, 0);
    assert!(matches!(
        node.registry.new_match("mock").await,
        Err(MatchError::RegistryStopped)
    ));
    let outcome = node
        .registry
        .join(first.match_id().id(), TEST_NODE, attempt(&alice))
        .await;
    assert_eq!(outcome, JoinOutcome::NotFound);

    let id = first.match_id().id();
    node.registry
        .send_data(id, TEST_NODE, data_from(&alice, 1))
        .await;
    node.registry
        .leave(id, TEST_NODE, vec![attempt(&alice).presence()])
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(logic.calls().join_count(), 0);
    assert_eq!(logic.calls().data_count(), 0);
    assert_eq!(logic.calls().leave_count(), 0);
}

#[tokio::test]
async fn test_panicking_logic_is_removed_by_supervisor() {
    let logic = MockLogic::panicking();
    let survivor = MockLogic::accepting();
    let node = TestNode::builder(TEST_NODE)
        .module("panic", &logic)
        .module("ok", &survivor)
        .build();
    let alice = test_session("alice");

    let doomed = MatchId::parse(&node.create_authoritative("panic").await).unwrap();
    let healthy = MatchId::parse(&node.create_authoritative("ok").await).unwrap();

    // The dropped reply counts as a rejection
    let outcome = node
        .registry
        .join(doomed.id(), TEST_NODE, attempt(&alice))
        .await;
    assert_eq!(outcome, JoinOutcome::Rejected);

    assert!(wait_for_removal(&node.registry, doomed.id()).await);
    assert_eq!(node.registry.metrics().panic_count(), 1);

    let outcome = node
        .registry
        .join(healthy.id(), TEST_NODE, attempt(&alice))
        .await;
    assert_eq!(outcome, JoinOutcome::Accepted);
}

// ============================================================================
// Logic effects
// ============================================================================

#[tokio::test]
async fn test_logic_termination_removes_match() {
    let logic = MockLogic::accepting();
    let node = TestNode::with_logic(&logic);
    let alice = test_session("alice");

    let wire_id = node.create_authoritative("mock").await;
    let match_id = MatchId::parse(&wire_id).unwrap();
    node.send(&alice, envelopes::join("1", &wire_id)).await;
    assert!(node.tracker.stream_exists(&match_id.stream()));

    node.send(&alice, envelopes::data(&wire_id, OP_TERMINATE, b"", vec![]))
        .await;

    assert!(wait_for_removal(&node.registry, match_id.id()).await);
    assert!(!node.tracker.stream_exists(&match_id.stream()));
}

#[tokio::test]
async fn test_logic_broadcast_reaches_every_member() {
    let logic = MockLogic::accepting().echo_data();
    let node = TestNode::with_logic(&logic);
    let alice = test_session("alice");
    let bob = test_session("bob");

    let wire_id = node.create_authoritative("mock").await;
    node.send(&alice, envelopes::join("1", &wire_id)).await;
    node.send(&bob, envelopes::join("2", &wire_id)).await;

    node.send(&alice, envelopes::data(&wire_id, 7, b"hello", vec![]))
        .await;

    assert!(node.router.wait_for_deliveries(1).await);
    let delivery = node.router.last().unwrap();
    assert!(delivery.reaches(&alice));
    assert!(delivery.reaches(&bob));

    let data = delivery.match_data().unwrap();
    assert_eq!(data.match_id, wire_id);
    assert_eq!(data.op_code, 7);
    assert_eq!(data.data, b"hello".to_vec());
    assert_eq!(
        data.presence.as_ref().map(|p| p.session_id.clone()),
        Some(alice.session_id.to_string())
    );

    // The logic saw the sender attributed to this node
    let received = logic.calls().data();
    assert_eq!(received[0].node, TEST_NODE);
    assert_eq!(received[0].session_id, alice.session_id);
}

#[tokio::test]
async fn test_kick_evicts_local_presences_and_notifies_logic() {
    let logic = MockLogic::accepting();
    let node = TestNode::with_logic(&logic);
    let alice = test_session("alice");
    let bob = test_session("bob");

    let wire_id = node.create_authoritative("mock").await;
    let match_id = MatchId::parse(&wire_id).unwrap();
    let stream = match_id.stream();
    node.send(&alice, envelopes::join("1", &wire_id)).await;
    node.send(&bob, envelopes::join("2", &wire_id)).await;

    let mut foreign_bob: MatchPresence = attempt(&bob).presence();
    foreign_bob.node = "node-b".to_string();
    node.registry
        .kick(&stream, &[attempt(&alice).presence(), foreign_bob])
        .await;

    assert!(node
        .tracker
        .get_local(alice.session_id, &stream, alice.user_id)
        .is_none());
    // Presences claimed by another node are left to that node
    assert!(node
        .tracker
        .get_local(bob.session_id, &stream, bob.user_id)
        .is_some());

    assert!(logic.calls().wait_for_leaves(1).await);
    let leaves = logic.calls().leaves();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].session_id, alice.session_id);
}
