// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the claim protocol
//!
//! The store's conditional update is the only coordination primitive, so
//! these tests race real tasks on a multi-threaded runtime against one shared
//! store.

use fieldwork_core::application::{ClaimOutcome, ClaimService, CoordinationError};
use fieldwork_core::domain::events::TaskEventType;
use fieldwork_core::domain::field::{FieldNode, FieldNodeId, NodeContent, NodeState, NodeType};
use fieldwork_core::domain::repository::FieldStore;
use fieldwork_core::infrastructure::event_bus::EventBus;
use fieldwork_core::infrastructure::repositories::InMemoryFieldStore;
use serde_json::json;
use std::sync::Arc;

async fn store_with_task() -> (Arc<InMemoryFieldStore>, FieldNodeId) {
    let store = Arc::new(InMemoryFieldStore::new());
    let goal = FieldNode::new(NodeType::Goal, "Goal", NodeContent::default(), 0.9, vec![], None);
    let spec = FieldNode::new(NodeType::Spec, "Spec", NodeContent::default(), 0.85, vec![], Some(goal.id));
    let task = FieldNode::new(
        NodeType::Task,
        "Write migration",
        NodeContent::describe("Add the orders table"),
        0.8,
        vec!["backend".into()],
        Some(spec.id),
    );
    let task_id = task.id;
    store.insert_forest(&[goal, spec, task]).await.unwrap();
    (store, task_id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_concurrent_claimer_wins() {
    let (store, task_id) = store_with_task().await;
    let bus = Arc::new(EventBus::with_default_capacity());
    let service = Arc::new(ClaimService::new(store.clone(), bus.clone()));
    let mut rx = bus.subscribe_node(task_id);

    let claimers = 32;
    let mut handles = Vec::with_capacity(claimers);
    for i in 0..claimers {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.claim(task_id, &format!("agent-{}", i)).await
        }));
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ClaimOutcome::Claimed(node) => winners.push(node.claimed_by.unwrap()),
            ClaimOutcome::AlreadyClaimed { state, .. } => {
                assert_eq!(state, NodeState::Claimed);
                losers += 1;
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(losers, claimers - 1);

    let node = store.get_node(task_id).await.unwrap().unwrap();
    assert_eq!(node.claimed_by.as_deref(), Some(winners[0].as_str()));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, TaskEventType::Claimed);
    assert_eq!(event.agent_id, node.claimed_by);
}

#[tokio::test]
async fn test_resolve_is_idempotent() {
    let (store, task_id) = store_with_task().await;
    let service = ClaimService::new(store.clone(), Arc::new(EventBus::with_default_capacity()));

    service.claim(task_id, "agent-a").await.unwrap();
    let first = service
        .resolve(task_id, "agent-a", json!({"pr": 42}))
        .await
        .unwrap();
    assert!(first.newly_resolved);

    let second = service
        .resolve(task_id, "agent-a", json!({"pr": 43}))
        .await
        .unwrap();
    assert!(!second.newly_resolved);
    assert_eq!(second.artifact, json!({"pr": 42}));
    assert_eq!(first.artifact, second.artifact);

    let node = store.get_node(task_id).await.unwrap().unwrap();
    assert_eq!(node.state, NodeState::Resolved);
    assert_eq!(node.artifact, Some(json!({"pr": 42})));
}

#[tokio::test]
async fn test_resolved_node_cannot_be_claimed_or_released() {
    let (store, task_id) = store_with_task().await;
    let service = ClaimService::new(store, Arc::new(EventBus::with_default_capacity()));

    service.claim(task_id, "agent-a").await.unwrap();
    service.resolve(task_id, "agent-a", json!("done")).await.unwrap();

    match service.claim(task_id, "agent-b").await.unwrap() {
        ClaimOutcome::AlreadyClaimed { state, .. } => assert_eq!(state, NodeState::Resolved),
        other => panic!("expected AlreadyClaimed, got {:?}", other),
    }
    assert!(matches!(
        service.release(task_id, "agent-a").await,
        Err(CoordinationError::InvalidTransition {
            state: NodeState::Resolved,
            ..
        })
    ));
}

#[tokio::test]
async fn test_released_node_can_be_claimed_by_another_agent() {
    let (store, task_id) = store_with_task().await;
    let bus = Arc::new(EventBus::with_default_capacity());
    let service = ClaimService::new(store.clone(), bus.clone());
    let mut rx = bus.subscribe();

    service.claim(task_id, "agent-a").await.unwrap();
    service.release(task_id, "agent-a").await.unwrap();
    let outcome = service.claim(task_id, "agent-b").await.unwrap();
    assert!(outcome.is_claimed());

    let types: Vec<TaskEventType> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![TaskEventType::Claimed, TaskEventType::Released, TaskEventType::Claimed]
    );

    let node = store.get_node(task_id).await.unwrap().unwrap();
    assert_eq!(node.claimed_by.as_deref(), Some("agent-b"));
    assert_eq!(node.attempts, 1);
}

#[tokio::test]
async fn test_operations_on_unknown_node_are_not_found() {
    let (store, _) = store_with_task().await;
    let service = ClaimService::new(store, Arc::new(EventBus::with_default_capacity()));
    let ghost = FieldNodeId::new();

    assert!(matches!(service.claim(ghost, "a").await, Err(CoordinationError::NotFound(_))));
    assert!(matches!(
        service.resolve(ghost, "a", json!(null)).await,
        Err(CoordinationError::NotFound(_))
    ));
    assert!(matches!(service.release(ghost, "a").await, Err(CoordinationError::NotFound(_))));
    assert!(matches!(service.boost(ghost, "a", "help").await, Err(CoordinationError::NotFound(_))));
}

#[tokio::test]
async fn test_only_the_claimant_can_release_or_resolve() {
    let (store, task_id) = store_with_task().await;
    let bus = Arc::new(EventBus::with_default_capacity());
    let service = ClaimService::new(store.clone(), bus.clone());

    service.claim(task_id, "alice").await.unwrap();
    let mut rx = bus.subscribe();

    assert!(matches!(
        service.release(task_id, "mallory").await,
        Err(CoordinationError::NotHeld { .. })
    ));
    assert!(matches!(
        service.resolve(task_id, "mallory", json!("forged")).await,
        Err(CoordinationError::NotHeld { .. })
    ));
    assert!(matches!(
        service.boost(task_id, "mallory", "help").await,
        Err(CoordinationError::NotHeld { .. })
    ));

    match service.claim(task_id, "carol").await.unwrap() {
        ClaimOutcome::AlreadyClaimed { claimed_by, .. } => assert_eq!(claimed_by.as_deref(), Some("alice")),
        other => panic!("expected AlreadyClaimed, got {:?}", other),
    }

    let resolution = service.resolve(task_id, "alice", json!("alice's work")).await.unwrap();
    assert!(resolution.newly_resolved);

    let node = store.get_node(task_id).await.unwrap().unwrap();
    assert_eq!(node.state, NodeState::Resolved);
    assert_eq!(node.claimed_by.as_deref(), Some("alice"));
    assert_eq!(node.artifact, Some(json!("alice's work")));
    assert_eq!(node.attempts, 0);

    let types: Vec<TaskEventType> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec![TaskEventType::Resolved]);
}
