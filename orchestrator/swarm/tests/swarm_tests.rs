// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for worker loops and concurrent swarms

use anyhow::anyhow;
use async_trait::async_trait;
use fieldwork_core::application::FieldCoordinator;
use fieldwork_core::domain::field::{FieldNode, FieldNodeId, NodeState};
use fieldwork_core::domain::repository::FieldStore;
use fieldwork_core::domain::session::WorkerSession;
use fieldwork_core::domain::tree::{DepositRequest, GoalDraft, SpecDraft, TaskDraft};
use fieldwork_core::infrastructure::event_bus::EventBus;
use fieldwork_core::infrastructure::repositories::InMemoryFieldStore;
use fieldwork_swarm::application::{Swarm, TaskExecutor, WorkerLoop};
use fieldwork_swarm::domain::{ExecutionVerdict, WorkerOutcome};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Completes every node, echoing the title and worker as the artifact.
struct Finisher;

#[async_trait]
impl TaskExecutor for Finisher {
    async fn execute(&self, session: &WorkerSession, node: &FieldNode) -> anyhow::Result<ExecutionVerdict> {
        tokio::task::yield_now().await;
        Ok(ExecutionVerdict::Completed {
            artifact: json!({ "title": node.title, "by": session.agent_id }),
        })
    }
}

/// Returns a fixed verdict, or an error.
struct Scripted(Option<ExecutionVerdict>);

#[async_trait]
impl TaskExecutor for Scripted {
    async fn execute(&self, _session: &WorkerSession, _node: &FieldNode) -> anyhow::Result<ExecutionVerdict> {
        self.0.clone().ok_or_else(|| anyhow!("tool crashed"))
    }
}

async fn seeded(tasks: usize) -> (Arc<FieldCoordinator>, Arc<InMemoryFieldStore>, Vec<FieldNodeId>) {
    let store = Arc::new(InMemoryFieldStore::new());
    let coordinator = Arc::new(FieldCoordinator::new(
        store.clone(),
        Arc::new(EventBus::with_default_capacity()),
    ));
    let request = DepositRequest {
        goal: GoalDraft {
            title: "Harden API".into(),
            description: String::new(),
            affinities: vec!["backend".into()],
        },
        specs: vec![SpecDraft {
            title: "Endpoints".into(),
            description: String::new(),
            affinities: vec!["backend".into()],
            tasks: (0..tasks)
                .map(|i| TaskDraft::new(format!("Task {}", i), vec!["backend".into()]))
                .collect(),
        }],
        deposited_by: None,
        source: None,
    };
    let receipt = coordinator.deposit_tree(&request).await.unwrap();
    let task_ids = receipt.specs[0].task_ids.clone();
    (coordinator, store, task_ids)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swarm_resolves_each_task_once() {
    let (coordinator, store, task_ids) = seeded(3).await;

    let mut swarm = Swarm::new(coordinator, Arc::new(Finisher));
    for i in 0..6 {
        swarm = swarm.with_worker(format!("agent-{}", i), vec!["backend".into()]);
    }
    let report = swarm.run().await;

    assert_eq!(report.workers.len(), 6);
    assert_eq!(report.resolved(), 3);
    assert_eq!(report.idle(), 3);
    assert_eq!(report.failed(), 0);

    let resolved: HashSet<FieldNodeId> = report.workers.iter().filter_map(|w| w.outcome.node_id()).collect();
    assert_eq!(resolved, task_ids.iter().copied().collect());

    for id in task_ids {
        let node = store.get_node(id).await.unwrap().unwrap();
        assert_eq!(node.state, NodeState::Resolved);
    }
}

#[tokio::test]
async fn test_blocked_verdict_releases_node() {
    let (coordinator, store, task_ids) = seeded(1).await;
    let worker = WorkerLoop::new(
        coordinator,
        Arc::new(Scripted(Some(ExecutionVerdict::Blocked {
            reason: "needs migration first".into(),
        }))),
    );

    let mut session = WorkerSession::new("agent-a", vec!["backend".into()]);
    let outcome = worker.run(&mut session).await;

    assert!(matches!(outcome, WorkerOutcome::Released { .. }));
    assert_eq!(session.claimed_node_id(), None);
    assert!(session.is_complete());
    let node = store.get_node(task_ids[0]).await.unwrap().unwrap();
    assert_eq!(node.state, NodeState::Open);
    assert_eq!(node.attempts, 1);

    // The released node is open again, but this session never claims twice.
    assert!(matches!(worker.run(&mut session).await, WorkerOutcome::SessionComplete));
    let node = store.get_node(task_ids[0]).await.unwrap().unwrap();
    assert_eq!(node.state, NodeState::Open);
}

#[tokio::test]
async fn test_executor_error_releases_node() {
    let (coordinator, store, task_ids) = seeded(1).await;
    let worker = WorkerLoop::new(coordinator, Arc::new(Scripted(None)));

    let mut session = WorkerSession::new("agent-a", vec!["backend".into()]);
    match worker.run(&mut session).await {
        WorkerOutcome::Released { reason, .. } => assert!(reason.contains("tool crashed")),
        other => panic!("expected Released, got {:?}", other),
    }
    let node = store.get_node(task_ids[0]).await.unwrap().unwrap();
    assert_eq!(node.state, NodeState::Open);
}

#[tokio::test]
async fn test_needs_help_keeps_claim() {
    let (coordinator, store, task_ids) = seeded(1).await;
    let worker = WorkerLoop::new(
        coordinator,
        Arc::new(Scripted(Some(ExecutionVerdict::NeedsHelp {
            reason: "ambiguous acceptance criteria".into(),
        }))),
    );

    let mut session = WorkerSession::new("agent-a", vec!["backend".into()]);
    let outcome = worker.run(&mut session).await;

    assert!(matches!(outcome, WorkerOutcome::Escalated { .. }));
    assert_eq!(session.claimed_node_id(), Some(task_ids[0]));
    let node = store.get_node(task_ids[0]).await.unwrap().unwrap();
    assert_eq!(node.state, NodeState::Claimed);
    assert_eq!(node.claimed_by.as_deref(), Some("agent-a"));
}

#[tokio::test]
async fn test_held_claim_is_finished_before_sensing() {
    let (coordinator, _store, task_ids) = seeded(2).await;
    let mut session = WorkerSession::new("agent-a", vec!["backend".into()]);
    coordinator.claim(&mut session, task_ids[1]).await.unwrap();

    let worker = WorkerLoop::new(coordinator.clone(), Arc::new(Finisher));
    match worker.run(&mut session).await {
        WorkerOutcome::Resolved { node_id, .. } => assert_eq!(node_id, task_ids[1]),
        other => panic!("expected Resolved, got {:?}", other),
    }

    assert!(matches!(worker.run(&mut session).await, WorkerOutcome::SessionComplete));
}

#[tokio::test]
async fn test_worker_without_matching_work_is_idle() {
    let (coordinator, _store, _) = seeded(2).await;
    let worker = WorkerLoop::new(coordinator, Arc::new(Finisher));

    let mut session = WorkerSession::new("designer", vec!["ux".into()]);
    assert!(matches!(worker.run(&mut session).await, WorkerOutcome::Idle));
}
