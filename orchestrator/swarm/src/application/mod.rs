// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Worker loop and swarm runner
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drive [`WorkerSession`]s through the coordination protocol

use crate::domain::{ExecutionVerdict, SwarmId, SwarmReport, WorkerOutcome, WorkerReport};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use fieldwork_core::application::{ClaimOutcome, CoordinationResult, FieldCoordinator};
use fieldwork_core::domain::field::FieldNode;
use fieldwork_core::domain::session::WorkerSession;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Does the work a node describes. Opaque to the engine.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// An `Err` is treated like [`ExecutionVerdict::Blocked`]: the node is
    /// released with the error as the reason.
    async fn execute(&self, session: &WorkerSession, node: &FieldNode) -> Result<ExecutionVerdict>;
}

pub struct WorkerLoop {
    coordinator: Arc<FieldCoordinator>,
    executor: Arc<dyn TaskExecutor>,
}

impl WorkerLoop {
    pub fn new(coordinator: Arc<FieldCoordinator>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self { coordinator, executor }
    }

    /// Run one pass of the protocol for `session`. Coordination errors are
    /// folded into [`WorkerOutcome::Failed`].
    pub async fn run(&self, session: &mut WorkerSession) -> WorkerOutcome {
        let outcome = match self.try_run(session).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(agent_id = %session.agent_id, error = %e, "Worker loop failed");
                WorkerOutcome::Failed { error: e.to_string() }
            }
        };
        metrics::counter!("fieldwork_worker_outcomes_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    async fn try_run(&self, session: &mut WorkerSession) -> CoordinationResult<WorkerOutcome> {
        // A session that already holds a claim finishes that node first.
        if let Some(held) = session.claimed_node_id() {
            let node = self.coordinator.node(held).await?;
            return self.execute(session, node).await;
        }

        let sensed = self
            .coordinator
            .sense(session, self.coordinator.default_query(session))
            .await?;
        if sensed.session_complete {
            return Ok(WorkerOutcome::SessionComplete);
        }

        for candidate in sensed.nodes {
            let node_id = candidate.node.id;
            match self.coordinator.claim(session, node_id).await? {
                ClaimOutcome::Claimed(node) => return self.execute(session, node).await,
                ClaimOutcome::AlreadyClaimed { claimed_by, .. } => {
                    debug!(
                        agent_id = %session.agent_id,
                        node_id = %node_id,
                        claimed_by = ?claimed_by,
                        "Lost claim race, trying next candidate"
                    );
                }
                ClaimOutcome::SingleGoalViolation { held } if session.holds(held) => {
                    let node = self.coordinator.node(held).await?;
                    return self.execute(session, node).await;
                }
                ClaimOutcome::SingleGoalViolation { .. } => return Ok(WorkerOutcome::SessionComplete),
            }
        }

        debug!(agent_id = %session.agent_id, "No claimable work");
        Ok(WorkerOutcome::Idle)
    }

    async fn execute(&self, session: &mut WorkerSession, node: FieldNode) -> CoordinationResult<WorkerOutcome> {
        let verdict = match self.executor.execute(session, &node).await {
            Ok(verdict) => verdict,
            Err(e) => ExecutionVerdict::Blocked {
                reason: format!("executor error: {}", e),
            },
        };

        match verdict {
            ExecutionVerdict::Completed { artifact } => {
                let resolution = self.coordinator.resolve(session, node.id, artifact).await?;
                Ok(WorkerOutcome::Resolved {
                    node_id: node.id,
                    artifact: resolution.artifact,
                })
            }
            ExecutionVerdict::Blocked { reason } => {
                info!(agent_id = %session.agent_id, node_id = %node.id, reason = %reason, "Releasing blocked node");
                self.coordinator.release(session, node.id).await?;
                Ok(WorkerOutcome::Released {
                    node_id: node.id,
                    reason,
                })
            }
            ExecutionVerdict::NeedsHelp { reason } => {
                self.coordinator.boost(session, node.id, &reason).await?;
                Ok(WorkerOutcome::Escalated {
                    node_id: node.id,
                    reason,
                })
            }
        }
    }
}

/// Many independent worker sessions sharing one coordinator.
pub struct Swarm {
    id: SwarmId,
    coordinator: Arc<FieldCoordinator>,
    executor: Arc<dyn TaskExecutor>,
    sessions: Vec<WorkerSession>,
}

impl Swarm {
    pub fn new(coordinator: Arc<FieldCoordinator>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            id: SwarmId::new(),
            coordinator,
            executor,
            sessions: Vec::new(),
        }
    }

    pub fn id(&self) -> SwarmId {
        self.id
    }

    pub fn with_worker(mut self, agent_id: impl Into<String>, affinities: Vec<String>) -> Self {
        self.sessions.push(WorkerSession::new(agent_id, affinities));
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Run every worker once, concurrently. Reports come back in worker order.
    pub async fn run(self) -> SwarmReport {
        info!(swarm_id = ?self.id, workers = self.sessions.len(), "Starting swarm");
        let mut tasks = JoinSet::new();

        for (index, mut session) in self.sessions.into_iter().enumerate() {
            let worker = WorkerLoop::new(self.coordinator.clone(), self.executor.clone());
            tasks.spawn(async move {
                let started_at = Utc::now();
                let outcome = worker.run(&mut session).await;
                let report = WorkerReport {
                    agent_id: session.agent_id.clone(),
                    session_id: session.session_id,
                    outcome,
                    started_at,
                    finished_at: Utc::now(),
                };
                (index, report)
            });
        }

        let mut indexed: Vec<(usize, WorkerReport)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(e) => warn!(swarm_id = ?self.id, error = %e, "Worker task panicked"),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let report = SwarmReport {
            swarm_id: self.id,
            workers: indexed.into_iter().map(|(_, r)| r).collect(),
        };
        info!(
            swarm_id = ?self.id,
            resolved = report.resolved(),
            idle = report.idle(),
            failed = report.failed(),
            "Swarm finished"
        );
        report
    }
}
