// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Outcomes
//!
//! - [`ExecutionVerdict`] - what an executor concluded about one node.
//! - [`WorkerOutcome`] - what the worker loop did about it.
//! - [`SwarmReport`] - every worker's outcome from one swarm run.

use chrono::{DateTime, Utc};
use fieldwork_core::domain::field::FieldNodeId;
use fieldwork_core::domain::session::SessionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one [`crate::application::Swarm`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub Uuid);

impl SwarmId {
    /// Generate a new random `SwarmId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwarmId {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of executing a claimed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ExecutionVerdict {
    /// Work is done; the artifact is attached on resolve.
    Completed { artifact: serde_json::Value },
    /// The worker cannot finish (missing dependency, wrong fit). The node is
    /// released for someone else.
    Blocked { reason: String },
    /// The worker wants outside help and keeps the claim.
    NeedsHelp { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Resolved {
        node_id: FieldNodeId,
        artifact: serde_json::Value,
    },
    Released {
        node_id: FieldNodeId,
        reason: String,
    },
    /// Boost emitted; the node stays claimed by this worker.
    Escalated {
        node_id: FieldNodeId,
        reason: String,
    },
    /// Nothing above threshold, or every candidate was taken first.
    Idle,
    /// The session had already resolved or released its one claim.
    SessionComplete,
    /// A coordination call failed. The session may still hold a claim.
    Failed { error: String },
}

impl WorkerOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, WorkerOutcome::Resolved { .. })
    }

    /// Metric label for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerOutcome::Resolved { .. } => "resolved",
            WorkerOutcome::Released { .. } => "released",
            WorkerOutcome::Escalated { .. } => "escalated",
            WorkerOutcome::Idle => "idle",
            WorkerOutcome::SessionComplete => "session_complete",
            WorkerOutcome::Failed { .. } => "failed",
        }
    }

    pub fn node_id(&self) -> Option<FieldNodeId> {
        match self {
            WorkerOutcome::Resolved { node_id, .. }
            | WorkerOutcome::Released { node_id, .. }
            | WorkerOutcome::Escalated { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub agent_id: String,
    pub session_id: SessionId,
    pub outcome: WorkerOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmReport {
    pub swarm_id: SwarmId,
    pub workers: Vec<WorkerReport>,
}

impl SwarmReport {
    pub fn resolved(&self) -> usize {
        self.workers.iter().filter(|w| w.outcome.is_resolved()).count()
    }

    pub fn idle(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| matches!(w.outcome, WorkerOutcome::Idle))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| matches!(w.outcome, WorkerOutcome::Failed { .. }))
            .count()
    }
}
