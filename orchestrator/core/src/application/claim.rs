// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Claim Protocol
//!
//! Lifecycle transitions over a single node:
//!
//! ```text
//! open --claim--> claimed --resolve--> resolved
//!                 claimed --release--> open
//!                 claimed --boost----> claimed   (event only)
//! ```
//!
//! Every write is one conditional [`FieldStore::transition_state`] call,
//! guarded on state and, for resolve and release, on the claimant. When it
//! reports no change the node is re-read to explain why, so the caller gets an
//! outcome rather than a contention error. Events are emitted only after the
//! write landed.

use crate::application::error::{CoordinationError, CoordinationResult};
use crate::domain::events::{TaskEvent, TaskEventType};
use crate::domain::field::{FieldNode, FieldNodeId, NodeState, StateTransition};
use crate::domain::repository::FieldStore;
use crate::infrastructure::event_bus::EventBus;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a claim attempt. Only `Claimed` means the caller now holds the node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed(FieldNode),

    /// Another agent won the race, or the node is no longer open.
    AlreadyClaimed {
        node_id: FieldNodeId,
        state: NodeState,
        claimed_by: Option<String>,
    },

    /// The session already holds `held`; refused without contacting the store.
    SingleGoalViolation { held: FieldNodeId },
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub node_id: FieldNodeId,
    /// The stored artifact. On a repeated resolve this is the first artifact,
    /// not the one passed in.
    pub artifact: serde_json::Value,
    pub newly_resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeAck {
    pub node_id: FieldNodeId,
}

pub struct ClaimService {
    store: Arc<dyn FieldStore>,
    event_bus: Arc<EventBus>,
}

impl ClaimService {
    pub fn new(store: Arc<dyn FieldStore>, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }

    async fn load(&self, node_id: FieldNodeId) -> CoordinationResult<FieldNode> {
        self.store
            .get_node(node_id)
            .await?
            .ok_or(CoordinationError::NotFound(node_id))
    }

    /// Read the node, then apply `transition` conditionally. On success the
    /// returned node is the snapshot with the transition committed, so a
    /// landed write is never reported as a failure by a later read.
    async fn write(
        &self,
        node_id: FieldNodeId,
        transition: &StateTransition,
    ) -> CoordinationResult<Result<FieldNode, FieldNode>> {
        let mut node = self.load(node_id).await?;
        if self.store.transition_state(node_id, transition).await? {
            node.commit(transition);
            return Ok(Ok(node));
        }
        // Nothing landed, so a failed re-read is safe to surface.
        self.load(node_id).await.map(Err)
    }

    fn not_held(node_id: FieldNodeId, agent_id: &str) -> CoordinationError {
        CoordinationError::NotHeld {
            node_id,
            agent_id: agent_id.to_string(),
        }
    }

    pub async fn claim(&self, node_id: FieldNodeId, agent_id: &str) -> CoordinationResult<ClaimOutcome> {
        let transition = StateTransition::Claim {
            agent_id: agent_id.to_string(),
        };

        match self.write(node_id, &transition).await? {
            Ok(node) => {
                info!(node_id = %node_id, agent_id, "Claimed field node");
                metrics::counter!("fieldwork_claims_total", "outcome" => "claimed").increment(1);
                self.event_bus.emit(TaskEvent::for_node(
                    TaskEventType::Claimed,
                    &node,
                    Some(agent_id.to_string()),
                ));
                Ok(ClaimOutcome::Claimed(node))
            }
            Err(current) => {
                debug!(
                    node_id = %node_id,
                    agent_id,
                    state = %current.state,
                    claimed_by = ?current.claimed_by,
                    "Claim lost"
                );
                metrics::counter!("fieldwork_claims_total", "outcome" => "already_claimed").increment(1);
                Ok(ClaimOutcome::AlreadyClaimed {
                    node_id,
                    state: current.state,
                    claimed_by: current.claimed_by,
                })
            }
        }
    }

    /// Resolve a node held by `agent_id`. Repeating the call after success
    /// returns the stored artifact with `newly_resolved = false`.
    pub async fn resolve(
        &self,
        node_id: FieldNodeId,
        agent_id: &str,
        artifact: serde_json::Value,
    ) -> CoordinationResult<Resolution> {
        let transition = StateTransition::Resolve {
            agent_id: agent_id.to_string(),
            artifact: artifact.clone(),
        };

        match self.write(node_id, &transition).await? {
            Ok(node) => {
                info!(node_id = %node_id, agent_id, "Resolved field node");
                self.event_bus.emit(
                    TaskEvent::for_node(TaskEventType::Resolved, &node, Some(agent_id.to_string()))
                        .with_payload(serde_json::json!({ "artifact": artifact })),
                );
                Ok(Resolution {
                    node_id,
                    artifact,
                    newly_resolved: true,
                })
            }
            Err(current) if current.claimed_by.as_deref() != Some(agent_id) && current.state != NodeState::Open => {
                Err(Self::not_held(node_id, agent_id))
            }
            Err(current) if current.state == NodeState::Resolved => {
                debug!(node_id = %node_id, "Node already resolved, returning stored artifact");
                Ok(Resolution {
                    node_id,
                    artifact: current.artifact.unwrap_or(serde_json::Value::Null),
                    newly_resolved: false,
                })
            }
            Err(current) => Err(CoordinationError::InvalidTransition {
                node_id,
                operation: "resolve",
                state: current.state,
            }),
        }
    }

    pub async fn release(&self, node_id: FieldNodeId, agent_id: &str) -> CoordinationResult<NodeAck> {
        let transition = StateTransition::Release {
            agent_id: agent_id.to_string(),
        };

        match self.write(node_id, &transition).await? {
            Ok(node) => {
                info!(node_id = %node_id, agent_id, attempts = node.attempts, "Released field node");
                self.event_bus.emit(
                    TaskEvent::for_node(TaskEventType::Released, &node, Some(agent_id.to_string()))
                        .with_payload(serde_json::json!({ "attempts": node.attempts })),
                );
                Ok(NodeAck { node_id })
            }
            Err(current) if current.state == NodeState::Claimed && current.claimed_by.as_deref() != Some(agent_id) => {
                Err(Self::not_held(node_id, agent_id))
            }
            Err(current) => Err(CoordinationError::InvalidTransition {
                node_id,
                operation: "release",
                state: current.state,
            }),
        }
    }

    /// Signal that the holder wants outside help. The claim is kept.
    pub async fn boost(&self, node_id: FieldNodeId, agent_id: &str, reason: &str) -> CoordinationResult<NodeAck> {
        let node = self.load(node_id).await?;
        if node.state != NodeState::Claimed {
            return Err(CoordinationError::InvalidTransition {
                node_id,
                operation: "boost",
                state: node.state,
            });
        }
        if node.claimed_by.as_deref() != Some(agent_id) {
            return Err(Self::not_held(node_id, agent_id));
        }

        info!(node_id = %node_id, agent_id, reason, "Boosted field node");
        self.event_bus.emit(
            TaskEvent::for_node(TaskEventType::Boosted, &node, Some(agent_id.to_string()))
                .with_payload(serde_json::json!({ "reason": reason })),
        );
        Ok(NodeAck { node_id })
    }
}
