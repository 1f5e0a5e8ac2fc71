// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Sessions
//!
//! A worker session is one agent working one node: sense, claim, execute,
//! resolve. The session value is owned by whoever drives the agent and is
//! passed by `&mut` into every coordinator call, so any number of sessions can
//! run in one process without sharing state.
//!
//! # Invariants
//!
//! - A session claims at most once in its lifetime. Any later claim attempt
//!   is refused locally, before the store is contacted, even after a release.
//! - A session is complete once its claim is resolved or released. A complete
//!   session senses no more work.

use crate::domain::field::FieldNodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSession {
    pub session_id: SessionId,
    pub agent_id: String,
    pub affinities: Vec<String>,
    claimed_node_id: Option<FieldNodeId>,
    first_claim: Option<FieldNodeId>,
    has_resolved: bool,
}

impl WorkerSession {
    pub fn new(agent_id: impl Into<String>, affinities: Vec<String>) -> Self {
        Self {
            session_id: SessionId::new(),
            agent_id: agent_id.into(),
            affinities,
            claimed_node_id: None,
            first_claim: None,
            has_resolved: false,
        }
    }

    /// A session for an agent that already holds `node_id` in the store.
    pub(crate) fn holding(agent_id: impl Into<String>, affinities: Vec<String>, node_id: FieldNodeId) -> Self {
        let mut session = Self::new(agent_id, affinities);
        session.record_claim(node_id);
        session
    }

    /// A spent session whose claim on `node_id` was already resolved.
    pub(crate) fn resolved(agent_id: impl Into<String>, affinities: Vec<String>, node_id: FieldNodeId) -> Self {
        let mut session = Self::holding(agent_id, affinities, node_id);
        session.record_resolve(node_id);
        session
    }

    pub fn claimed_node_id(&self) -> Option<FieldNodeId> {
        self.claimed_node_id
    }

    /// The node this session claimed, whether or not it still holds it.
    pub fn first_claim(&self) -> Option<FieldNodeId> {
        self.first_claim
    }

    pub fn has_resolved(&self) -> bool {
        self.has_resolved
    }

    pub fn is_complete(&self) -> bool {
        self.has_resolved || (self.first_claim.is_some() && self.claimed_node_id.is_none())
    }

    pub fn holds(&self, node_id: FieldNodeId) -> bool {
        self.claimed_node_id == Some(node_id)
    }

    pub(crate) fn record_claim(&mut self, node_id: FieldNodeId) {
        self.claimed_node_id = Some(node_id);
        self.first_claim.get_or_insert(node_id);
    }

    /// Resolving the held node completes the session and drops the pointer.
    pub(crate) fn record_resolve(&mut self, node_id: FieldNodeId) {
        if self.holds(node_id) {
            self.claimed_node_id = None;
            self.has_resolved = true;
        }
    }

    /// Releasing the held node ends the session without a resolution.
    pub(crate) fn record_release(&mut self, node_id: FieldNodeId) {
        if self.holds(node_id) {
            self.claimed_node_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_completes_only_the_held_node() {
        let mut session = WorkerSession::new("agent-1", vec!["backend".into()]);
        let held = FieldNodeId::new();
        session.record_claim(held);

        session.record_resolve(FieldNodeId::new());
        assert!(!session.is_complete());
        assert!(session.holds(held));

        session.record_resolve(held);
        assert!(session.is_complete());
        assert_eq!(session.claimed_node_id(), None);
    }

    #[test]
    fn release_spends_the_session() {
        let mut session = WorkerSession::new("agent-1", vec![]);
        let held = FieldNodeId::new();
        assert!(!session.is_complete());

        session.record_claim(held);
        session.record_release(held);
        assert_eq!(session.claimed_node_id(), None);
        assert_eq!(session.first_claim(), Some(held));
        assert!(!session.has_resolved());
        assert!(session.is_complete());
    }

    #[test]
    fn resolved_session_remembers_its_node() {
        let node = FieldNodeId::new();
        let session = WorkerSession::resolved("agent-1", vec![], node);
        assert!(session.has_resolved());
        assert_eq!(session.first_claim(), Some(node));
        assert!(!session.holds(node));
    }
}
