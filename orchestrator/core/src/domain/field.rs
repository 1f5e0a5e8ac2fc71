// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Field Nodes
//!
//! A field node is one unit of work in the coordination forest. The forest has
//! exactly three levels:
//!
//! | Level | `NodeType` | Parent |
//! |-------|------------|--------|
//! | 1 | `Goal` | none |
//! | 2 | `Spec` | a goal |
//! | 3 | `Task` | a spec |
//!
//! Nodes are created by the tree depositor and then only ever change state
//! through [`StateTransition`], applied by the store as a conditional update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_GOAL_POTENTIAL: f64 = 0.9;
pub const DEFAULT_SPEC_POTENTIAL: f64 = 0.85;
pub const DEFAULT_TASK_POTENTIAL: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldNodeId(pub Uuid);

impl FieldNodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FieldNodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FieldNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FieldNodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Goal,
    Spec,
    Task,
}

impl NodeType {
    pub const ALL: [NodeType; 3] = [NodeType::Goal, NodeType::Spec, NodeType::Task];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Goal => "goal",
            NodeType::Spec => "spec",
            NodeType::Task => "task",
        }
    }

    /// The node type a parent of this node must have.
    pub fn parent_type(&self) -> Option<NodeType> {
        match self {
            NodeType::Goal => None,
            NodeType::Spec => Some(NodeType::Goal),
            NodeType::Task => Some(NodeType::Spec),
        }
    }

    pub fn default_potential(&self) -> f64 {
        match self {
            NodeType::Goal => DEFAULT_GOAL_POTENTIAL,
            NodeType::Spec => DEFAULT_SPEC_POTENTIAL,
            NodeType::Task => DEFAULT_TASK_POTENTIAL,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goal" => Ok(NodeType::Goal),
            "spec" => Ok(NodeType::Spec),
            "task" => Ok(NodeType::Task),
            other => Err(UnknownVariant {
                kind: "node_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a node.
///
/// Only `Open`, `Claimed` and `Resolved` are ever written by the claim
/// protocol. `Released` and `Boosted` are overlay signals: they exist so the
/// schema and the event stream share one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Open,
    Claimed,
    Resolved,
    Released,
    Boosted,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Open => "open",
            NodeState::Claimed => "claimed",
            NodeState::Resolved => "resolved",
            NodeState::Released => "released",
            NodeState::Boosted => "boosted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Resolved)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(NodeState::Open),
            "claimed" => Ok(NodeState::Claimed),
            "resolved" => Ok(NodeState::Resolved),
            "released" => Ok(NodeState::Released),
            "boosted" => Ok(NodeState::Boosted),
            other => Err(UnknownVariant {
                kind: "state",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Structured description of the work a node represents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeContent {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
}

impl NodeContent {
    pub fn describe(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            acceptance_criteria: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    pub id: FieldNodeId,
    pub node_type: NodeType,
    pub title: String,
    pub content: NodeContent,
    pub potential: f64,
    pub affinity: Vec<String>,
    pub state: NodeState,
    pub parent_id: Option<FieldNodeId>,
    pub sequence_order: Option<i32>,
    pub claimed_by: Option<String>,
    pub artifact: Option<serde_json::Value>,
    pub attempts: u32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FieldNode {
    /// Build an `open` node. Affinity tags are trimmed, lowercased and
    /// de-duplicated keeping first-seen order.
    pub fn new(
        node_type: NodeType,
        title: impl Into<String>,
        content: NodeContent,
        potential: f64,
        affinity: Vec<String>,
        parent_id: Option<FieldNodeId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FieldNodeId::new(),
            node_type,
            title: title.into(),
            content,
            potential,
            affinity: normalize_affinities(affinity),
            state: NodeState::Open,
            parent_id,
            sequence_order: None,
            claimed_by: None,
            artifact: None,
            attempts: 0,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sequence_order(mut self, sequence_order: Option<i32>) -> Self {
        self.sequence_order = sequence_order;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Title and description joined, the text every matcher scores against.
    pub fn match_text(&self) -> String {
        format!("{} {}", self.title, self.content.description)
    }

    pub fn shares_affinity(&self, tags: &[String]) -> bool {
        self.affinity.iter().any(|a| tags.iter().any(|t| t == a))
    }

    /// Apply a transition in place if its precondition holds.
    ///
    /// Returns `false` and leaves the node untouched when the current state
    /// does not match, or when resolve/release comes from anyone but the
    /// claimant. This is the in-memory twin of the conditional `UPDATE` the
    /// Postgres store issues.
    pub fn apply(&mut self, transition: &StateTransition) -> bool {
        if self.state != transition.required_state() {
            return false;
        }
        if let Some(agent_id) = transition.required_claimant() {
            if self.claimed_by.as_deref() != Some(agent_id) {
                return false;
            }
        }
        self.commit(transition);
        true
    }

    /// Write the transition's target fields without checking the
    /// precondition. Used to describe a write the store already accepted.
    pub fn commit(&mut self, transition: &StateTransition) {
        match transition {
            StateTransition::Claim { agent_id } => {
                self.state = NodeState::Claimed;
                self.claimed_by = Some(agent_id.clone());
            }
            StateTransition::Resolve { agent_id, artifact } => {
                self.state = NodeState::Resolved;
                self.claimed_by = Some(agent_id.clone());
                self.artifact = Some(artifact.clone());
            }
            StateTransition::Release { .. } => {
                self.state = NodeState::Open;
                self.claimed_by = None;
                self.attempts += 1;
            }
        }
        self.updated_at = Utc::now();
    }
}

/// A state change the store applies atomically, conditional on the node's
/// current state and, for resolve and release, on the claimant.
#[derive(Debug, Clone, PartialEq)]
pub enum StateTransition {
    /// `open -> claimed`, recording the claimant.
    Claim { agent_id: String },
    /// `claimed -> resolved` by the claimant, attaching the artifact.
    Resolve { agent_id: String, artifact: serde_json::Value },
    /// `claimed -> open` by the claimant, clearing it and counting the attempt.
    Release { agent_id: String },
}

impl StateTransition {
    pub fn required_state(&self) -> NodeState {
        match self {
            StateTransition::Claim { .. } => NodeState::Open,
            StateTransition::Resolve { .. } | StateTransition::Release { .. } => NodeState::Claimed,
        }
    }

    /// The agent that must currently hold the node.
    pub fn required_claimant(&self) -> Option<&str> {
        match self {
            StateTransition::Claim { .. } => None,
            StateTransition::Resolve { agent_id, .. } | StateTransition::Release { agent_id } => Some(agent_id),
        }
    }

    pub fn target_state(&self) -> NodeState {
        match self {
            StateTransition::Claim { .. } => NodeState::Claimed,
            StateTransition::Resolve { .. } => NodeState::Resolved,
            StateTransition::Release { .. } => NodeState::Open,
        }
    }
}

/// Check the row-level constraints every store enforces on insert: potential
/// range and the three-level parent shape. `parent_type` is the type of the
/// row named by `parent_id`, or `None` if that row does not exist.
pub fn check_insertable(node: &FieldNode, parent_type: Option<NodeType>) -> Result<(), String> {
    if !(0.0..=1.0).contains(&node.potential) {
        return Err(format!("node {} potential {} outside [0, 1]", node.id, node.potential));
    }
    match (node.node_type.parent_type(), node.parent_id) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(format!("goal {} must not have a parent", node.id)),
        (Some(expected), None) => Err(format!("{} {} requires a {} parent", node.node_type, node.id, expected)),
        (Some(expected), Some(parent_id)) => match parent_type {
            None => Err(format!("parent {} of {} does not exist", parent_id, node.id)),
            Some(actual) if actual != expected => Err(format!(
                "{} {} must be a child of a {}, parent {} is a {}",
                node.node_type, node.id, expected, parent_id, actual
            )),
            Some(_) => Ok(()),
        },
    }
}

pub fn normalize_affinities(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> FieldNode {
        FieldNode::new(
            NodeType::Task,
            "Wire payment webhook",
            NodeContent::describe("Handle provider callbacks"),
            0.8,
            vec!["Implementer".into(), "backend".into(), "implementer".into()],
            Some(FieldNodeId::new()),
        )
    }

    #[test]
    fn affinities_are_normalized() {
        assert_eq!(task().affinity, vec!["implementer", "backend"]);
    }

    #[test]
    fn claim_then_resolve() {
        let mut node = task();
        assert!(node.apply(&StateTransition::Claim { agent_id: "a-1".into() }));
        assert_eq!(node.state, NodeState::Claimed);
        assert_eq!(node.claimed_by.as_deref(), Some("a-1"));

        assert!(node.apply(&StateTransition::Resolve {
            agent_id: "a-1".into(),
            artifact: serde_json::json!({"pr": 42})
        }));
        assert_eq!(node.state, NodeState::Resolved);
        assert!(node.state.is_terminal());
    }

    #[test]
    fn claim_requires_open() {
        let mut node = task();
        assert!(node.apply(&StateTransition::Claim { agent_id: "a-1".into() }));
        assert!(!node.apply(&StateTransition::Claim { agent_id: "a-2".into() }));
        assert_eq!(node.claimed_by.as_deref(), Some("a-1"));
    }

    #[test]
    fn release_reopens_and_counts_attempt() {
        let mut node = task();
        node.apply(&StateTransition::Claim { agent_id: "a-1".into() });
        assert!(node.apply(&StateTransition::Release { agent_id: "a-1".into() }));
        assert_eq!(node.state, NodeState::Open);
        assert_eq!(node.claimed_by, None);
        assert_eq!(node.attempts, 1);
    }

    #[test]
    fn resolved_nodes_reject_every_transition() {
        let mut node = task();
        node.apply(&StateTransition::Claim { agent_id: "a-1".into() });
        node.apply(&StateTransition::Resolve {
            agent_id: "a-1".into(),
            artifact: serde_json::json!("done"),
        });
        assert!(!node.apply(&StateTransition::Release { agent_id: "a-1".into() }));
        assert!(!node.apply(&StateTransition::Claim { agent_id: "a-2".into() }));
        assert!(!node.apply(&StateTransition::Resolve {
            agent_id: "a-1".into(),
            artifact: serde_json::json!("again"),
        }));
        assert_eq!(node.artifact, Some(serde_json::json!("done")));
    }

    #[test]
    fn only_the_claimant_resolves_or_releases() {
        let mut node = task();
        node.apply(&StateTransition::Claim { agent_id: "a-1".into() });

        assert!(!node.apply(&StateTransition::Release { agent_id: "a-2".into() }));
        assert!(!node.apply(&StateTransition::Resolve {
            agent_id: "a-2".into(),
            artifact: serde_json::json!("stolen"),
        }));
        assert_eq!(node.state, NodeState::Claimed);
        assert_eq!(node.claimed_by.as_deref(), Some("a-1"));
        assert_eq!(node.attempts, 0);
        assert_eq!(node.artifact, None);
    }

    #[test]
    fn insert_checks_enforce_three_levels() {
        let node = task();
        assert!(check_insertable(&node, Some(NodeType::Spec)).is_ok());
        assert!(check_insertable(&node, Some(NodeType::Goal)).is_err());
        assert!(check_insertable(&node, None).is_err());

        let goal = FieldNode::new(NodeType::Goal, "g", NodeContent::default(), 0.9, vec![], None);
        assert!(check_insertable(&goal, None).is_ok());

        let mut orphan_spec = FieldNode::new(NodeType::Spec, "s", NodeContent::default(), 0.85, vec![], None);
        assert!(check_insertable(&orphan_spec, None).is_err());
        orphan_spec.parent_id = Some(goal.id);
        orphan_spec.potential = 1.5;
        assert!(check_insertable(&orphan_spec, Some(NodeType::Goal)).is_err());
    }

    #[test]
    fn enum_round_trip_through_strings() {
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
        assert!("epic".parse::<NodeType>().is_err());
        assert_eq!("boosted".parse::<NodeState>().unwrap(), NodeState::Boosted);
    }
}
