// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresFieldStore** - field nodes, bundle catalog and attachments
//! - **PostgresTaskEventRepository** - lifecycle event audit trail
//!
//! ## In-Memory Repositories
//!
//! - **InMemoryFieldStore** - one write lock around the whole field; every
//!   conditional update and every forest insert happens under it, which gives
//!   the same exactly-once claim and all-or-nothing deposit guarantees as the
//!   database
//! - **InMemoryTaskEventRepository** - append-only event list
//!
//! # Usage
//!
//! ```ignore
//! use fieldwork_core::infrastructure::db::Database;
//! use fieldwork_core::infrastructure::repositories::postgres_field::PostgresFieldStore;
//!
//! let db = Database::new(&database_url).await?;
//! let store = PostgresFieldStore::new(db.get_pool().clone());
//! let node = store.get_node(node_id).await?;
//! ```

pub mod postgres_field;
pub mod postgres_task_event;

use crate::domain::bundle::{ContextBundle, FieldNodeBundle};
use crate::domain::events::{TaskEvent, TaskEventType};
use crate::domain::field::{check_insertable, FieldNode, FieldNodeId, NodeState, NodeType, StateTransition};
use crate::domain::repository::{FieldStore, RepositoryError, TaskEventRepository};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct FieldState {
    /// Insertion order doubles as creation order.
    nodes: Vec<FieldNode>,
    index: HashMap<FieldNodeId, usize>,
    bundles: Vec<ContextBundle>,
    attachments: Vec<FieldNodeBundle>,
}

impl FieldState {
    fn get(&self, id: &FieldNodeId) -> Option<&FieldNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    fn get_mut(&mut self, id: &FieldNodeId) -> Option<&mut FieldNode> {
        match self.index.get(id) {
            Some(&i) => self.nodes.get_mut(i),
            None => None,
        }
    }

    fn push(&mut self, node: FieldNode) {
        self.index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFieldStore {
    state: Arc<RwLock<FieldState>>,
}

impl InMemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the bundle catalog. Bundles are maintained outside the engine;
    /// this stands in for the operator tooling.
    pub fn with_bundles(self, bundles: Vec<ContextBundle>) -> Self {
        self.state.write().bundles.extend(bundles);
        self
    }

    pub fn add_bundle(&self, bundle: ContextBundle) {
        self.state.write().bundles.push(bundle);
    }

    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn attachment_count(&self) -> usize {
        self.state.read().attachments.len()
    }
}

#[async_trait]
impl FieldStore for InMemoryFieldStore {
    async fn insert_node(&self, node: &FieldNode) -> Result<FieldNodeId, RepositoryError> {
        let mut state = self.state.write();
        if state.index.contains_key(&node.id) {
            return Err(RepositoryError::Constraint(format!("duplicate node id {}", node.id)));
        }
        let parent_type = node.parent_id.and_then(|p| state.get(&p)).map(|p| p.node_type);
        check_insertable(node, parent_type).map_err(RepositoryError::Constraint)?;
        state.push(node.clone());
        Ok(node.id)
    }

    async fn insert_forest(&self, nodes: &[FieldNode]) -> Result<(), RepositoryError> {
        let mut state = self.state.write();

        // Validate the whole batch before touching state.
        let mut staged: HashMap<FieldNodeId, NodeType> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if state.index.contains_key(&node.id) || staged.contains_key(&node.id) {
                return Err(RepositoryError::Constraint(format!("duplicate node id {}", node.id)));
            }
            let parent_type = node.parent_id.and_then(|p| {
                staged
                    .get(&p)
                    .copied()
                    .or_else(|| state.get(&p).map(|n| n.node_type))
            });
            check_insertable(node, parent_type).map_err(RepositoryError::Constraint)?;
            staged.insert(node.id, node.node_type);
        }

        for node in nodes {
            state.push(node.clone());
        }
        Ok(())
    }

    async fn get_node(&self, id: FieldNodeId) -> Result<Option<FieldNode>, RepositoryError> {
        Ok(self.state.read().get(&id).cloned())
    }

    async fn transition_state(
        &self,
        id: FieldNodeId,
        transition: &StateTransition,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write();
        Ok(match state.get_mut(&id) {
            Some(node) => node.apply(transition),
            None => false,
        })
    }

    async fn find_open_candidates(
        &self,
        node_types: &[NodeType],
        affinities: &[String],
    ) -> Result<Vec<FieldNode>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.state == NodeState::Open)
            .filter(|n| node_types.contains(&n.node_type))
            .filter(|n| n.shares_affinity(affinities))
            .cloned()
            .collect())
    }

    async fn find_by_title_keywords(&self, keywords: &[String]) -> Result<Vec<FieldNode>, RepositoryError> {
        let needles: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let state = self.state.read();
        Ok(state
            .nodes
            .iter()
            .filter(|n| matches!(n.state, NodeState::Open | NodeState::Claimed))
            .filter(|n| {
                let title = n.title.to_lowercase();
                needles.iter().any(|k| title.contains(k))
            })
            .cloned()
            .collect())
    }

    async fn children_of(&self, parent_id: FieldNodeId) -> Result<Vec<FieldNode>, RepositoryError> {
        let state = self.state.read();
        let mut children: Vec<FieldNode> = state
            .nodes
            .iter()
            .filter(|n| n.parent_id == Some(parent_id))
            .cloned()
            .collect();
        // Stable: equal keys keep insertion order.
        children.sort_by_key(|n| (n.sequence_order.is_none(), n.sequence_order));
        Ok(children)
    }

    async fn list_bundles(&self) -> Result<Vec<ContextBundle>, RepositoryError> {
        Ok(self.state.read().bundles.clone())
    }

    async fn attach_bundle(&self, attachment: &FieldNodeBundle) -> Result<bool, RepositoryError> {
        let mut state = self.state.write();
        if state.get(&attachment.node_id).is_none() {
            return Err(RepositoryError::Constraint(format!(
                "attachment references missing node {}",
                attachment.node_id
            )));
        }
        if !state.bundles.iter().any(|b| b.id == attachment.bundle_id) {
            return Err(RepositoryError::Constraint(format!(
                "attachment references missing bundle {}",
                attachment.bundle_id
            )));
        }
        let exists = state
            .attachments
            .iter()
            .any(|a| a.node_id == attachment.node_id && a.bundle_id == attachment.bundle_id);
        if exists {
            return Ok(false);
        }
        state.attachments.push(attachment.clone());
        Ok(true)
    }

    async fn bundles_for_node(&self, node_id: FieldNodeId) -> Result<Vec<FieldNodeBundle>, RepositoryError> {
        Ok(self
            .state
            .read()
            .attachments
            .iter()
            .filter(|a| a.node_id == node_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskEventRepository {
    events: Arc<RwLock<Vec<TaskEvent>>>,
}

impl InMemoryTaskEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl TaskEventRepository for InMemoryTaskEventRepository {
    async fn save(&self, event: &TaskEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write();
        // Saving the same event twice is a no-op, as with the table's primary key.
        if !events.iter().any(|e| e.id == event.id) {
            events.push(event.clone());
        }
        Ok(())
    }

    async fn find_by_node(&self, node_id: FieldNodeId) -> Result<Vec<TaskEvent>, RepositoryError> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn find_recent(&self, event_type: Option<TaskEventType>, limit: usize) -> Result<Vec<TaskEvent>, RepositoryError> {
        let events = self.events.read();
        Ok(events
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::ContextBundle;
    use crate::domain::field::NodeContent;
    use chrono::Utc;

    fn goal() -> FieldNode {
        FieldNode::new(NodeType::Goal, "Goal", NodeContent::default(), 0.9, vec![], None)
    }

    fn child(node_type: NodeType, parent: &FieldNode, tags: &[&str]) -> FieldNode {
        FieldNode::new(
            node_type,
            format!("{} under {}", node_type, parent.title),
            NodeContent::default(),
            0.8,
            tags.iter().map(|s| s.to_string()).collect(),
            Some(parent.id),
        )
    }

    #[tokio::test]
    async fn forest_insert_rolls_back_on_duplicate() {
        let store = InMemoryFieldStore::new();
        let existing = goal();
        store.insert_node(&existing).await.unwrap();

        let g = goal();
        let s = child(NodeType::Spec, &g, &[]);
        let mut t = child(NodeType::Task, &s, &["backend"]);
        t.id = existing.id;

        let err = store.insert_forest(&[g.clone(), s.clone(), t]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint(_)));
        assert_eq!(store.node_count(), 1);
        assert!(store.get_node(g.id).await.unwrap().is_none());
        assert!(store.get_node(s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn forest_insert_rejects_wrong_parent_shape() {
        let store = InMemoryFieldStore::new();
        let g = goal();
        let task_under_goal = child(NodeType::Task, &g, &[]);
        assert!(store.insert_forest(&[g, task_under_goal]).await.is_err());
        assert_eq!(store.node_count(), 0);
    }

    #[tokio::test]
    async fn candidates_are_open_typed_and_overlapping() {
        let store = InMemoryFieldStore::new();
        let g = goal();
        let s = child(NodeType::Spec, &g, &["backend"]);
        let t1 = child(NodeType::Task, &s, &["backend"]);
        let t2 = child(NodeType::Task, &s, &["frontend"]);
        let t3 = child(NodeType::Task, &s, &["backend", "qa"]);
        store
            .insert_forest(&[g, s, t1.clone(), t2, t3.clone()])
            .await
            .unwrap();
        store
            .transition_state(t3.id, &StateTransition::Claim { agent_id: "a".into() })
            .await
            .unwrap();

        let found = store
            .find_open_candidates(&[NodeType::Task], &["backend".to_string()])
            .await
            .unwrap();
        assert_eq!(found.iter().map(|n| n.id).collect::<Vec<_>>(), vec![t1.id]);
    }

    #[tokio::test]
    async fn children_follow_sequence_order() {
        let store = InMemoryFieldStore::new();
        let g = goal();
        let s = child(NodeType::Spec, &g, &[]);
        let unordered = child(NodeType::Task, &s, &[]);
        let second = child(NodeType::Task, &s, &[]).with_sequence_order(Some(2));
        let first = child(NodeType::Task, &s, &[]).with_sequence_order(Some(1));
        store
            .insert_forest(&[g, s.clone(), unordered.clone(), second.clone(), first.clone()])
            .await
            .unwrap();

        let ids: Vec<FieldNodeId> = store.children_of(s.id).await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first.id, second.id, unordered.id]);
    }

    #[tokio::test]
    async fn attach_is_insert_or_ignore() {
        let bundle = ContextBundle::new("api-guide", "backend", vec![], vec![], 1);
        let store = InMemoryFieldStore::new().with_bundles(vec![bundle.clone()]);
        let g = goal();
        store.insert_node(&g).await.unwrap();

        let attachment = FieldNodeBundle {
            node_id: g.id,
            bundle_id: bundle.id,
            match_score: 3.0,
            attached_by: "test".into(),
            attached_at: Utc::now(),
        };
        assert!(store.attach_bundle(&attachment).await.unwrap());
        assert!(!store.attach_bundle(&attachment).await.unwrap());
        assert_eq!(store.bundles_for_node(g.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn title_search_is_case_insensitive() {
        let store = InMemoryFieldStore::new();
        let mut g = goal();
        g.title = "Build Checkout Flow".into();
        store.insert_node(&g).await.unwrap();

        let hits = store.find_by_title_keywords(&["checkout".to_string()]).await.unwrap();
        assert_eq!(hits.len(), 1);
        let misses = store.find_by_title_keywords(&["search".to_string()]).await.unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn event_log_dedupes_and_filters() {
        let repo = InMemoryTaskEventRepository::new();
        let g = goal();
        let deposited = TaskEvent::for_node(TaskEventType::Deposited, &g, None);
        let claimed = TaskEvent::for_node(TaskEventType::Claimed, &g, Some("agent-a".into()));

        tokio_test::block_on(repo.save(&deposited)).unwrap();
        tokio_test::block_on(repo.save(&deposited)).unwrap();
        tokio_test::block_on(repo.save(&claimed)).unwrap();
        assert_eq!(repo.len(), 2);

        let history = tokio_test::block_on(repo.find_by_node(g.id)).unwrap();
        assert_eq!(history[0].event_type, TaskEventType::Deposited);
        assert_eq!(history[1].event_type, TaskEventType::Claimed);

        let recent = tokio_test::block_on(repo.find_recent(Some(TaskEventType::Claimed), 10)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].agent_id.as_deref(), Some("agent-a"));
    }
}
