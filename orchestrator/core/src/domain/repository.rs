// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the field, defined in the domain layer and
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Owns | Implementations |
//! |-------|------|----------------|
//! | `FieldStore` | `FieldNode`, `FieldNodeBundle`, reads `ContextBundle` | `InMemoryFieldStore`, `PostgresFieldStore` |
//! | `TaskEventRepository` | `TaskEvent` audit trail | `InMemoryTaskEventRepository`, `PostgresTaskEventRepository` |
//!
//! ## Failure contract
//!
//! Storage errors (connection loss, constraint violations) are returned as
//! [`RepositoryError`] exactly as they happened. No implementation retries or
//! masks a failure.

use async_trait::async_trait;
use crate::domain::bundle::{ContextBundle, FieldNodeBundle};
use crate::domain::events::{TaskEvent, TaskEventType};
use crate::domain::field::{FieldNode, FieldNodeId, NodeType, StateTransition};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// The persistent forest of work nodes plus the bundle catalog and join rows.
#[async_trait]
pub trait FieldStore: Send + Sync {
    /// Insert a single node. Its parent, if any, must already exist.
    async fn insert_node(&self, node: &FieldNode) -> Result<FieldNodeId, RepositoryError>;

    /// Insert many nodes as one unit. Either every row is written or none is.
    /// Rows must be ordered parents-first.
    async fn insert_forest(&self, nodes: &[FieldNode]) -> Result<(), RepositoryError>;

    async fn get_node(&self, id: FieldNodeId) -> Result<Option<FieldNode>, RepositoryError>;

    /// Apply `transition` if and only if the node is currently in the
    /// transition's required state and, for resolve and release, claimed by
    /// the transition's agent. Returns whether a row changed.
    ///
    /// This is the only state-mutation primitive; it must be atomic with
    /// respect to concurrent callers.
    async fn transition_state(
        &self,
        id: FieldNodeId,
        transition: &StateTransition,
    ) -> Result<bool, RepositoryError>;

    /// `open` nodes of the given types sharing at least one affinity tag,
    /// oldest first.
    async fn find_open_candidates(
        &self,
        node_types: &[NodeType],
        affinities: &[String],
    ) -> Result<Vec<FieldNode>, RepositoryError>;

    /// `open` or `claimed` nodes whose title contains any keyword,
    /// case-insensitively, oldest first.
    async fn find_by_title_keywords(&self, keywords: &[String]) -> Result<Vec<FieldNode>, RepositoryError>;

    /// Direct children ordered by `sequence_order` (unordered last), then age.
    async fn children_of(&self, parent_id: FieldNodeId) -> Result<Vec<FieldNode>, RepositoryError>;

    async fn list_bundles(&self) -> Result<Vec<ContextBundle>, RepositoryError>;

    /// Insert-or-ignore on `(node_id, bundle_id)`. Returns `true` when a new
    /// row was written.
    async fn attach_bundle(&self, attachment: &FieldNodeBundle) -> Result<bool, RepositoryError>;

    async fn bundles_for_node(&self, node_id: FieldNodeId) -> Result<Vec<FieldNodeBundle>, RepositoryError>;
}

/// Audit sink for lifecycle events.
#[async_trait]
pub trait TaskEventRepository: Send + Sync {
    async fn save(&self, event: &TaskEvent) -> Result<(), RepositoryError>;

    /// Events for one node, oldest first.
    async fn find_by_node(&self, node_id: FieldNodeId) -> Result<Vec<TaskEvent>, RepositoryError>;

    /// Most recent events of one type, newest first.
    async fn find_recent(&self, event_type: Option<TaskEventType>, limit: usize) -> Result<Vec<TaskEvent>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.constraint().is_some() => {
                RepositoryError::Constraint(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
