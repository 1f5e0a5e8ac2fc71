// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::field::{FieldNodeId, NodeState};
use crate::domain::repository::RepositoryError;
use crate::domain::tree::TreeValidationError;

/// Errors surfaced by coordination operations.
///
/// Lost claim races and single-goal refusals are not errors; they come back
/// as [`crate::application::claim::ClaimOutcome`] variants.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Rejected before any write.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Field node not found: {0}")]
    NotFound(FieldNodeId),

    #[error("Cannot {operation} node {node_id} in state '{state}'")]
    InvalidTransition {
        node_id: FieldNodeId,
        operation: &'static str,
        state: NodeState,
    },

    /// The caller is not the node's current claimant.
    #[error("Agent '{agent_id}' does not hold node {node_id}")]
    NotHeld { node_id: FieldNodeId, agent_id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<TreeValidationError> for CoordinationError {
    fn from(err: TreeValidationError) -> Self {
        CoordinationError::Validation(err.to_string())
    }
}

pub type CoordinationResult<T> = Result<T, CoordinationError>;
