// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Deposit Trees
//!
//! The input shape of a deposit: one goal, an ordered list of specs, each with
//! an ordered list of tasks. A request is validated as a whole and turned into
//! concrete [`FieldNode`] rows (ids generated up front) before anything is
//! written, so a malformed tree never leaves partial state behind.

use crate::domain::field::{FieldNode, FieldNodeId, NodeContent, NodeType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub affinities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub affinities: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<TaskDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub affinities: Vec<String>,
    #[serde(default)]
    pub potential: Option<f64>,
    #[serde(default)]
    pub sequence_order: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, affinities: Vec<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            affinities,
            potential: None,
            sequence_order: None,
            acceptance_criteria: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub goal: GoalDraft,
    pub specs: Vec<SpecDraft>,
    /// Agent or operator recording the deposit, kept in node metadata.
    #[serde(default)]
    pub deposited_by: Option<String>,
    /// Source document the plan came from, kept in node metadata.
    #[serde(default)]
    pub source: Option<String>,
}

/// Validation failure for a deposit request, naming the offending path
/// (`specs[1].tasks[0].title`).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {reason}")]
pub struct TreeValidationError {
    pub path: String,
    pub reason: String,
}

impl TreeValidationError {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Rows ready for a single all-or-nothing insert.
///
/// `nodes` is ordered parents-first: the goal, then each spec followed by its
/// tasks.
#[derive(Debug, Clone)]
pub struct DepositPlan {
    pub goal_id: FieldNodeId,
    pub specs: Vec<PlannedSpec>,
    pub nodes: Vec<FieldNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSpec {
    pub id: FieldNodeId,
    pub title: String,
    pub task_ids: Vec<FieldNodeId>,
}

impl DepositPlan {
    pub fn total_specs(&self) -> usize {
        self.specs.len()
    }

    pub fn total_tasks(&self) -> usize {
        self.specs.iter().map(|s| s.task_ids.len()).sum()
    }
}

impl DepositRequest {
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        if self.goal.title.trim().is_empty() {
            return Err(TreeValidationError::new("goal.title", "must not be empty"));
        }
        if self.specs.is_empty() {
            return Err(TreeValidationError::new("specs", "a goal needs at least one spec"));
        }
        for (si, spec) in self.specs.iter().enumerate() {
            if spec.title.trim().is_empty() {
                return Err(TreeValidationError::new(format!("specs[{}].title", si), "must not be empty"));
            }
            let mut orders = HashSet::new();
            for (ti, task) in spec.tasks.iter().enumerate() {
                let path = format!("specs[{}].tasks[{}]", si, ti);
                if task.title.trim().is_empty() {
                    return Err(TreeValidationError::new(format!("{}.title", path), "must not be empty"));
                }
                if let Some(p) = task.potential {
                    if !(0.0..=1.0).contains(&p) {
                        return Err(TreeValidationError::new(
                            format!("{}.potential", path),
                            format!("must be within [0, 1], got {}", p),
                        ));
                    }
                }
                if let Some(order) = task.sequence_order {
                    if !orders.insert(order) {
                        return Err(TreeValidationError::new(
                            format!("{}.sequence_order", path),
                            format!("duplicate sequence_order {} within spec", order),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate and expand into concrete rows.
    pub fn plan(&self) -> Result<DepositPlan, TreeValidationError> {
        self.validate()?;

        let metadata = serde_json::json!({
            "source": self.source,
            "deposited_by": self.deposited_by,
            "deposited_at": Utc::now().to_rfc3339(),
        });

        let goal = FieldNode::new(
            NodeType::Goal,
            self.goal.title.trim(),
            NodeContent::describe(self.goal.description.clone()),
            NodeType::Goal.default_potential(),
            self.goal.affinities.clone(),
            None,
        )
        .with_metadata(metadata.clone());
        let goal_id = goal.id;

        let mut nodes = vec![goal];
        let mut specs = Vec::with_capacity(self.specs.len());

        for spec_draft in &self.specs {
            let spec = FieldNode::new(
                NodeType::Spec,
                spec_draft.title.trim(),
                NodeContent::describe(spec_draft.description.clone()),
                NodeType::Spec.default_potential(),
                spec_draft.affinities.clone(),
                Some(goal_id),
            )
            .with_metadata(metadata.clone());
            let spec_id = spec.id;
            nodes.push(spec);

            let mut task_ids = Vec::with_capacity(spec_draft.tasks.len());
            for task_draft in &spec_draft.tasks {
                let task = FieldNode::new(
                    NodeType::Task,
                    task_draft.title.trim(),
                    NodeContent {
                        description: task_draft.description.clone(),
                        acceptance_criteria: task_draft.acceptance_criteria.clone(),
                    },
                    task_draft.potential.unwrap_or_else(|| NodeType::Task.default_potential()),
                    task_draft.affinities.clone(),
                    Some(spec_id),
                )
                .with_sequence_order(task_draft.sequence_order)
                .with_metadata(metadata.clone());
                task_ids.push(task.id);
                nodes.push(task);
            }

            specs.push(PlannedSpec {
                id: spec_id,
                title: spec_draft.title.trim().to_string(),
                task_ids,
            });
        }

        Ok(DepositPlan { goal_id, specs, nodes })
    }
}
