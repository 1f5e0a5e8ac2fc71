// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::field::{FieldNode, FieldNodeId, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventType {
    Deposited,
    Claimed,
    Resolved,
    Released,
    Boosted,
}

impl TaskEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventType::Deposited => "DEPOSITED",
            TaskEventType::Claimed => "CLAIMED",
            TaskEventType::Resolved => "RESOLVED",
            TaskEventType::Released => "RELEASED",
            TaskEventType::Boosted => "BOOSTED",
        }
    }
}

impl fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskEventType {
    type Err = crate::domain::field::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSITED" => Ok(TaskEventType::Deposited),
            "CLAIMED" => Ok(TaskEventType::Claimed),
            "RESOLVED" => Ok(TaskEventType::Resolved),
            "RELEASED" => Ok(TaskEventType::Released),
            "BOOSTED" => Ok(TaskEventType::Boosted),
            other => Err(crate::domain::field::UnknownVariant {
                kind: "event type",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable fact emitted after a lifecycle transition has been written.
///
/// Events sit outside the transactional boundary of the operation that
/// produced them: losing one never undoes the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: TaskEventType,
    pub timestamp: DateTime<Utc>,
    pub node_id: FieldNodeId,
    pub node_type: NodeType,
    pub title: String,
    pub agent_id: Option<String>,
    pub payload: serde_json::Value,
}

impl TaskEvent {
    pub fn for_node(event_type: TaskEventType, node: &FieldNode, agent_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            node_id: node.id,
            node_type: node.node_type,
            title: node.title.clone(),
            agent_id,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
