// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::events::{TaskEvent, TaskEventType};
use crate::domain::field::{FieldNodeId, NodeType};
use crate::domain::repository::{RepositoryError, TaskEventRepository};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

pub struct PostgresTaskEventRepository {
    pool: PgPool,
}

impl PostgresTaskEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_event_row(row: &PgRow) -> Result<TaskEvent, RepositoryError> {
    let event_type: String = row.try_get("event_type")?;
    let node_type: String = row.try_get("node_type")?;

    Ok(TaskEvent {
        id: row.try_get("id")?,
        event_type: event_type
            .parse::<TaskEventType>()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
        timestamp: row.try_get("timestamp")?,
        node_id: FieldNodeId(row.try_get("node_id")?),
        node_type: node_type
            .parse::<NodeType>()
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
        title: row.try_get("title")?,
        agent_id: row.try_get("agent_id")?,
        payload: row.try_get("payload")?,
    })
}

#[async_trait]
impl TaskEventRepository for PostgresTaskEventRepository {
    async fn save(&self, event: &TaskEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO task_events (id, event_type, timestamp, node_id, node_type, title, agent_id, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(event.timestamp)
        .bind(event.node_id.0)
        .bind(event.node_type.as_str())
        .bind(&event.title)
        .bind(&event.agent_id)
        .bind(&event.payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_node(&self, node_id: FieldNodeId) -> Result<Vec<TaskEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, timestamp, node_id, node_type, title, agent_id, payload
            FROM task_events
            WHERE node_id = $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(node_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_event_row).collect()
    }

    async fn find_recent(
        &self,
        event_type: Option<TaskEventType>,
        limit: usize,
    ) -> Result<Vec<TaskEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, timestamp, node_id, node_type, title, agent_id, payload
            FROM task_events
            WHERE ($1::TEXT IS NULL OR event_type = $1)
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(event_type.map(|t| t.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_event_row).collect()
    }
}
