// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL implementation of FieldStore
//!
//! Tables: `field_nodes`, `context_bundles`, `field_node_bundles` (see
//! `cli/migrations`). State transitions are single conditional `UPDATE`s whose
//! affected-row count decides the outcome; forest inserts run in one
//! transaction that rolls back when dropped uncommitted.

use crate::domain::bundle::{BundleId, ContextBundle, FieldNodeBundle};
use crate::domain::field::{check_insertable, FieldNode, FieldNodeId, NodeContent, NodeState, NodeType, StateTransition};
use crate::domain::repository::{FieldStore, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

const NODE_COLUMNS: &str = "id, node_type, title, content, potential, affinity, state, parent_id, \
     sequence_order, claimed_by, artifact, attempts, metadata, created_at, updated_at";

pub struct PostgresFieldStore {
    pool: PgPool,
}

impl PostgresFieldStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_in_tx(tx: &mut Transaction<'_, Postgres>, node: &FieldNode) -> Result<(), RepositoryError> {
        let content = serde_json::to_value(&node.content)?;
        sqlx::query(
            r#"
            INSERT INTO field_nodes (
                id, node_type, title, content, potential, affinity, state, parent_id,
                sequence_order, claimed_by, artifact, attempts, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(node.id.0)
        .bind(node.node_type.as_str())
        .bind(&node.title)
        .bind(content)
        .bind(node.potential)
        .bind(&node.affinity)
        .bind(node.state.as_str())
        .bind(node.parent_id.map(|p| p.0))
        .bind(node.sequence_order)
        .bind(&node.claimed_by)
        .bind(&node.artifact)
        .bind(node.attempts as i32)
        .bind(&node.metadata)
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn node_type_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: FieldNodeId,
    ) -> Result<Option<NodeType>, RepositoryError> {
        let row = sqlx::query("SELECT node_type FROM field_nodes WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("node_type")?;
                Ok(Some(parse_enum(&raw)?))
            }
            None => Ok(None),
        }
    }
}

fn parse_enum<T>(raw: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Escape LIKE metacharacters and wrap for a substring match.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn parse_node_row(row: &PgRow) -> Result<FieldNode, RepositoryError> {
    let node_type: String = row.try_get("node_type")?;
    let state: String = row.try_get("state")?;
    let content: serde_json::Value = row.try_get("content")?;
    let parent_id: Option<Uuid> = row.try_get("parent_id")?;
    let attempts: i32 = row.try_get("attempts")?;

    Ok(FieldNode {
        id: FieldNodeId(row.try_get("id")?),
        node_type: parse_enum(&node_type)?,
        title: row.try_get("title")?,
        content: serde_json::from_value::<NodeContent>(content)?,
        potential: row.try_get("potential")?,
        affinity: row.try_get("affinity")?,
        state: parse_enum::<NodeState>(&state)?,
        parent_id: parent_id.map(FieldNodeId),
        sequence_order: row.try_get("sequence_order")?,
        claimed_by: row.try_get("claimed_by")?,
        artifact: row.try_get("artifact")?,
        attempts: attempts.max(0) as u32,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn parse_nodes(rows: Vec<PgRow>) -> Result<Vec<FieldNode>, RepositoryError> {
    rows.iter().map(parse_node_row).collect()
}

fn parse_attachment_row(row: &PgRow) -> Result<FieldNodeBundle, RepositoryError> {
    Ok(FieldNodeBundle {
        node_id: FieldNodeId(row.try_get("node_id")?),
        bundle_id: BundleId(row.try_get("bundle_id")?),
        match_score: row.try_get("match_score")?,
        attached_by: row.try_get("attached_by")?,
        attached_at: row.try_get("attached_at")?,
    })
}

#[async_trait]
impl FieldStore for PostgresFieldStore {
    async fn insert_node(&self, node: &FieldNode) -> Result<FieldNodeId, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let parent_type = match node.parent_id {
            Some(parent_id) => Self::node_type_in_tx(&mut tx, parent_id).await?,
            None => None,
        };
        check_insertable(node, parent_type).map_err(RepositoryError::Constraint)?;
        Self::insert_in_tx(&mut tx, node).await?;
        tx.commit().await?;
        Ok(node.id)
    }

    async fn insert_forest(&self, nodes: &[FieldNode]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut staged: HashMap<FieldNodeId, NodeType> = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let parent_type = match node.parent_id {
                Some(parent_id) => match staged.get(&parent_id) {
                    Some(t) => Some(*t),
                    None => Self::node_type_in_tx(&mut tx, parent_id).await?,
                },
                None => None,
            };
            // An early return drops `tx`, which rolls the whole forest back.
            check_insertable(node, parent_type).map_err(RepositoryError::Constraint)?;
            Self::insert_in_tx(&mut tx, node).await?;
            staged.insert(node.id, node.node_type);
        }

        tx.commit().await?;
        debug!(rows = nodes.len(), "Committed field forest");
        Ok(())
    }

    async fn get_node(&self, id: FieldNodeId) -> Result<Option<FieldNode>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM field_nodes WHERE id = $1", NODE_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_node_row).transpose()
    }

    async fn transition_state(
        &self,
        id: FieldNodeId,
        transition: &StateTransition,
    ) -> Result<bool, RepositoryError> {
        let result = match transition {
            StateTransition::Claim { agent_id } => {
                sqlx::query(
                    r#"
                    UPDATE field_nodes
                    SET state = 'claimed', claimed_by = $2, updated_at = NOW()
                    WHERE id = $1 AND state = 'open'
                    "#,
                )
                .bind(id.0)
                .bind(agent_id)
                .execute(&self.pool)
                .await?
            }
            StateTransition::Resolve { agent_id, artifact } => {
                sqlx::query(
                    r#"
                    UPDATE field_nodes
                    SET state = 'resolved', artifact = $2, updated_at = NOW()
                    WHERE id = $1 AND state = 'claimed' AND claimed_by = $3
                    "#,
                )
                .bind(id.0)
                .bind(artifact)
                .bind(agent_id)
                .execute(&self.pool)
                .await?
            }
            StateTransition::Release { agent_id } => {
                sqlx::query(
                    r#"
                    UPDATE field_nodes
                    SET state = 'open', claimed_by = NULL, attempts = attempts + 1, updated_at = NOW()
                    WHERE id = $1 AND state = 'claimed' AND claimed_by = $2
                    "#,
                )
                .bind(id.0)
                .bind(agent_id)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    async fn find_open_candidates(
        &self,
        node_types: &[NodeType],
        affinities: &[String],
    ) -> Result<Vec<FieldNode>, RepositoryError> {
        let types: Vec<&str> = node_types.iter().map(|t| t.as_str()).collect();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM field_nodes
            WHERE state = 'open'
              AND node_type = ANY($1)
              AND affinity && $2
            ORDER BY created_at ASC, id ASC
            "#,
            NODE_COLUMNS
        ))
        .bind(&types)
        .bind(affinities)
        .fetch_all(&self.pool)
        .await?;
        parse_nodes(rows)
    }

    async fn find_by_title_keywords(&self, keywords: &[String]) -> Result<Vec<FieldNode>, RepositoryError> {
        let patterns: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(like_pattern)
            .collect();
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM field_nodes
            WHERE state IN ('open', 'claimed')
              AND title ILIKE ANY($1)
            ORDER BY created_at ASC
            "#,
            NODE_COLUMNS
        ))
        .bind(&patterns)
        .fetch_all(&self.pool)
        .await?;
        parse_nodes(rows)
    }

    async fn children_of(&self, parent_id: FieldNodeId) -> Result<Vec<FieldNode>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM field_nodes
            WHERE parent_id = $1
            ORDER BY sequence_order ASC NULLS LAST, created_at ASC
            "#,
            NODE_COLUMNS
        ))
        .bind(parent_id.0)
        .fetch_all(&self.pool)
        .await?;
        parse_nodes(rows)
    }

    async fn list_bundles(&self) -> Result<Vec<ContextBundle>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, slug, domain, keywords, affinities, priority
            FROM context_bundles
            ORDER BY slug ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ContextBundle {
                    id: BundleId(row.try_get("id")?),
                    slug: row.try_get("slug")?,
                    domain: row.try_get("domain")?,
                    keywords: row.try_get("keywords")?,
                    affinities: row.try_get("affinities")?,
                    priority: row.try_get("priority")?,
                })
            })
            .collect()
    }

    async fn attach_bundle(&self, attachment: &FieldNodeBundle) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO field_node_bundles (node_id, bundle_id, match_score, attached_by, attached_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (node_id, bundle_id) DO NOTHING
            "#,
        )
        .bind(attachment.node_id.0)
        .bind(attachment.bundle_id.0)
        .bind(attachment.match_score)
        .bind(&attachment.attached_by)
        .bind(attachment.attached_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn bundles_for_node(&self, node_id: FieldNodeId) -> Result<Vec<FieldNodeBundle>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT node_id, bundle_id, match_score, attached_by, attached_at
            FROM field_node_bundles
            WHERE node_id = $1
            ORDER BY match_score DESC, attached_at ASC
            "#,
        )
        .bind(node_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_attachment_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_escape_metacharacters() {
        assert_eq!(like_pattern("checkout"), "%checkout%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
    }
}
