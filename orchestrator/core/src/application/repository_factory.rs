// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory
//!
//! Picks concrete store implementations for the configured
//! [`StorageBackend`]. The domain layer only sees the traits.

use std::sync::Arc;

use crate::domain::repository::{FieldStore, StorageBackend, TaskEventRepository};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::postgres_field::PostgresFieldStore;
use crate::infrastructure::repositories::postgres_task_event::PostgresTaskEventRepository;
use crate::infrastructure::repositories::{InMemoryFieldStore, InMemoryTaskEventRepository};

/// Field store and audit repository for one backend.
#[derive(Clone)]
pub struct Repositories {
    pub field_store: Arc<dyn FieldStore>,
    pub task_events: Arc<dyn TaskEventRepository>,
}

/// Connects to PostgreSQL when the backend asks for it.
pub async fn create_repositories(backend: &StorageBackend) -> anyhow::Result<Repositories> {
    match backend {
        StorageBackend::InMemory => Ok(Repositories {
            field_store: Arc::new(InMemoryFieldStore::new()),
            task_events: Arc::new(InMemoryTaskEventRepository::new()),
        }),
        StorageBackend::PostgreSQL(config) => {
            let db = Database::from_config(config).await?;
            Ok(Repositories {
                field_store: create_field_store(backend, Some(&db)),
                task_events: create_task_event_repository(backend, Some(&db)),
            })
        }
    }
}

/// Creates a FieldStore for the backend. A PostgreSQL backend without a
/// database handle falls back to memory.
pub fn create_field_store(backend: &StorageBackend, db: Option<&Database>) -> Arc<dyn FieldStore> {
    match (backend, db) {
        (StorageBackend::PostgreSQL(_), Some(db)) => Arc::new(PostgresFieldStore::new(db.get_pool().clone())),
        _ => Arc::new(InMemoryFieldStore::new()),
    }
}

/// Creates a TaskEventRepository for the backend, same fallback rule.
pub fn create_task_event_repository(backend: &StorageBackend, db: Option<&Database>) -> Arc<dyn TaskEventRepository> {
    match (backend, db) {
        (StorageBackend::PostgreSQL(_), Some(db)) => {
            Arc::new(PostgresTaskEventRepository::new(db.get_pool().clone()))
        }
        _ => Arc::new(InMemoryTaskEventRepository::new()),
    }
}
