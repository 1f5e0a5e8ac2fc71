// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded field context
//!
//! Builds the coordinator in-process from configuration: storage backend,
//! event bus, standard subscribers. Every field command runs through one of
//! these and calls [`EmbeddedField::shutdown`] before exiting so queued audit
//! events are flushed.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fieldwork_core::{
    application::{
        event_persister::init_standard_subscribers, repository_factory::create_repositories, FieldCoordinator,
    },
    domain::{
        config::FieldworkConfig,
        repository::{StorageBackend, TaskEventRepository},
    },
    infrastructure::event_bus::{EventBus, SubscriberRegistry},
};

pub struct EmbeddedField {
    coordinator: Arc<FieldCoordinator>,
    task_events: Arc<dyn TaskEventRepository>,
    registry: SubscriberRegistry,
    persister: Option<JoinHandle<()>>,
}

impl EmbeddedField {
    pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = FieldworkConfig::load_or_default(config_path).context("Failed to load configuration")?;
        config.validate().context("Configuration validation failed")?;
        Self::from_config(&config).await
    }

    pub async fn from_config(config: &FieldworkConfig) -> Result<Self> {
        let backend = config.storage_backend();
        if matches!(backend, StorageBackend::InMemory) {
            warn!("No database configured; field state lives only for this process");
        }

        let repositories = create_repositories(&backend)
            .await
            .context("Failed to initialize storage")?;

        let event_bus = Arc::new(EventBus::new(config.spec.events.channel_capacity));
        let registry = SubscriberRegistry::new(event_bus.clone());
        let audit = config.spec.events.persist.then(|| repositories.task_events.clone());
        let persister = init_standard_subscribers(&registry, audit);

        let coordinator = Arc::new(FieldCoordinator::with_config(
            repositories.field_store,
            event_bus,
            config,
        ));
        info!(config = %config.metadata.name, "Field context ready");

        Ok(Self {
            coordinator,
            task_events: repositories.task_events,
            registry,
            persister,
        })
    }

    pub fn coordinator(&self) -> &Arc<FieldCoordinator> {
        &self.coordinator
    }

    pub fn task_events(&self) -> &Arc<dyn TaskEventRepository> {
        &self.task_events
    }

    /// Unwire subscribers and wait for the audit writer to drain.
    pub async fn shutdown(self) -> Result<()> {
        self.registry.reset();
        drop(self.coordinator);
        if let Some(handle) = self.persister {
            handle.await.context("Task event persister did not shut down cleanly")?;
        }
        Ok(())
    }
}
