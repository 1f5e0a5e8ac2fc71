// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task Event Subscribers
//!
//! The standard subscribers wired by [`SubscriberRegistry::init`]:
//!
//! - [`TaskEventPersister`] writes every event to a `TaskEventRepository` for
//!   the audit trail. `on_event` only enqueues; a background task does the
//!   writing so a slow database never stalls the emitting operation.
//! - [`TracingSubscriber`] logs one structured line per event.
//!
//! [`SubscriberRegistry::init`]: crate::infrastructure::event_bus::SubscriberRegistry::init

use crate::domain::events::TaskEvent;
use crate::domain::repository::TaskEventRepository;
use crate::infrastructure::event_bus::{EventSubscriber, SubscriberError, SubscriberRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct TaskEventPersister {
    sender: mpsc::UnboundedSender<TaskEvent>,
}

impl TaskEventPersister {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    ///
    /// The task exits once every handle to the persister is dropped and the
    /// queue has drained; await the returned handle to flush on shutdown.
    pub fn start(repository: Arc<dyn TaskEventRepository>) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TaskEvent>();
        info!("Starting task event persister background task");

        let handle = tokio::spawn(async move {
            let mut events_processed = 0u64;
            let mut errors_encountered = 0u64;

            while let Some(event) = receiver.recv().await {
                events_processed += 1;
                if events_processed % 100 == 0 {
                    debug!(
                        "Task event persister processed {} events ({} errors)",
                        events_processed, errors_encountered
                    );
                }

                if let Err(e) = repository.save(&event).await {
                    errors_encountered += 1;
                    error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        node_id = %event.node_id,
                        error = %e,
                        "Failed to persist task event"
                    );
                    if errors_encountered % 10 == 0 {
                        warn!("Task event persistence has failed {} times", errors_encountered);
                    }
                }
            }

            info!(
                "Task event persister shut down (processed {} events, {} errors)",
                events_processed, errors_encountered
            );
        });

        (Arc::new(Self { sender }), handle)
    }
}

impl EventSubscriber for TaskEventPersister {
    fn name(&self) -> &str {
        "task-event-persister"
    }

    fn on_event(&self, event: &TaskEvent) -> Result<(), SubscriberError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SubscriberError::ShutDown)
    }
}

#[derive(Debug, Default)]
pub struct TracingSubscriber;

impl EventSubscriber for TracingSubscriber {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_event(&self, event: &TaskEvent) -> Result<(), SubscriberError> {
        info!(
            event_type = %event.event_type,
            node_id = %event.node_id,
            node_type = %event.node_type,
            agent_id = event.agent_id.as_deref().unwrap_or("-"),
            title = %event.title,
            "Task event"
        );
        Ok(())
    }
}

/// Wire the tracing subscriber, plus the persister when `repository` is
/// given, unless the registry is already initialized.
///
/// Returns the persister's writer handle if this call started one.
pub fn init_standard_subscribers(
    registry: &SubscriberRegistry,
    repository: Option<Arc<dyn TaskEventRepository>>,
) -> Option<JoinHandle<()>> {
    let mut writer = None;
    registry.init(|| {
        let mut subscribers: Vec<Arc<dyn EventSubscriber>> = vec![Arc::new(TracingSubscriber)];
        if let Some(repository) = repository {
            let (persister, handle) = TaskEventPersister::start(repository);
            writer = Some(handle);
            subscribers.push(persister);
        }
        subscribers
    });
    writer
}
