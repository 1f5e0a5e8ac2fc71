// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tree Depositor
//!
//! Decomposes a plan into goal → specs → tasks and writes the whole forest in
//! one [`FieldStore::insert_forest`] call.
//!
//! # Flow
//!
//! 1. Validate the request and build every row in memory (ids generated up front)
//! 2. Insert all rows as one unit; any failure leaves the field untouched
//! 3. Emit one `DEPOSITED` event per row
//! 4. Run bundle enrichment and fold its report into the receipt
//!
//! Steps 3 and 4 happen after commit and cannot fail the deposit.

use crate::application::bundle_matcher::{BundleMatcher, EnrichmentReport};
use crate::application::error::CoordinationResult;
use crate::domain::events::{TaskEvent, TaskEventType};
use crate::domain::field::FieldNodeId;
use crate::domain::repository::FieldStore;
use crate::domain::tree::{DepositRequest, PlannedSpec};
use crate::infrastructure::event_bus::EventBus;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_DEPOSITOR: &str = "tree-depositor";

#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub goal_id: FieldNodeId,
    pub specs: Vec<PlannedSpec>,
    pub total_specs: usize,
    pub total_tasks: usize,
    pub bundles_attached: usize,
    pub enrichment: EnrichmentReport,
}

pub struct TreeDepositor {
    store: Arc<dyn FieldStore>,
    event_bus: Arc<EventBus>,
    matcher: BundleMatcher,
}

impl TreeDepositor {
    pub fn new(store: Arc<dyn FieldStore>, event_bus: Arc<EventBus>, matcher: BundleMatcher) -> Self {
        Self {
            store,
            event_bus,
            matcher,
        }
    }

    pub async fn deposit(&self, request: &DepositRequest) -> CoordinationResult<DepositReceipt> {
        let plan = request.plan()?;

        self.store.insert_forest(&plan.nodes).await?;

        let depositor = request
            .deposited_by
            .clone()
            .unwrap_or_else(|| DEFAULT_DEPOSITOR.to_string());
        info!(
            goal_id = %plan.goal_id,
            specs = plan.total_specs(),
            tasks = plan.total_tasks(),
            deposited_by = %depositor,
            "Deposited field tree"
        );
        metrics::counter!("fieldwork_nodes_deposited_total").increment(plan.nodes.len() as u64);

        for node in &plan.nodes {
            self.event_bus.emit(
                TaskEvent::for_node(TaskEventType::Deposited, node, request.deposited_by.clone()).with_payload(
                    serde_json::json!({
                        "goal_id": plan.goal_id,
                        "parent_id": node.parent_id,
                        "source": request.source,
                    }),
                ),
            );
        }

        let enrichment = self.matcher.enrich(&plan.nodes, &depositor).await;

        Ok(DepositReceipt {
            goal_id: plan.goal_id,
            total_specs: plan.total_specs(),
            total_tasks: plan.total_tasks(),
            specs: plan.specs,
            bundles_attached: enrichment.bundles_attached,
            enrichment,
        })
    }
}
