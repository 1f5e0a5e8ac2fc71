// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bundle Matcher
//!
//! Post-commit enrichment: scores every catalog bundle against each freshly
//! deposited node and attaches the best few. Runs outside the deposit
//! transaction, so nothing here can fail a deposit. Each node is matched in
//! isolation; one node's storage error is recorded and its siblings continue.

use crate::domain::bundle::{rank_bundles, ContextBundle, FieldNodeBundle, MatchSubject, MAX_BUNDLES_PER_NODE, MIN_BUNDLE_SCORE};
use crate::domain::config::EnrichmentConfig;
use crate::domain::field::{FieldNode, FieldNodeId};
use crate::domain::repository::{FieldStore, RepositoryError};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of the best-effort enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    /// Attachment rows newly written. Pairs that already existed are not counted.
    pub bundles_attached: usize,
    pub nodes_matched: usize,
    pub failures: Vec<EnrichmentFailure>,
}

impl EnrichmentReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentFailure {
    /// `None` when the catalog itself could not be read.
    pub node_id: Option<FieldNodeId>,
    pub error: String,
}

pub struct BundleMatcher {
    store: Arc<dyn FieldStore>,
    min_score: f64,
    max_per_node: usize,
}

impl BundleMatcher {
    pub fn new(store: Arc<dyn FieldStore>) -> Self {
        Self {
            store,
            min_score: MIN_BUNDLE_SCORE,
            max_per_node: MAX_BUNDLES_PER_NODE,
        }
    }

    pub fn with_config(store: Arc<dyn FieldStore>, config: &EnrichmentConfig) -> Self {
        Self {
            store,
            min_score: config.min_score,
            max_per_node: config.max_bundles_per_node,
        }
    }

    /// Attach bundles to every node in `nodes`. Never returns an error.
    pub async fn enrich(&self, nodes: &[FieldNode], attached_by: &str) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();

        let catalog = match self.store.list_bundles().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Bundle catalog unavailable, skipping enrichment");
                report.failures.push(EnrichmentFailure {
                    node_id: None,
                    error: e.to_string(),
                });
                return report;
            }
        };
        if catalog.is_empty() {
            debug!("Bundle catalog is empty");
            return report;
        }

        for node in nodes {
            match self.enrich_node(node, &catalog, attached_by).await {
                Ok(attached) => {
                    report.nodes_matched += 1;
                    report.bundles_attached += attached;
                }
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Bundle attachment failed");
                    report.failures.push(EnrichmentFailure {
                        node_id: Some(node.id),
                        error: e.to_string(),
                    });
                }
            }
        }

        metrics::counter!("fieldwork_bundles_attached_total").increment(report.bundles_attached as u64);
        report
    }

    async fn enrich_node(
        &self,
        node: &FieldNode,
        catalog: &[ContextBundle],
        attached_by: &str,
    ) -> Result<usize, RepositoryError> {
        let subject = MatchSubject::new(&node.title, &node.content.description, &node.affinity);
        let ranked = rank_bundles(&subject, catalog, self.min_score, self.max_per_node);

        let mut attached = 0;
        for scored in ranked {
            let row = FieldNodeBundle {
                node_id: node.id,
                bundle_id: scored.bundle.id,
                match_score: scored.score,
                attached_by: attached_by.to_string(),
                attached_at: Utc::now(),
            };
            if self.store.attach_bundle(&row).await? {
                debug!(node_id = %node.id, bundle = %scored.bundle.slug, score = scored.score, "Attached bundle");
                attached += 1;
            }
        }
        Ok(attached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::{NodeContent, NodeType};
    use crate::infrastructure::repositories::InMemoryFieldStore;

    fn catalog() -> Vec<ContextBundle> {
        vec![
            ContextBundle::new("stripe-payments", "payments", vec!["stripe".into(), "checkout".into()], vec!["backend".into()], 5),
            ContextBundle::new("react-forms", "frontend", vec!["form".into()], vec!["frontend".into()], 1),
            ContextBundle::new("unrelated", "hardware", vec!["firmware".into()], vec![], 0),
        ]
    }

    #[tokio::test]
    async fn test_enrich_attaches_matching_bundles_once() {
        let store = Arc::new(InMemoryFieldStore::new().with_bundles(catalog()));
        let goal = FieldNode::new(
            NodeType::Goal,
            "Stripe checkout",
            NodeContent::describe("Take card payments at checkout"),
            0.9,
            vec!["backend".into()],
            None,
        );
        store.insert_node(&goal).await.unwrap();

        let matcher = BundleMatcher::new(store.clone());
        let first = matcher.enrich(std::slice::from_ref(&goal), "test").await;
        assert!(first.is_clean());
        assert!(first.bundles_attached >= 1);

        let attached = store.bundles_for_node(goal.id).await.unwrap();
        assert!(attached.iter().all(|a| a.attached_by == "test"));

        let second = matcher.enrich(std::slice::from_ref(&goal), "test").await;
        assert_eq!(second.bundles_attached, 0);
        assert_eq!(store.attachment_count(), first.bundles_attached);
    }

    #[tokio::test]
    async fn test_missing_node_fails_alone() {
        let store = Arc::new(InMemoryFieldStore::new().with_bundles(catalog()));
        let stored = FieldNode::new(NodeType::Goal, "Stripe checkout", NodeContent::default(), 0.9, vec![], None);
        let ghost = FieldNode::new(NodeType::Goal, "Stripe refunds", NodeContent::default(), 0.9, vec![], None);
        store.insert_node(&stored).await.unwrap();

        let report = BundleMatcher::new(store.clone())
            .enrich(&[ghost.clone(), stored.clone()], "test")
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node_id, Some(ghost.id));
        assert_eq!(report.nodes_matched, 1);
        assert!(!store.bundles_for_node(stored.id).await.unwrap().is_empty());
    }

    async fn attached_slugs(store: &InMemoryFieldStore, node_id: FieldNodeId, catalog: &[ContextBundle]) -> Vec<String> {
        store
            .bundles_for_node(node_id)
            .await
            .unwrap()
            .iter()
            .map(|a| {
                catalog
                    .iter()
                    .find(|b| b.id == a.bundle_id)
                    .map(|b| b.slug.clone())
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_tied_scores_rank_the_same_every_run() {
        // Four bundles tie at 3.0, two sit just above, one just below.
        let tied = vec![
            ContextBundle::new("delta-ui", "frontend", vec![], vec![], 1),
            ContextBundle::new("beta-pay", "payments", vec![], vec![], 1),
            ContextBundle::new("zeta-ops", "devops", vec!["checkout".into()], vec![], 9),
            ContextBundle::new("gamma-pay", "payments", vec![], vec![], 2),
            ContextBundle::new("eta-ops", "devops", vec!["page".into()], vec!["backend".into()], 0),
            ContextBundle::new("alpha-pay", "payments", vec![], vec![], 1),
            ContextBundle::new("epsilon-ui", "frontend", vec![], vec!["backend".into()], 0),
        ];
        let expected = vec!["epsilon-ui", "eta-ops", "gamma-pay", "alpha-pay"];

        let mut reversed = tied.clone();
        reversed.reverse();

        for catalog in [tied.clone(), reversed] {
            let store = Arc::new(InMemoryFieldStore::new().with_bundles(catalog));
            let node = FieldNode::new(
                NodeType::Task,
                "Build checkout page",
                NodeContent::default(),
                0.8,
                vec!["backend".into()],
                None,
            );
            store.insert_node(&node).await.unwrap();
            let matcher = BundleMatcher::new(store.clone());

            let first = matcher.enrich(std::slice::from_ref(&node), "test").await;
            assert_eq!(first.bundles_attached, MAX_BUNDLES_PER_NODE);
            let first_slugs = attached_slugs(&store, node.id, &tied).await;
            assert_eq!(first_slugs, expected);

            let second = matcher.enrich(std::slice::from_ref(&node), "test").await;
            assert!(second.is_clean());
            assert_eq!(second.bundles_attached, 0);
            assert_eq!(attached_slugs(&store, node.id, &tied).await, first_slugs);
        }
    }
}
