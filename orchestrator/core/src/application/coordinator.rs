// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Field Coordinator
//!
//! The operation surface agents and the CLI call. Every session-scoped
//! operation takes the caller's [`WorkerSession`] explicitly, so any number of
//! sessions can share one coordinator without sharing state.
//!
//! | Operation | Session guard | Store access |
//! |-----------|---------------|--------------|
//! | `sense` | complete sessions get an empty result | read |
//! | `claim` | any claim after the first is refused locally | conditional write |
//! | `resolve` | session must hold the node, or have resolved it | conditional write |
//! | `release` | session must hold the node; spends the session | conditional write |
//! | `boost` | session must hold the node | read |
//! | `resume` | rebuilds a session from the node's claimant | read |
//! | `deposit_tree` | none | one transaction |

use crate::application::bundle_matcher::BundleMatcher;
use crate::application::claim::{ClaimOutcome, ClaimService, NodeAck, Resolution};
use crate::application::deposit::{DepositReceipt, TreeDepositor};
use crate::application::error::{CoordinationError, CoordinationResult};
use crate::domain::affinity::{self, rank_candidates, AffinitySuggestion, DecayPolicy, ExponentialDecay, RankedNode, SenseQuery};
use crate::domain::bundle::FieldNodeBundle;
use crate::domain::config::{FieldworkConfig, SensingConfig};
use crate::domain::field::{FieldNode, FieldNodeId, NodeState, NodeType};
use crate::domain::repository::FieldStore;
use crate::domain::session::WorkerSession;
use crate::domain::tree::DepositRequest;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SenseResult {
    pub nodes: Vec<RankedNode>,
    pub session_complete: bool,
}

/// A live node whose title overlaps a planned one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    pub id: FieldNodeId,
    pub node_type: NodeType,
    pub title: String,
    pub state: NodeState,
    pub claimed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCheck {
    pub found: bool,
    pub nodes: Vec<DuplicateMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A spec and its tasks, ordered for display.
#[derive(Debug, Clone, Serialize)]
pub struct SpecBranch {
    pub spec: FieldNode,
    pub tasks: Vec<FieldNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalTree {
    pub goal: FieldNode,
    pub specs: Vec<SpecBranch>,
}

pub struct FieldCoordinator {
    store: Arc<dyn FieldStore>,
    event_bus: Arc<EventBus>,
    claims: ClaimService,
    depositor: TreeDepositor,
    sensing: SensingConfig,
    decay_policy: Option<Arc<dyn DecayPolicy>>,
}

impl FieldCoordinator {
    pub fn new(store: Arc<dyn FieldStore>, event_bus: Arc<EventBus>) -> Self {
        Self::with_config(store, event_bus, &FieldworkConfig::default())
    }

    pub fn with_config(store: Arc<dyn FieldStore>, event_bus: Arc<EventBus>, config: &FieldworkConfig) -> Self {
        let matcher = BundleMatcher::with_config(store.clone(), &config.spec.enrichment);
        Self {
            claims: ClaimService::new(store.clone(), event_bus.clone()),
            depositor: TreeDepositor::new(store.clone(), event_bus.clone(), matcher),
            store,
            event_bus,
            sensing: config.spec.sensing.clone(),
            decay_policy: None,
        }
    }

    /// Use a fixed decay policy instead of `ExponentialDecay` at the query's rate.
    pub fn with_decay_policy(mut self, policy: Arc<dyn DecayPolicy>) -> Self {
        self.decay_policy = Some(policy);
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// A query for the session's own affinities with the configured defaults.
    pub fn default_query(&self, session: &WorkerSession) -> SenseQuery {
        SenseQuery::new(session.affinities.clone())
            .threshold(self.sensing.threshold)
            .decay(self.sensing.decay)
            .limit(self.sensing.limit)
    }

    /// Rank open work for the session. An empty `query.affinities` falls back
    /// to the session's affinities.
    pub async fn sense(&self, session: &WorkerSession, query: SenseQuery) -> CoordinationResult<SenseResult> {
        if session.is_complete() {
            debug!(agent_id = %session.agent_id, "Session complete, sensing nothing");
            return Ok(SenseResult {
                nodes: Vec::new(),
                session_complete: true,
            });
        }

        let mut query = query;
        if query.affinities.is_empty() {
            query.affinities = session.affinities.clone();
        }
        query.validate().map_err(CoordinationError::Validation)?;

        let (tags, types) = query.normalized();
        let candidates = self.store.find_open_candidates(&types, &tags).await?;
        let candidate_count = candidates.len();

        let exponential;
        let policy: &dyn DecayPolicy = match &self.decay_policy {
            Some(policy) => policy.as_ref(),
            None => {
                exponential = ExponentialDecay::new(query.decay);
                &exponential
            }
        };
        let nodes = rank_candidates(candidates, &query, policy, Utc::now());

        debug!(
            agent_id = %session.agent_id,
            candidates = candidate_count,
            returned = nodes.len(),
            threshold = query.threshold,
            "Sensed field"
        );
        Ok(SenseResult {
            nodes,
            session_complete: false,
        })
    }

    pub async fn claim(&self, session: &mut WorkerSession, node_id: FieldNodeId) -> CoordinationResult<ClaimOutcome> {
        if let Some(held) = session.first_claim() {
            warn!(
                agent_id = %session.agent_id,
                held = %held,
                requested = %node_id,
                "Single-goal violation: session has already claimed"
            );
            metrics::counter!("fieldwork_claims_total", "outcome" => "single_goal_violation").increment(1);
            return Ok(ClaimOutcome::SingleGoalViolation { held });
        }

        let outcome = self.claims.claim(node_id, &session.agent_id).await?;
        if outcome.is_claimed() {
            session.record_claim(node_id);
        }
        Ok(outcome)
    }

    fn require_held(session: &WorkerSession, node_id: FieldNodeId) -> CoordinationResult<()> {
        if session.holds(node_id) {
            return Ok(());
        }
        warn!(agent_id = %session.agent_id, node_id = %node_id, "Session does not hold node");
        Err(CoordinationError::NotHeld {
            node_id,
            agent_id: session.agent_id.clone(),
        })
    }

    /// Resolve the held node. A session that already resolved `node_id` may
    /// repeat the call and gets the stored artifact back.
    pub async fn resolve(
        &self,
        session: &mut WorkerSession,
        node_id: FieldNodeId,
        artifact: serde_json::Value,
    ) -> CoordinationResult<Resolution> {
        let retry = session.has_resolved() && session.first_claim() == Some(node_id);
        if !retry {
            Self::require_held(session, node_id)?;
        }
        let resolution = self.claims.resolve(node_id, &session.agent_id, artifact).await?;
        session.record_resolve(node_id);
        Ok(resolution)
    }

    pub async fn release(&self, session: &mut WorkerSession, node_id: FieldNodeId) -> CoordinationResult<NodeAck> {
        Self::require_held(session, node_id)?;
        let ack = self.claims.release(node_id, &session.agent_id).await?;
        session.record_release(node_id);
        Ok(ack)
    }

    pub async fn boost(&self, session: &WorkerSession, node_id: FieldNodeId, reason: &str) -> CoordinationResult<NodeAck> {
        Self::require_held(session, node_id)?;
        self.claims.boost(node_id, &session.agent_id, reason).await
    }

    /// Rebuild the session of an agent that claimed `node_id` in an earlier
    /// process. The node must be claimed or resolved by `agent_id`.
    pub async fn resume(
        &self,
        agent_id: &str,
        affinities: Vec<String>,
        node_id: FieldNodeId,
    ) -> CoordinationResult<WorkerSession> {
        let node = self.node(node_id).await?;
        if node.claimed_by.as_deref() != Some(agent_id) {
            return Err(CoordinationError::NotHeld {
                node_id,
                agent_id: agent_id.to_string(),
            });
        }
        match node.state {
            NodeState::Claimed => Ok(WorkerSession::holding(agent_id, affinities, node_id)),
            NodeState::Resolved => Ok(WorkerSession::resolved(agent_id, affinities, node_id)),
            _ => Err(CoordinationError::NotHeld {
                node_id,
                agent_id: agent_id.to_string(),
            }),
        }
    }

    pub async fn deposit_tree(&self, request: &DepositRequest) -> CoordinationResult<DepositReceipt> {
        self.depositor.deposit(request).await
    }

    pub fn suggest_affinities(&self, title: &str, description: &str) -> AffinitySuggestion {
        affinity::suggest_affinities(title, description)
    }

    /// Look for live nodes whose titles contain any of `keywords`, to catch a
    /// plan that is already in the field before depositing it again.
    pub async fn check_duplicates(&self, keywords: &[String]) -> CoordinationResult<DuplicateCheck> {
        if keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(CoordinationError::Validation(
                "at least one non-empty keyword is required".to_string(),
            ));
        }

        let nodes: Vec<DuplicateMatch> = self
            .store
            .find_by_title_keywords(keywords)
            .await?
            .into_iter()
            .map(|n| DuplicateMatch {
                id: n.id,
                node_type: n.node_type,
                title: n.title,
                state: n.state,
                claimed_by: n.claimed_by,
            })
            .collect();

        let warning = (!nodes.is_empty()).then(|| {
            format!(
                "{} open or claimed node(s) already match; extend or claim them instead of depositing a duplicate",
                nodes.len()
            )
        });
        Ok(DuplicateCheck {
            found: !nodes.is_empty(),
            nodes,
            warning,
        })
    }

    pub async fn node(&self, node_id: FieldNodeId) -> CoordinationResult<FieldNode> {
        self.store
            .get_node(node_id)
            .await?
            .ok_or(CoordinationError::NotFound(node_id))
    }

    pub async fn node_bundles(&self, node_id: FieldNodeId) -> CoordinationResult<Vec<FieldNodeBundle>> {
        Ok(self.store.bundles_for_node(node_id).await?)
    }

    pub async fn tree(&self, goal_id: FieldNodeId) -> CoordinationResult<GoalTree> {
        let goal = self.node(goal_id).await?;
        if goal.node_type != NodeType::Goal {
            return Err(CoordinationError::Validation(format!(
                "{} is a {}, not a goal",
                goal_id, goal.node_type
            )));
        }

        let mut specs = Vec::new();
        for spec in self.store.children_of(goal_id).await? {
            let tasks = self.store.children_of(spec.id).await?;
            specs.push(SpecBranch { spec, tasks });
        }
        Ok(GoalTree { goal, specs })
    }
}
