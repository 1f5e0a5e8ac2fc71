// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Affinity Matching
//!
//! Pure scoring used on both sides of the field:
//!
//! - **Sensing**: ranks `open` nodes for an agent by *effective potential*,
//!   the node's static potential discounted by a [`DecayPolicy`].
//! - **Suggestion**: proposes affinity tags for a task from its free text
//!   before it is deposited.
//!
//! Nothing here touches storage. Sensing gives no exclusivity guarantee; a
//! ranked node may be claimed by someone else before the caller claims it.

use crate::domain::field::{normalize_affinities, FieldNode, NodeType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_SENSE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SENSE_DECAY: f64 = 0.05;
pub const DEFAULT_SENSE_LIMIT: usize = 10;
pub const GENERIC_AFFINITY: &str = "general";
const SUGGESTION_FANOUT: usize = 3;

/// Discounts a node's stated potential by its age and how many times it has
/// been released. Implementations must be monotonically non-increasing in
/// both `age` and `attempts`, and must never raise a potential.
pub trait DecayPolicy: Send + Sync {
    fn effective_potential(&self, potential: f64, age: chrono::Duration, attempts: u32) -> f64;
}

/// No discount at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecay;

impl DecayPolicy for NoDecay {
    fn effective_potential(&self, potential: f64, _age: chrono::Duration, _attempts: u32) -> f64 {
        potential
    }
}

/// `potential * exp(-rate * (age_days + attempts))`.
///
/// One release weighs the same as one day of waiting.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialDecay {
    pub rate: f64,
}

impl ExponentialDecay {
    pub fn new(rate: f64) -> Self {
        Self { rate: rate.max(0.0) }
    }
}

impl DecayPolicy for ExponentialDecay {
    fn effective_potential(&self, potential: f64, age: chrono::Duration, attempts: u32) -> f64 {
        let age_days = (age.num_seconds().max(0) as f64) / 86_400.0;
        potential * (-self.rate * (age_days + attempts as f64)).exp()
    }
}

/// Parameters of one sense call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenseQuery {
    pub affinities: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Allowed node types; empty means every type.
    #[serde(default)]
    pub node_types: Vec<NodeType>,
    #[serde(default = "default_decay")]
    pub decay: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_threshold() -> f64 {
    DEFAULT_SENSE_THRESHOLD
}

fn default_decay() -> f64 {
    DEFAULT_SENSE_DECAY
}

fn default_limit() -> usize {
    DEFAULT_SENSE_LIMIT
}

impl SenseQuery {
    pub fn new(affinities: Vec<String>) -> Self {
        Self {
            affinities,
            threshold: DEFAULT_SENSE_THRESHOLD,
            node_types: vec![NodeType::Task],
            decay: DEFAULT_SENSE_DECAY,
            limit: DEFAULT_SENSE_LIMIT,
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn node_types(mut self, node_types: Vec<NodeType>) -> Self {
        self.node_types = node_types;
        self
    }

    pub fn decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Normalized tags, with an empty type filter widened to every type.
    pub fn normalized(&self) -> (Vec<String>, Vec<NodeType>) {
        let types = if self.node_types.is_empty() {
            NodeType::ALL.to_vec()
        } else {
            self.node_types.clone()
        };
        (normalize_affinities(self.affinities.clone()), types)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold must be within [0, 1], got {}", self.threshold));
        }
        if !self.decay.is_finite() || self.decay < 0.0 {
            return Err(format!("decay must be a non-negative number, got {}", self.decay));
        }
        if self.limit == 0 {
            return Err("limit must be at least 1".to_string());
        }
        if normalize_affinities(self.affinities.clone()).is_empty() {
            return Err("at least one affinity tag is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    #[serde(flatten)]
    pub node: FieldNode,
    pub effective_potential: f64,
}

/// Rank candidates for a sense call.
///
/// `candidates` must arrive in creation order (oldest first); the sort is
/// stable, so equal effective potentials keep that order and old work is not
/// starved by newer nodes.
pub fn rank_candidates(
    candidates: Vec<FieldNode>,
    query: &SenseQuery,
    policy: &dyn DecayPolicy,
    now: DateTime<Utc>,
) -> Vec<RankedNode> {
    let (tags, types) = query.normalized();
    let mut ranked: Vec<RankedNode> = candidates
        .into_iter()
        .filter(|n| types.contains(&n.node_type) && n.shares_affinity(&tags))
        .map(|node| {
            let age = now.signed_duration_since(node.created_at);
            let effective_potential = policy.effective_potential(node.potential, age, node.attempts);
            RankedNode {
                node,
                effective_potential,
            }
        })
        .filter(|r| r.effective_potential >= query.threshold)
        .collect();

    ranked.sort_by(|a, b| {
        b.effective_potential
            .partial_cmp(&a.effective_potential)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(query.limit);
    ranked
}

/// Compound tag sets and the words that suggest them.
const SUGGESTION_TABLE: &[(&[&str], &[&str])] = &[
    (
        &["implementer", "backend"],
        &["api", "endpoint", "server", "database", "schema", "migration", "queue", "webhook", "service"],
    ),
    (
        &["implementer", "frontend"],
        &["ui", "component", "page", "form", "layout", "css", "screen", "button", "modal"],
    ),
    (
        &["tester", "qa"],
        &["test", "coverage", "regression", "e2e", "fixture", "flaky", "verify"],
    ),
    (
        &["reviewer", "security"],
        &["auth", "permission", "token", "secret", "vulnerability", "audit", "encrypt"],
    ),
    (
        &["devops", "infrastructure"],
        &["deploy", "pipeline", "docker", "kubernetes", "terraform", "monitoring", "ci"],
    ),
    (
        &["implementer", "data"],
        &["analytics", "etl", "report", "warehouse", "metric", "dashboard", "export"],
    ),
    (
        &["writer", "docs"],
        &["document", "readme", "guide", "tutorial", "changelog", "docs"],
    ),
    (
        &["designer", "ux"],
        &["design", "wireframe", "mockup", "accessibility", "copy", "onboarding"],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinitySuggestion {
    pub suggested_affinities: Vec<String>,
}

/// Propose affinity tags for a task from its title and description.
pub fn suggest_affinities(title: &str, description: &str) -> AffinitySuggestion {
    let text = format!("{} {}", title, description).to_lowercase();
    let words: Vec<&str> = text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();

    let mut scored: Vec<(usize, &[&str])> = SUGGESTION_TABLE
        .iter()
        .map(|(tags, keywords)| {
            let hits = keywords
                .iter()
                .filter(|k| if k.len() > 3 { text.contains(*k) } else { words.contains(k) })
                .count();
            (hits, *tags)
        })
        .filter(|(hits, _)| *hits > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let mut merged: Vec<String> = Vec::new();
    for (_, tags) in scored.into_iter().take(SUGGESTION_FANOUT) {
        for tag in tags {
            if !merged.iter().any(|t| t == tag) {
                merged.push(tag.to_string());
            }
        }
    }
    if merged.is_empty() {
        merged.push(GENERIC_AFFINITY.to_string());
    }
    AffinitySuggestion {
        suggested_affinities: merged,
    }
}
