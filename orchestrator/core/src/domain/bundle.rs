// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Context Bundles
//!
//! A context bundle is a catalog entry of reference material (style guides,
//! API notes, runbooks) maintained by operators outside this engine. After a
//! deposit, the bundle matcher scores every bundle against each new node and
//! attaches the best ones through [`FieldNodeBundle`] join rows.
//!
//! Scoring is a pure function of the node text, the node affinities and the
//! bundle, so repeated runs over the same catalog rank identically.

use crate::domain::field::FieldNodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

pub const DOMAIN_WEIGHT: f64 = 3.0;
pub const KEYWORD_WEIGHT: f64 = 2.0;
pub const KEYWORD_CAP: usize = 3;
pub const AFFINITY_WEIGHT: f64 = 1.5;
pub const AFFINITY_CAP: usize = 2;
pub const MIN_BUNDLE_SCORE: f64 = 1.0;
pub const MAX_BUNDLES_PER_NODE: usize = 4;

/// Substrings that reveal which domain a piece of text talks about.
const DOMAIN_VOCABULARY: &[(&str, &[&str])] = &[
    ("backend", &["api", "endpoint", "server", "database", "schema", "migration", "queue", "service"]),
    ("frontend", &["ui", "component", "page", "form", "layout", "css", "react", "screen"]),
    ("payments", &["payment", "checkout", "billing", "invoice", "refund", "stripe", "subscription"]),
    ("auth", &["auth", "login", "signup", "password", "token", "session", "oauth", "permission"]),
    ("testing", &["test", "coverage", "fixture", "regression", "e2e", "assert"]),
    ("devops", &["deploy", "pipeline", "docker", "kubernetes", "terraform", "monitoring", "ci"]),
    ("data", &["analytics", "etl", "report", "warehouse", "metric", "dashboard"]),
    ("docs", &["document", "readme", "guide", "tutorial", "changelog"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub Uuid);

impl BundleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub id: BundleId,
    pub slug: String,
    pub domain: String,
    pub keywords: Vec<String>,
    pub affinities: Vec<String>,
    pub priority: i32,
}

impl ContextBundle {
    pub fn new(
        slug: impl Into<String>,
        domain: impl Into<String>,
        keywords: Vec<String>,
        affinities: Vec<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: BundleId::new(),
            slug: slug.into(),
            domain: domain.into(),
            keywords,
            affinities,
            priority,
        }
    }
}

/// Join row attaching a bundle to a node. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNodeBundle {
    pub node_id: FieldNodeId,
    pub bundle_id: BundleId,
    pub match_score: f64,
    pub attached_by: String,
    pub attached_at: DateTime<Utc>,
}

/// Domains whose vocabulary appears in `text`, in vocabulary order.
pub fn detect_domains(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    DOMAIN_VOCABULARY
        .iter()
        .filter(|(_, needles)| needles.iter().any(|n| contains_term(&lowered, n)))
        .map(|(domain, _)| *domain)
        .collect()
}

/// Short needles ("ui", "ci") only count as whole words; longer ones match
/// anywhere so "payments" still hits "payment".
fn contains_term(haystack: &str, needle: &str) -> bool {
    if needle.len() > 3 {
        return haystack.contains(needle);
    }
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == needle)
}

/// Per-node inputs to bundle scoring, computed once and reused for every
/// bundle in the catalog.
#[derive(Debug, Clone)]
pub struct MatchSubject {
    text: String,
    domains: Vec<&'static str>,
    affinities: Vec<String>,
}

impl MatchSubject {
    pub fn new(title: &str, description: &str, affinities: &[String]) -> Self {
        let text = format!("{} {}", title, description).to_lowercase();
        let domains = detect_domains(&text);
        Self {
            text,
            domains,
            affinities: affinities.iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    pub fn score(&self, bundle: &ContextBundle) -> f64 {
        let domain_hit = self.domains.iter().any(|d| bundle.domain.eq_ignore_ascii_case(d));
        let keyword_hits = bundle
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty() && self.text.contains(&k.to_lowercase()))
            .count();
        let affinity_overlap = bundle
            .affinities
            .iter()
            .filter(|a| self.affinities.contains(&a.to_lowercase()))
            .count();

        let mut score = 0.0;
        if domain_hit {
            score += DOMAIN_WEIGHT;
        }
        score += KEYWORD_WEIGHT * keyword_hits.min(KEYWORD_CAP) as f64;
        score += AFFINITY_WEIGHT * affinity_overlap.min(AFFINITY_CAP) as f64;
        score
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBundle<'a> {
    pub bundle: &'a ContextBundle,
    pub score: f64,
}

/// Rank the catalog for one node: keep scores at or above `min_score`, order
/// by score, then priority, then slug, and keep the first `limit`.
pub fn rank_bundles<'a>(
    subject: &MatchSubject,
    catalog: &'a [ContextBundle],
    min_score: f64,
    limit: usize,
) -> Vec<ScoredBundle<'a>> {
    let mut scored: Vec<ScoredBundle<'a>> = catalog
        .iter()
        .map(|bundle| ScoredBundle {
            bundle,
            score: subject.score(bundle),
        })
        .filter(|s| s.score >= min_score)
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.bundle.priority.cmp(&a.bundle.priority))
            .then_with(|| a.bundle.slug.cmp(&b.bundle.slug))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(slug: &str, domain: &str, keywords: &[&str], affinities: &[&str], priority: i32) -> ContextBundle {
        ContextBundle::new(
            slug,
            domain,
            keywords.iter().map(|s| s.to_string()).collect(),
            affinities.iter().map(|s| s.to_string()).collect(),
            priority,
        )
    }

    #[test]
    fn detects_domains_from_substrings() {
        let domains = detect_domains("Build the Payment API endpoint");
        assert_eq!(domains, vec!["backend", "payments"]);
    }

    #[test]
    fn short_terms_need_word_boundaries() {
        assert!(detect_domains("build a guide").contains(&"docs"));
        assert!(!detect_domains("build a guide").contains(&"frontend"));
        assert!(detect_domains("polish the checkout UI").contains(&"frontend"));
    }

    #[test]
    fn score_combines_and_caps_components() {
        let subject = MatchSubject::new(
            "Payment API",
            "stripe webhook refund invoice",
            &["implementer".to_string(), "backend".to_string(), "payments".to_string()],
        );
        let b = bundle(
            "stripe-guide",
            "payments",
            &["stripe", "webhook", "refund", "invoice"],
            &["implementer", "backend", "payments"],
            1,
        );
        // 3.0 domain + 2.0 * 3 keywords (capped) + 1.5 * 2 affinities (capped)
        assert!((subject.score(&b) - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ranking_breaks_ties_on_priority() {
        let subject = MatchSubject::new("Checkout UI", "", &[]);
        let catalog = vec![
            bundle("low", "frontend", &[], &[], 1),
            bundle("high", "frontend", &[], &[], 9),
            bundle("unrelated", "devops", &[], &[], 100),
        ];
        let ranked = rank_bundles(&subject, &catalog, MIN_BUNDLE_SCORE, MAX_BUNDLES_PER_NODE);
        let slugs: Vec<&str> = ranked.iter().map(|s| s.bundle.slug.as_str()).collect();
        assert_eq!(slugs, vec!["high", "low"]);
    }

    #[test]
    fn ranking_truncates_to_limit() {
        let subject = MatchSubject::new("api server database", "", &[]);
        let catalog: Vec<ContextBundle> = (0..6)
            .map(|i| bundle(&format!("b{}", i), "backend", &[], &[], i))
            .collect();
        let ranked = rank_bundles(&subject, &catalog, MIN_BUNDLE_SCORE, MAX_BUNDLES_PER_NODE);
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0].bundle.slug, "b5");
    }
}
