// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Field operation commands
//!
//! Commands: deposit, sense, claim, resolve, release, boost, suggest, duplicates
//!
//! Each invocation opens its own [`WorkerSession`] for `--agent`. Resolve,
//! release and boost resume the session from the node's claimant, so only the
//! agent that claimed a node can act on it.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use fieldwork_core::application::{ClaimOutcome, SenseResult};
use fieldwork_core::domain::field::{FieldNodeId, NodeState, NodeType};
use fieldwork_core::domain::session::WorkerSession;
use fieldwork_core::domain::tree::DepositRequest;

use crate::embedded::EmbeddedField;

#[derive(Args)]
pub struct DepositArgs {
    /// Goal tree file (YAML or JSON)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Recorded as the depositor in node metadata
    #[arg(long, value_name = "AGENT")]
    by: Option<String>,

    /// Print the receipt as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct SenseArgs {
    /// Agent sensing the field
    #[arg(short, long, env = "FIELDWORK_AGENT_ID")]
    agent: String,

    /// Affinity tag (repeatable)
    #[arg(long = "affinity", value_name = "TAG", required = true)]
    affinities: Vec<String>,

    /// Minimum effective potential
    #[arg(long)]
    threshold: Option<f64>,

    /// Node type to include (repeatable; default: task)
    #[arg(long = "type", value_name = "TYPE")]
    node_types: Vec<NodeType>,

    /// Decay rate (0 disables decay)
    #[arg(long)]
    decay: Option<f64>,

    /// Maximum nodes returned
    #[arg(long)]
    limit: Option<usize>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ClaimArgs {
    /// Node to claim
    #[arg(value_name = "NODE_ID")]
    node_id: FieldNodeId,

    /// Claiming agent
    #[arg(short, long, env = "FIELDWORK_AGENT_ID")]
    agent: String,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Node to resolve
    #[arg(value_name = "NODE_ID")]
    node_id: FieldNodeId,

    /// Agent that claimed the node
    #[arg(short, long, env = "FIELDWORK_AGENT_ID")]
    agent: String,

    /// Artifact (JSON string, @file.json, or plain text)
    #[arg(long, value_name = "ARTIFACT")]
    artifact: Option<String>,

    /// Print the resolution as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ReleaseArgs {
    /// Node to release
    #[arg(value_name = "NODE_ID")]
    node_id: FieldNodeId,

    /// Agent that claimed the node
    #[arg(short, long, env = "FIELDWORK_AGENT_ID")]
    agent: String,
}

#[derive(Args)]
pub struct BoostArgs {
    /// Node to boost
    #[arg(value_name = "NODE_ID")]
    node_id: FieldNodeId,

    /// Agent that claimed the node
    #[arg(short, long, env = "FIELDWORK_AGENT_ID")]
    agent: String,

    /// What help is needed
    #[arg(short, long)]
    reason: String,
}

#[derive(Args)]
pub struct SuggestArgs {
    /// Task title
    #[arg(value_name = "TITLE")]
    title: String,

    /// Task description
    #[arg(short, long, default_value = "")]
    description: String,

    /// Print the suggestion as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct DuplicatesArgs {
    /// Title keywords to look for
    #[arg(value_name = "KEYWORD", required = true)]
    keywords: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

pub async fn deposit(args: DepositArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut request = load_request(&args.file)?;
    if args.by.is_some() {
        request.deposited_by = args.by;
    }
    if request.source.is_none() {
        request.source = Some(args.file.display().to_string());
    }

    let field = EmbeddedField::new(config_path).await?;
    let result = field.coordinator().deposit_tree(&request).await;
    field.shutdown().await?;
    let receipt = result.context("Deposit failed")?;

    if args.json {
        return print_json(&receipt);
    }

    println!("{}", format!("✓ Goal deposited: {}", receipt.goal_id).green());
    println!("  Specs: {}", receipt.total_specs);
    println!("  Tasks: {}", receipt.total_tasks);
    println!("  Bundles attached: {}", receipt.bundles_attached);
    for spec in &receipt.specs {
        println!("  {} {} ({} tasks)", spec.id.to_string().dimmed(), spec.title, spec.task_ids.len());
    }
    if !receipt.enrichment.is_clean() {
        println!(
            "{}",
            format!("⚠ {} node(s) could not be enriched", receipt.enrichment.failures.len()).yellow()
        );
        for failure in &receipt.enrichment.failures {
            let node = failure.node_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
            println!("    {}: {}", node, failure.error);
        }
    }
    Ok(())
}

pub async fn sense(args: SenseArgs, config_path: Option<PathBuf>) -> Result<()> {
    let field = EmbeddedField::new(config_path).await?;
    let coordinator = field.coordinator().clone();
    let session = WorkerSession::new(args.agent, args.affinities);

    let mut query = coordinator.default_query(&session);
    if let Some(threshold) = args.threshold {
        query = query.threshold(threshold);
    }
    if !args.node_types.is_empty() {
        query = query.node_types(args.node_types);
    }
    if let Some(decay) = args.decay {
        query = query.decay(decay);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }

    let result = coordinator.sense(&session, query).await;
    drop(coordinator);
    field.shutdown().await?;
    let result = result.context("Sense failed")?;

    if args.json {
        return print_json(&result);
    }
    print_sense(&result);
    Ok(())
}

fn print_sense(result: &SenseResult) {
    if result.nodes.is_empty() {
        println!("{}", "No open work above threshold".dimmed());
        return;
    }

    println!(
        "{:<36}  {:<5}  {:>9}  {:>8}  {}",
        "NODE".bold(),
        "TYPE".bold(),
        "POTENTIAL".bold(),
        "ATTEMPTS".bold(),
        "TITLE".bold()
    );
    for ranked in &result.nodes {
        println!(
            "{:<36}  {:<5}  {:>9.3}  {:>8}  {}",
            ranked.node.id,
            ranked.node.node_type,
            ranked.effective_potential,
            ranked.node.attempts,
            ranked.node.title
        );
    }
}

pub async fn claim(args: ClaimArgs, config_path: Option<PathBuf>) -> Result<()> {
    let field = EmbeddedField::new(config_path).await?;
    let coordinator = field.coordinator().clone();
    let mut session = WorkerSession::new(args.agent, Vec::new());

    let result = coordinator.claim(&mut session, args.node_id).await;
    drop(coordinator);
    field.shutdown().await?;
    let outcome = result.context("Claim failed")?;

    if args.json {
        return print_json(&outcome);
    }

    match outcome {
        ClaimOutcome::Claimed(node) => {
            println!("{}", format!("✓ Claimed {}", node.id).green());
            println!("  Title: {}", node.title);
            if !node.content.description.is_empty() {
                println!("  Description: {}", node.content.description);
            }
            for criterion in &node.content.acceptance_criteria {
                println!("  - {}", criterion);
            }
        }
        ClaimOutcome::AlreadyClaimed {
            node_id,
            state,
            claimed_by,
        } => {
            let holder = claimed_by.unwrap_or_else(|| "-".to_string());
            bail!("Node {} is not claimable (state: {}, held by: {})", node_id, state, holder);
        }
        ClaimOutcome::SingleGoalViolation { held } => {
            bail!("Session already holds node {}", held);
        }
    }
    Ok(())
}

pub async fn resolve(args: ResolveArgs, config_path: Option<PathBuf>) -> Result<()> {
    let artifact = parse_artifact(args.artifact)?;

    let field = EmbeddedField::new(config_path).await?;
    let coordinator = field.coordinator().clone();
    let (agent, node_id) = (args.agent, args.node_id);
    let result = async {
        let mut session = coordinator.resume(&agent, Vec::new(), node_id).await?;
        coordinator.resolve(&mut session, node_id, artifact).await
    }
    .await;
    drop(coordinator);
    field.shutdown().await?;
    let resolution = result.context("Resolve failed")?;

    if args.json {
        return print_json(&resolution);
    }
    if resolution.newly_resolved {
        println!("{}", format!("✓ Resolved {}", resolution.node_id).green());
    } else {
        println!("{}", format!("Node {} was already resolved", resolution.node_id).yellow());
    }
    Ok(())
}

pub async fn release(args: ReleaseArgs, config_path: Option<PathBuf>) -> Result<()> {
    let field = EmbeddedField::new(config_path).await?;
    let coordinator = field.coordinator().clone();
    let (agent, node_id) = (args.agent, args.node_id);
    let result = async {
        let mut session = coordinator.resume(&agent, Vec::new(), node_id).await?;
        coordinator.release(&mut session, node_id).await
    }
    .await;
    drop(coordinator);
    field.shutdown().await?;
    let ack = result.context("Release failed")?;

    println!("{}", format!("✓ Released {}", ack.node_id).green());
    Ok(())
}

pub async fn boost(args: BoostArgs, config_path: Option<PathBuf>) -> Result<()> {
    let field = EmbeddedField::new(config_path).await?;
    let coordinator = field.coordinator().clone();
    let (agent, node_id, reason) = (args.agent, args.node_id, args.reason);
    let result = async {
        let session = coordinator.resume(&agent, Vec::new(), node_id).await?;
        coordinator.boost(&session, node_id, &reason).await
    }
    .await;
    drop(coordinator);
    field.shutdown().await?;
    let ack = result.context("Boost failed")?;

    println!("{}", format!("✓ Boost signal sent for {}", ack.node_id).green());
    Ok(())
}

pub async fn suggest(args: SuggestArgs, config_path: Option<PathBuf>) -> Result<()> {
    let field = EmbeddedField::new(config_path).await?;
    let suggestion = field.coordinator().suggest_affinities(&args.title, &args.description);
    field.shutdown().await?;

    if args.json {
        return print_json(&suggestion);
    }
    println!("{}", suggestion.suggested_affinities.join(", "));
    Ok(())
}

pub async fn duplicates(args: DuplicatesArgs, config_path: Option<PathBuf>) -> Result<()> {
    let field = EmbeddedField::new(config_path).await?;
    let result = field.coordinator().check_duplicates(&args.keywords).await;
    field.shutdown().await?;
    let check = result.context("Duplicate check failed")?;

    if args.json {
        return print_json(&check);
    }
    if !check.found {
        println!("{}", "✓ No live nodes match".green());
        return Ok(());
    }

    if let Some(warning) = &check.warning {
        println!("{}", format!("⚠ {}", warning).yellow());
    }
    for node in &check.nodes {
        let holder = node.claimed_by.as_deref().unwrap_or("-");
        println!(
            "  {} {:<5} {:<8} {:<16} {}",
            node.id.to_string().dimmed(),
            node.node_type,
            format_state(node.state),
            holder,
            node.title
        );
    }
    Ok(())
}

/// Read a deposit request, choosing the parser by file extension.
pub fn load_request(path: &Path) -> Result<DepositRequest> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read goal tree: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).context("Failed to parse goal tree JSON"),
        _ => serde_yaml::from_str(&content).context("Failed to parse goal tree YAML"),
    }
}

/// `@path` reads a JSON file; anything that does not parse as JSON is kept as
/// a string artifact.
pub fn parse_artifact(input: Option<String>) -> Result<serde_json::Value> {
    match input {
        None => Ok(serde_json::Value::Null),
        Some(s) if s.starts_with('@') => {
            let path = &s[1..];
            let content =
                std::fs::read_to_string(path).with_context(|| format!("Failed to read artifact file: {}", path))?;
            serde_json::from_str(&content).context("Failed to parse artifact JSON")
        }
        Some(s) => Ok(serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))),
    }
}

pub fn format_state(state: NodeState) -> colored::ColoredString {
    match state {
        NodeState::Open => "open".normal(),
        NodeState::Claimed => "claimed".yellow(),
        NodeState::Resolved => "resolved".green(),
        NodeState::Released => "released".cyan(),
        NodeState::Boosted => "boosted".magenta(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_artifact() {
        assert_eq!(parse_artifact(None).unwrap(), serde_json::Value::Null);
        assert_eq!(
            parse_artifact(Some(r#"{"pr": 42}"#.to_string())).unwrap(),
            json!({ "pr": 42 })
        );
        assert_eq!(
            parse_artifact(Some("merged in main".to_string())).unwrap(),
            json!("merged in main")
        );
    }

    #[test]
    fn test_parse_artifact_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"files": ["src/lib.rs"]}}"#).unwrap();

        let arg = format!("@{}", file.path().display());
        assert_eq!(parse_artifact(Some(arg)).unwrap(), json!({ "files": ["src/lib.rs"] }));
    }

    #[test]
    fn test_load_request_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("plan.yaml");
        std::fs::write(
            &yaml_path,
            "goal:\n  title: Ship search\n  affinities: [backend]\nspecs:\n  - title: Index\n    affinities: [backend]\n    tasks:\n      - title: Build indexer\n        affinities: [backend]\n",
        )
        .unwrap();
        let request = load_request(&yaml_path).unwrap();
        assert_eq!(request.goal.title, "Ship search");
        assert_eq!(request.specs[0].tasks[0].title, "Build indexer");

        let json_path = dir.path().join("plan.json");
        std::fs::write(
            &json_path,
            serde_json::to_string(&json!({
                "goal": { "title": "Ship search", "affinities": ["backend"] },
                "specs": []
            }))
            .unwrap(),
        )
        .unwrap();
        let request = load_request(&json_path).unwrap();
        assert!(request.specs.is_empty());
    }
}
