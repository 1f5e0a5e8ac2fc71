// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node inspection commands
//!
//! Commands: show, tree, events

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use fieldwork_core::application::GoalTree;
use fieldwork_core::domain::field::{FieldNode, FieldNodeId};

use super::field::format_state;
use crate::embedded::EmbeddedField;

#[derive(Subcommand)]
pub enum NodeCommand {
    /// Show one node with its attached context bundles
    Show {
        #[arg(value_name = "NODE_ID")]
        node_id: FieldNodeId,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a goal with its specs and tasks in order
    Tree {
        #[arg(value_name = "GOAL_ID")]
        goal_id: FieldNodeId,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the lifecycle events recorded for a node
    Events {
        #[arg(value_name = "NODE_ID")]
        node_id: FieldNodeId,
    },
}

pub async fn handle_command(command: NodeCommand, config_path: Option<PathBuf>) -> Result<()> {
    let field = EmbeddedField::new(config_path).await?;
    let result = match command {
        NodeCommand::Show { node_id, json } => show(&field, node_id, json).await,
        NodeCommand::Tree { goal_id, json } => tree(&field, goal_id, json).await,
        NodeCommand::Events { node_id } => events(&field, node_id).await,
    };
    field.shutdown().await?;
    result
}

async fn show(field: &EmbeddedField, node_id: FieldNodeId, json: bool) -> Result<()> {
    let coordinator = field.coordinator();
    let node = coordinator.node(node_id).await.context("Failed to load node")?;
    let bundles = coordinator
        .node_bundles(node_id)
        .await
        .context("Failed to load context bundles")?;

    if json {
        let value = serde_json::json!({ "node": node, "bundles": bundles });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} {}", node.node_type.to_string().bold(), node.title.bold());
    println!("  ID: {}", node.id);
    println!("  State: {}", format_state(node.state));
    if let Some(parent) = node.parent_id {
        println!("  Parent: {}", parent);
    }
    println!("  Potential: {:.2}", node.potential);
    println!("  Affinity: {}", node.affinity.join(", "));
    println!("  Attempts: {}", node.attempts);
    if let Some(agent) = &node.claimed_by {
        println!("  Claimed by: {}", agent);
    }
    if !node.content.description.is_empty() {
        println!("  Description: {}", node.content.description);
    }
    if let Some(artifact) = &node.artifact {
        println!("  Artifact: {}", artifact);
    }
    println!("  Created: {}", node.created_at);
    println!("  Updated: {}", node.updated_at);

    if !bundles.is_empty() {
        println!("  Context bundles:");
        for bundle in &bundles {
            println!(
                "    {} (score {:.2}, by {})",
                bundle.bundle_id, bundle.match_score, bundle.attached_by
            );
        }
    }
    Ok(())
}

async fn tree(field: &EmbeddedField, goal_id: FieldNodeId, json: bool) -> Result<()> {
    let tree = field.coordinator().tree(goal_id).await.context("Failed to load tree")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }
    print_tree(&tree);
    Ok(())
}

fn print_tree(tree: &GoalTree) {
    println!("{}", tree_line(&tree.goal));
    for spec in &tree.specs {
        println!("  {}", tree_line(&spec.spec));
        for task in &spec.tasks {
            println!("    {}", tree_line(task));
        }
    }
}

fn tree_line(node: &FieldNode) -> String {
    let holder = node
        .claimed_by
        .as_deref()
        .map(|a| format!(" [{}]", a))
        .unwrap_or_default();
    format!(
        "{} {} {}{}",
        format_state(node.state),
        node.title,
        node.id.to_string().dimmed(),
        holder
    )
}

async fn events(field: &EmbeddedField, node_id: FieldNodeId) -> Result<()> {
    let events = field
        .task_events()
        .find_by_node(node_id)
        .await
        .context("Failed to load task events")?;

    if events.is_empty() {
        println!("{}", "No events recorded".dimmed());
        return Ok(());
    }
    for event in &events {
        let agent = event.agent_id.as_deref().unwrap_or("-");
        println!(
            "{} {:<9} {:<16} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            agent,
            event.payload
        );
    }
    Ok(())
}
