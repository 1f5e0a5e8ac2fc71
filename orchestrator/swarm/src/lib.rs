// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `fieldwork-swarm` - Worker Loops over a Shared Field
//!
//! Drives worker sessions through the fixed protocol
//! sense → claim → execute → resolve / release / boost, and runs many of them
//! concurrently against one [`fieldwork_core::application::FieldCoordinator`].
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `SwarmId`, `ExecutionVerdict`, `WorkerOutcome`, `WorkerReport` |
//! | [`application`] | Application | `TaskExecutor` trait, `WorkerLoop`, `Swarm` |
//!
//! ## Key Concepts
//!
//! - **TaskExecutor**: the opaque "do the work" step. The engine never looks
//!   inside; it only acts on the returned verdict.
//! - **Claim races**: a lost claim moves the loop to the next sensed
//!   candidate. It is never an error.
//! - **No orphan recovery**: a worker that dies mid-task leaves its node
//!   claimed. Reaping is out of scope here.

pub mod domain;
pub mod application;

pub use domain::*;
