// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `fieldwork-core`
//!
//! Field-based work coordination: a persistent goal → spec → task forest
//! that worker agents sense, claim, execute and resolve.
//!
//! # Architecture
//!
//! - **Domain:** node model, deposit trees, affinity and bundle scoring, sessions
//! - **Application:** claim protocol, tree depositor, bundle matcher, coordinator
//! - **Infrastructure:** in-memory and PostgreSQL stores, event bus

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
