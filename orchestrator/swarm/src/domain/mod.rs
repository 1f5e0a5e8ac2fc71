// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure value types describing what a worker did. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `SwarmId`, `ExecutionVerdict`, `WorkerOutcome`, `WorkerReport`, `SwarmReport` |

pub mod swarm;

pub use swarm::*;
