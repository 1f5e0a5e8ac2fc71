// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Pure types and scoring for the field. No I/O beyond config file loading.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`field`] | `FieldNode`, `NodeType`, `NodeState`, `StateTransition` |
//! | [`tree`] | `DepositRequest`, `DepositPlan` |
//! | [`affinity`] | `DecayPolicy`, `SenseQuery`, `suggest_affinities` |
//! | [`bundle`] | `ContextBundle`, `FieldNodeBundle`, `MatchSubject` |
//! | [`events`] | `TaskEvent` |
//! | [`session`] | `WorkerSession` |
//! | [`repository`] | `FieldStore`, `TaskEventRepository` |
//! | [`config`] | `FieldworkConfig` |

pub mod field;
pub mod tree;
pub mod affinity;
pub mod bundle;
pub mod events;
pub mod session;
pub mod repository;
pub mod config;
