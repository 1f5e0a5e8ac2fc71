// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod error;
pub mod claim;
pub mod bundle_matcher;
pub mod deposit;
pub mod coordinator;
pub mod event_persister;
pub mod repository_factory;

// Re-export use cases for convenience
pub use bundle_matcher::{BundleMatcher, EnrichmentFailure, EnrichmentReport};
pub use claim::{ClaimOutcome, ClaimService, NodeAck, Resolution};
pub use coordinator::{DuplicateCheck, DuplicateMatch, FieldCoordinator, GoalTree, SenseResult, SpecBranch};
pub use deposit::{DepositReceipt, TreeDepositor};
pub use error::{CoordinationError, CoordinationResult};
pub use event_persister::{init_standard_subscribers, TaskEventPersister, TracingSubscriber};
