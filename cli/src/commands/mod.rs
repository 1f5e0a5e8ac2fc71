// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the fieldwork CLI

pub mod config;
pub mod field;
pub mod migrate;
pub mod node;

pub use self::config::ConfigCommand;
pub use self::migrate::MigrateCommand;
pub use self::node::NodeCommand;
