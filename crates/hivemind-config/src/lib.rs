// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Role table and settings for the hivemind orchestration core.

mod role;
mod settings;

pub use role::{default_model_for, AgentRole, ModelKind, PaneId, PermissionMode, RoleTable};
pub use settings::Settings;
