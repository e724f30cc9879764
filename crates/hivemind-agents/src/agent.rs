// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::stream::BoxStream;
use hivemind_config::AgentRole;
use hivemind_protocol::Event;

use crate::error::AgentError;

/// The contract every provider backend implements. Shared behavior (history
/// append, context-restore preamble, sanitization) is deliberately *not*
/// part of this trait — it lives in [`crate::shared`] as plain functions each
/// implementation calls, since the three providers share no common base
/// type to put it on.
#[async_trait]
pub trait Agent: Send {
    fn role(&self) -> &AgentRole;

    /// Establishes whatever connection state the provider needs.
    /// `resume_id`, if `Some`, is a previously captured session/thread
    /// token; providers that cannot resume ignore it.
    async fn connect(&mut self, resume_id: Option<String>) -> Result<(), AgentError>;

    /// Sends one user turn and returns the normalized event stream for it.
    /// The stream ends when the turn completes (after a `Result` event) or
    /// the provider's connection drops.
    fn send(&mut self, message: &str) -> BoxStream<'_, Event>;

    /// Attempts to cancel an in-flight turn. Returns whether the provider
    /// reports having done so; providers that cannot cancel return `false`
    /// without attempting anything.
    async fn interrupt(&mut self) -> bool {
        false
    }

    /// Tears down the connection and returns the session/thread token to
    /// persist, if any.
    async fn disconnect(&mut self) -> Option<String>;

    fn session_id(&self) -> Option<&str>;
}
