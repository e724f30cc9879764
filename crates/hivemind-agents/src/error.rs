// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Error categories an [`crate::Agent`] implementation can surface. This
/// mirrors the taxonomy the manager uses to decide whether to retry, log a
/// warning, or treat the pane as needing a restart.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("provider session expired: {0}")]
    SessionExpired(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("provider binary not found: {0}")]
    MissingBinary(String),

    #[error("provider process exited with error: {0}")]
    ProviderExit(String),
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transient(_))
    }

    /// Heuristic rate-limit detection by substring match on a raw error
    /// message, since providers don't expose a structured rate-limit
    /// signal over these transports.
    pub fn classify_message(raw: &str) -> AgentError {
        let lower = raw.to_ascii_lowercase();
        if lower.contains("rate limit") || lower.contains("429") || lower.contains("overloaded") {
            AgentError::RateLimit(raw.to_string())
        } else if lower.contains("not found") || lower.contains("expired") || lower.contains("no such thread")
        {
            AgentError::SessionExpired(raw.to_string())
        } else if lower.contains("timeout") || lower.contains("connection reset") || lower.contains("temporarily")
        {
            AgentError::Transient(raw.to_string())
        } else {
            AgentError::ProviderExit(raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_substrings() {
        assert!(matches!(
            AgentError::classify_message("Error: rate limit exceeded, slow down"),
            AgentError::RateLimit(_)
        ));
        assert!(matches!(
            AgentError::classify_message("HTTP 429 Too Many Requests"),
            AgentError::RateLimit(_)
        ));
    }

    #[test]
    fn classifies_session_expiry_substrings() {
        assert!(matches!(
            AgentError::classify_message("thread abc123 not found"),
            AgentError::SessionExpired(_)
        ));
    }

    #[test]
    fn classifies_transient_substrings() {
        assert!(matches!(
            AgentError::classify_message("connection reset by peer"),
            AgentError::Transient(_)
        ));
    }

    #[test]
    fn unrecognized_message_is_provider_exit() {
        assert!(matches!(
            AgentError::classify_message("something unexpected happened"),
            AgentError::ProviderExit(_)
        ));
    }
}
