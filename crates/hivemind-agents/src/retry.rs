// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Capped exponential-backoff retry, used only at the one call site the
//! error-handling design calls out as safe to retry aggressively: the
//! persistent Claude client's top-level turn transmit.

use std::future::Future;
use std::time::Duration;

const MULTIPLIER: f64 = 2.0;
const MAX_DELAY: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 5;

/// Retries `f` up to [`MAX_ATTEMPTS`] times while `is_transient` returns
/// true for the error, waiting `base_delay * MULTIPLIER^attempt` (capped at
/// [`MAX_DELAY`]) between attempts. The first non-transient error, or the
/// final attempt's error, is returned as-is.
pub async fn with_backoff<T, E, F, Fut>(
    base_delay: Duration,
    is_transient: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < MAX_ATTEMPTS && is_transient(&e) => {
                let delay = base_delay.mul_f64(MULTIPLIER.powi(attempt as i32)).min(MAX_DELAY);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = with_backoff(
            Duration::from_millis(1),
            |_: &&str| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err("transient") } else { Ok("done") } }
            },
        )
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = with_backoff(
            Duration::from_millis(1),
            |_: &&str| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
