//! Bounded retry for external fetches.
//!
//! Every Scopus round-trip goes through [`with_attempts`] with the same cap,
//! rather than each call site unrolling its own retry loop. Attempts are
//! immediate; the tool is single-user and sequential, so there is no backoff.

use std::future::Future;

use tracing::warn;

use crate::error::Result;

/// Attempt cap shared by all external fetches.
pub const MAX_ATTEMPTS: u32 = 3;

/// Run a fallible async operation up to `attempts` times.
///
/// Returns the first `Ok`, or the last `Err` once the cap is reached.
/// Each failed attempt is logged with the operation label.
pub async fn with_attempts<T, F, Fut>(label: &str, attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                warn!(
                    op = label,
                    attempt = attempt,
                    max = attempts,
                    error = %e,
                    "Attempt failed, retrying"
                );
                attempt += 1;
            }
            Err(e) => {
                warn!(op = label, attempt = attempt, error = %e, "Attempts exhausted");
                return Err(e);
            }
        }
    }
}
