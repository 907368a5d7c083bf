//! Retry of job store updates that lost an optimistic lock

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::RepositoryError;

pub(crate) const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Runs `operation` up to `max_tries` times while it fails with
/// [`RepositoryError::OptimisticLock`]
///
/// Any other error is returned immediately.
pub async fn retry_on_optimistic_lock<T, F, Fut>(
    max_tries: u32,
    identifier: &str,
    mut operation: F,
) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Err(RepositoryError::OptimisticLock(_)) if attempt < max_tries => {
                warn!(
                    "Optimistic lock failure for {} (attempt {}/{}), will retry",
                    identifier, attempt, max_tries
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            other => return other,
        }
    }
}
