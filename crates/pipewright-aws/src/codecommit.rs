//! Source repository readiness

use std::time::Duration;

use pipewright_common::poll::{wait_until_ready, ProbeErrorPolicy, Readiness, WaitPolicy};
use pipewright_common::Result;

use crate::RepositoryApi;

/// Interval between repository existence checks
pub const REPOSITORY_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Block until `repository` exists.
///
/// The repository is created asynchronously by the pipeline stack, so a
/// failed lookup only means "not created yet" and the wait continues.
pub async fn wait_for_repository(
    api: &dyn RepositoryApi,
    repository: &str,
    policy: &WaitPolicy,
) -> Result<()> {
    let what = format!("repository {}", repository);
    wait_until_ready(policy, &what, ProbeErrorPolicy::Retry, move || async move {
        api.get_repository(repository).await?;
        Ok(Readiness::Ready(()))
    })
    .await
}
