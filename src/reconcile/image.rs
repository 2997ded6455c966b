//! Image reconciliation.
//!
//! Every bring-up pulls; there is no local-presence shortcut. The progress
//! stream is always drained to the end, since dropping it early can make the
//! daemon cancel the pull.

use std::collections::HashMap;

use futures::StreamExt;

use crate::error::{Result, StasisError};
use crate::runtime::ContainerRuntime;

/// What a completed pull reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Progress events consumed.
    pub events: usize,
    /// Distinct layers seen.
    pub layers: usize,
}

/// Pulls `image` and waits for the pull to finish.
///
/// An error before any progress means the pull never started
/// ([`StasisError::ImagePull`]); an error after that is a transfer failure
/// ([`StasisError::ImageStream`]). Partially pulled layers are left as-is.
pub async fn ensure_image(runtime: &dyn ContainerRuntime, image: &str) -> Result<PullSummary> {
    tracing::info!("Pulling image: {}...", image);

    let mut stream = runtime.pull_image(image);
    let mut summary = PullSummary::default();
    let mut last_status: HashMap<String, String> = HashMap::new();

    while let Some(item) = stream.next().await {
        let progress = match item {
            Ok(progress) => progress,
            Err(source) if summary.events == 0 => {
                return Err(StasisError::ImagePull {
                    image: image.to_string(),
                    source,
                });
            }
            Err(source) => {
                return Err(StasisError::ImageStream {
                    image: image.to_string(),
                    source,
                });
            }
        };
        summary.events += 1;

        let Some(status) = progress.status else {
            continue;
        };
        match progress.id {
            Some(layer) => {
                if last_status.get(&layer) != Some(&status) {
                    tracing::debug!("{}: {}", layer, status);
                    last_status.insert(layer, status);
                }
            }
            None => tracing::debug!("{}", status),
        }
    }

    summary.layers = last_status.len();
    tracing::info!("Pulled image: {} ({} layers)", image, summary.layers);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, PullFailure};

    #[tokio::test]
    async fn test_pull_drains_stream() {
        let runtime = FakeRuntime::new();

        let summary = ensure_image(&runtime, "redis:7").await.unwrap();

        assert!(runtime.has_image("redis:7"));
        assert_eq!(summary.events, 4);
        assert_eq!(summary.layers, 1);
    }

    #[tokio::test]
    async fn test_always_pulls() {
        let runtime = FakeRuntime::new();
        ensure_image(&runtime, "redis:7").await.unwrap();
        ensure_image(&runtime, "redis:7").await.unwrap();
        assert_eq!(runtime.pulls_started(), 2);
    }

    #[tokio::test]
    async fn test_rejected_pull() {
        let runtime = FakeRuntime::new();
        runtime.fail_pull("nope:latest", PullFailure::Rejected);

        let err = ensure_image(&runtime, "nope:latest").await.unwrap_err();
        assert!(matches!(err, StasisError::ImagePull { .. }));
        assert!(!runtime.has_image("nope:latest"));
    }

    #[tokio::test]
    async fn test_stream_failure() {
        let runtime = FakeRuntime::new();
        runtime.fail_pull("flaky:1", PullFailure::MidStream);

        let err = ensure_image(&runtime, "flaky:1").await.unwrap_err();
        assert!(matches!(err, StasisError::ImageStream { .. }));
    }
}
