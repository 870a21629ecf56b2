//! Fire-and-forget tee of ingested batches to a downstream mirror.

use serde_json::Value;
use tokio_util::task::TaskTracker;

/// Client for the configured downstream mirror target.
///
/// Passed explicitly wherever it is needed; there is no process-global
/// instance.
#[derive(Debug, Clone)]
pub struct MirrorClient {
    client: reqwest::Client,
    url: String,
}

impl MirrorClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Tee `body` to the mirror on a detached task. Failures are logged and
    /// never reach the ingest path.
    pub fn spawn_mirror(&self, tracker: &TaskTracker, body: Value) {
        let mirror = self.clone();
        tracker.spawn(async move {
            mirror.send(&body).await;
        });
    }

    async fn send(&self, body: &Value) {
        match self.client.post(&self.url).json(body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    "mirror target rejected batch"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("mirror request failed: {e}");
            }
        }
    }
}
