use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::workflow_run::WorkflowRun;

/// Nudges the downstream processor after a run is queued.
///
/// Best-effort and non-blocking: `wake` returns immediately and never reports
/// failure. Runs whose wake call is lost are picked up by the external sweep
/// over `queued` rows.
pub trait ProcessorWaker: Send + Sync {
    fn wake(&self, run: &WorkflowRun);
}

pub struct HttpProcessorWaker {
    client: Client,
    url: Option<String>,
    secret: Option<String>,
    timeout: Duration,
}

impl HttpProcessorWaker {
    pub fn new(
        client: Client,
        url: Option<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url,
            secret,
            timeout,
        }
    }
}

impl ProcessorWaker for HttpProcessorWaker {
    fn wake(&self, run: &WorkflowRun) {
        let Some(url) = self.url.clone() else {
            debug!(run_id = %run.id, "processor wake URL not configured; relying on sweep");
            return;
        };

        let mut request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&json!({
                "run_id": run.id,
                "workflow_name": run.workflow_name,
            }));
        if let Some(secret) = self.secret.as_deref() {
            request = request.bearer_auth(secret);
        }

        let run_id = run.id;
        tokio::spawn(async move {
            match request.send().await {
                Ok(res) if res.status().is_success() => {
                    debug!(%run_id, "processor woken");
                }
                Ok(res) => {
                    warn!(%run_id, status = %res.status(), "processor wake call rejected");
                }
                Err(err) => {
                    warn!(%run_id, ?err, "processor wake call failed");
                }
            }
        });
    }
}
