use serde_json::json;
use uuid::Uuid;

use crate::error::{EmojiError, Result};
use crate::settings::TraceSettings;

/// Records the identifier of the top-level execution. Nested steps report
/// their start too; only the first identifier observed during one invocation
/// is kept.
#[derive(Debug, Default)]
pub struct RunTracer {
    run_id: Option<Uuid>,
}

impl RunTracer {
    pub fn observe_start(&mut self, run_id: Uuid) {
        if self.run_id.is_none() {
            self.run_id = Some(run_id);
        }
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }
}

/// Client for the trace/feedback service a run id is later correlated with.
#[derive(Clone)]
pub struct TraceClient {
    http: reqwest::Client,
    endpoint: String,
    public_url: String,
    api_key: Option<String>,
    project: String,
}

impl TraceClient {
    pub fn from_settings(settings: &TraceSettings) -> Self {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("LANGCHAIN_API_KEY").ok());
        Self {
            http: reqwest::Client::new(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            public_url: settings.public_url.trim_end_matches('/').to_string(),
            api_key,
            project: settings.project.clone(),
        }
    }

    pub async fn create_feedback(
        &self,
        run_id: Uuid,
        key: &str,
        score: Option<f64>,
        comment: Option<String>,
        feedback_id: Option<Uuid>,
    ) -> Result<()> {
        let body = json!({
            "run_id": run_id,
            "key": key,
            "score": score,
            "comment": comment,
            "id": feedback_id,
        });
        let mut builder = self.http.post(format!("{}/api/v1/feedback", self.endpoint));
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| EmojiError::Trace(format!("feedback request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmojiError::Trace(format!("feedback rejected: {status}")));
        }
        Ok(())
    }

    pub fn trace_url(&self, run_id: Uuid) -> String {
        format!("{}/projects/{}/runs/{run_id}", self.public_url, self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracer_keeps_only_the_first_run_id() {
        let first = Uuid::new_v4();
        let mut tracer = RunTracer::default();
        tracer.observe_start(first);
        tracer.observe_start(Uuid::new_v4());
        tracer.observe_start(Uuid::new_v4());
        assert_eq!(tracer.run_id(), Some(first));
    }

    #[test]
    fn tracer_without_events_stays_unset() {
        let tracer = RunTracer::default();
        assert_eq!(tracer.run_id(), None);
    }

    #[test]
    fn trace_url_embeds_project_and_run() {
        let client = TraceClient::from_settings(&TraceSettings {
            endpoint: "https://api.smith.langchain.com".to_string(),
            public_url: "https://smith.langchain.com/".to_string(),
            api_key: None,
            project: "emoji-agent".to_string(),
        });
        let run_id = Uuid::new_v4();
        assert_eq!(
            client.trace_url(run_id),
            format!("https://smith.langchain.com/projects/emoji-agent/runs/{run_id}")
        );
    }
}
