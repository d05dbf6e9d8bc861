use rig::http_client::{self, HttpClientExt};
use rig::providers::openai;
use serde_json::{Value, json};
use snafu::{ResultExt, ensure};

use super::provider::{
    BoxFuture, CompletionBackend, CompletionStatusSnafu, HttpClientSnafu, MalformedResponseSnafu,
    MissingApiKeySnafu, ProviderConfig, ProviderError, ProviderResult,
};

pub const RIG_OPENROUTER_PROVIDER_ID: &str = "openrouter";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const COMPLETION_TEXT_POINTER: &str = "/choices/0/message/content";

/// OpenAI-compatible chat completions over rig's HTTP client.
///
/// OpenRouter speaks the OpenAI wire format, so rig's OpenAI client is pointed at the
/// configured endpoint and the request body is assembled by hand to keep it single-turn.
pub struct RigCompletionAdapter {
    config: ProviderConfig,
}

impl RigCompletionAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model_id,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        })
    }

    async fn send_completion(&self, prompt: &str) -> ProviderResult<Option<String>> {
        let client = Self::build_client(&self.config)?;
        let body = self.request_body(prompt).to_string().into_bytes();

        let mut builder = client
            .post(CHAT_COMPLETIONS_PATH)
            .context(HttpClientSnafu {
                stage: "build-completion-request",
            })?
            .header("Content-Type", "application/json");
        if let Some(referer) = &self.config.referer {
            builder = builder.header("HTTP-Referer", referer.as_str());
        }
        if let Some(app_title) = &self.config.app_title {
            builder = builder.header("X-Title", app_title.as_str());
        }
        let request = builder
            .body(body)
            .map_err(|source| ProviderError::BuildHttpRequest {
                stage: "build-completion-request-body",
                message: source.to_string(),
            })?;

        let response = client.send(request).await.context(HttpClientSnafu {
            stage: "send-completion-request",
        })?;
        let status = response.status();
        let payload = http_client::text(response).await.context(HttpClientSnafu {
            stage: "read-completion-response",
        })?;

        if !status.is_success() {
            return CompletionStatusSnafu {
                stage: "completion-http-status",
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        extract_completion_text(&payload)
    }
}

impl CompletionBackend for RigCompletionAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn model(&self) -> &str {
        &self.config.model_id
    }

    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, ProviderResult<Option<String>>> {
        Box::pin(self.send_completion(prompt))
    }
}

/// Pulls `choices[0].message.content` out of a completion body.
///
/// A body that is not JSON is an error; a JSON body without text is `None`.
pub(crate) fn extract_completion_text(payload: &str) -> ProviderResult<Option<String>> {
    let value = serde_json::from_str::<Value>(payload).context(MalformedResponseSnafu {
        stage: "parse-completion-response",
    })?;

    Ok(value
        .pointer(COMPLETION_TEXT_POINTER)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string))
}
