use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;

pub const DEFAULT_PROVIDER_ID: &str = "openrouter";
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct";
pub const DEFAULT_APP_TITLE: &str = "SmartChat App";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub model_id: String,
    /// Sent as `HTTP-Referer`; OpenRouter uses it for app attribution.
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    pub app_title: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
            model_id: model_id.into().trim().to_string(),
            referer: None,
            app_title: Some(DEFAULT_APP_TITLE.to_string()),
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        let referer = referer.into();
        self.referer = (!referer.trim().is_empty()).then(|| referer.trim().to_string());
        self
    }

    pub fn with_app_title(mut self, app_title: impl Into<String>) -> Self {
        let app_title = app_title.into();
        self.app_title = (!app_title.trim().is_empty()).then(|| app_title.trim().to_string());
        self
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("failed to finalize HTTP request on `{stage}`: {message}"))]
    BuildHttpRequest {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("completion endpoint returned status {status}: {body}"))]
    CompletionStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("completion response is not valid JSON: {source}"))]
    MalformedResponse {
        stage: &'static str,
        source: serde_json::Error,
    },
}

/// Single-turn completion against an external model endpoint.
///
/// Returns `Ok(None)` when the provider answered with a well-formed body that carries no text.
pub trait CompletionBackend: Send + Sync {
    fn id(&self) -> &str;
    fn model(&self) -> &str;
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, ProviderResult<Option<String>>>;
}
