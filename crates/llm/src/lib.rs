use std::sync::Arc;

mod gateway;
mod provider;
mod rig_adapter;

pub use gateway::{
    AiGateway, DEFAULT_TRANSLATE_LANGUAGE, NO_RESPONSE_FALLBACK, TranscriptLine,
    UNAVAILABLE_FALLBACK, format_transcript,
};
pub use provider::{
    BoxFuture, CompletionBackend, DEFAULT_APP_TITLE, DEFAULT_ENDPOINT, DEFAULT_MODEL,
    DEFAULT_PROVIDER_ID, ProviderConfig, ProviderError, ProviderResult,
};
pub use rig_adapter::{RIG_OPENROUTER_PROVIDER_ID, RigCompletionAdapter};

pub fn create_backend(mut config: ProviderConfig) -> ProviderResult<Arc<dyn CompletionBackend>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENROUTER_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "openrouter" | "openai" | "rig-openai" => Ok(Arc::new(RigCompletionAdapter::new(config)?)),
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-backend",
            provider_id: config.provider_id,
        }),
    }
}
