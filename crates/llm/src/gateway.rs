use std::sync::Arc;

use super::provider::{CompletionBackend, ProviderConfig, ProviderResult};

/// Shown when the request failed in transport, status, or body shape.
pub const UNAVAILABLE_FALLBACK: &str = "⚠️ AI is unavailable or failed to respond.";
/// Shown when the provider answered without any completion text.
pub const NO_RESPONSE_FALLBACK: &str = "⚠️ No response from AI.";
pub const DEFAULT_TRANSLATE_LANGUAGE: &str = "Telugu";

/// One line of a conversation handed to [`AiGateway::summarize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub from_self: bool,
    pub text: String,
}

impl TranscriptLine {
    pub fn new(from_self: bool, text: impl Into<String>) -> Self {
        Self {
            from_self,
            text: text.into(),
        }
    }
}

/// Fail-closed front of the completion backend.
///
/// Every call makes exactly one attempt and always resolves to display text; backend
/// errors are logged and replaced by [`UNAVAILABLE_FALLBACK`].
#[derive(Clone)]
pub struct AiGateway {
    backend: Arc<dyn CompletionBackend>,
}

impl AiGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Builds the gateway from provider settings; a missing credential is an error here and
    /// nowhere else.
    pub fn from_config(config: ProviderConfig) -> ProviderResult<Self> {
        Ok(Self::new(super::create_backend(config)?))
    }

    pub fn provider_id(&self) -> &str {
        self.backend.id()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub async fn complete(&self, prompt: &str) -> String {
        match self.backend.complete(prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!(
                    provider_id = %self.backend.id(),
                    model_id = %self.backend.model(),
                    "completion returned no text"
                );
                NO_RESPONSE_FALLBACK.to_string()
            }
            Err(error) => {
                tracing::error!(
                    provider_id = %self.backend.id(),
                    model_id = %self.backend.model(),
                    error = %error,
                    "completion request failed"
                );
                UNAVAILABLE_FALLBACK.to_string()
            }
        }
    }

    pub async fn reply(&self, message: &str) -> String {
        self.complete(&reply_prompt(message)).await
    }

    pub async fn enhance(&self, message: &str) -> String {
        self.complete(&enhance_prompt(message)).await
    }

    pub async fn summarize(&self, transcript: &[TranscriptLine]) -> String {
        self.complete(&summarize_prompt(transcript)).await
    }

    /// Translates into `language`, or [`DEFAULT_TRANSLATE_LANGUAGE`] when `None`.
    pub async fn translate(&self, message: &str, language: Option<&str>) -> String {
        let language = language.unwrap_or(DEFAULT_TRANSLATE_LANGUAGE);
        self.complete(&translate_prompt(message, language)).await
    }

    pub async fn detect_toxicity(&self, message: &str) -> bool {
        let verdict = self.complete(&toxicity_prompt(message)).await;
        is_toxic_verdict(&verdict)
    }
}

pub fn format_transcript(transcript: &[TranscriptLine]) -> String {
    transcript
        .iter()
        .map(|line| {
            let speaker = if line.from_self { "You" } else { "Them" };
            format!("{speaker}: {}", line.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn reply_prompt(message: &str) -> String {
    format!("Reply concisely to:\n\"{message}\"")
}

fn enhance_prompt(message: &str) -> String {
    format!("Make this message more clear and polite:\n\"{message}\"")
}

fn summarize_prompt(transcript: &[TranscriptLine]) -> String {
    format!("Summarize this conversation:\n{}", format_transcript(transcript))
}

fn translate_prompt(message: &str, language: &str) -> String {
    format!("Translate this to {language}:\n\"{message}\"")
}

fn toxicity_prompt(message: &str) -> String {
    format!(
        "Is this message toxic (hate, harassment, insult)? Only reply 'true' or 'false':\n\"{message}\""
    )
}

fn is_toxic_verdict(verdict: &str) -> bool {
    verdict.trim().to_lowercase() == "true"
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::provider::{BoxFuture, ProviderError};
    use crate::rig_adapter::RIG_OPENROUTER_PROVIDER_ID;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replays scripted results and records every prompt it receives.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<ProviderResult<Option<String>>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<ProviderResult<Option<String>>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn answering(text: &str) -> Arc<Self> {
            Self::new(vec![Ok(Some(text.to_string()))])
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl CompletionBackend for ScriptedBackend {
        fn id(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        fn complete<'a>(
            &'a self,
            prompt: &'a str,
        ) -> BoxFuture<'a, ProviderResult<Option<String>>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None));
            Box::pin(async move { reply })
        }
    }

    fn status_error(status: u16) -> ProviderError {
        ProviderError::CompletionStatus {
            stage: "test",
            status,
            body: "upstream failure".to_string(),
        }
    }

    #[tokio::test]
    async fn toxicity_is_positive_only_for_exact_true() {
        let cases = [
            ("true", true),
            ("  TRUE \n", true),
            ("True.", false),
            ("false", false),
            ("yes", false),
            ("true, it is insulting", false),
            (UNAVAILABLE_FALLBACK, false),
        ];

        for (verdict, expected) in cases {
            let gateway = AiGateway::new(ScriptedBackend::answering(verdict));
            assert_eq!(
                gateway.detect_toxicity("you are awful").await,
                expected,
                "verdict {verdict:?}"
            );
        }
    }

    #[tokio::test]
    async fn toxicity_failure_is_negative() {
        let gateway = AiGateway::new(ScriptedBackend::new(vec![Err(status_error(503))]));
        assert!(!gateway.detect_toxicity("anything").await);
    }

    #[tokio::test]
    async fn summarize_labels_speakers_in_input_order() {
        let backend = ScriptedBackend::answering("a greeting exchange");
        let gateway = AiGateway::new(backend.clone());
        let transcript = vec![
            TranscriptLine::new(false, "hi"),
            TranscriptLine::new(true, "yo"),
            TranscriptLine::new(false, "how are you?"),
        ];

        assert_eq!(gateway.summarize(&transcript).await, "a greeting exchange");
        assert_eq!(
            backend.prompts(),
            vec!["Summarize this conversation:\nThem: hi\nYou: yo\nThem: how are you?".to_string()]
        );
    }

    #[tokio::test]
    async fn translate_names_the_target_language() {
        let backend = ScriptedBackend::new(vec![Ok(Some("नमस्ते".into())), Ok(Some("హలో".into()))]);
        let gateway = AiGateway::new(backend.clone());

        assert_eq!(gateway.translate("hello", Some("hi")).await, "नमस्ते");
        assert_eq!(gateway.translate("hello", None).await, "హలో");

        let prompts = backend.prompts();
        assert!(prompts[0].contains("Translate this to hi"));
        assert!(prompts[0].ends_with("\"hello\""));
        assert!(prompts[1].contains("Translate this to Telugu"));
    }

    #[tokio::test]
    async fn reply_and_enhance_use_their_own_framing() {
        let backend = ScriptedBackend::new(vec![Ok(Some("ok".into())), Ok(Some("ok".into()))]);
        let gateway = AiGateway::new(backend.clone());

        gateway.reply("hello").await;
        gateway.enhance("gimme the file").await;

        assert_eq!(
            backend.prompts(),
            vec![
                "Reply concisely to:\n\"hello\"".to_string(),
                "Make this message more clear and polite:\n\"gimme the file\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn backend_errors_and_empty_answers_fall_back() {
        let gateway = AiGateway::new(ScriptedBackend::new(vec![
            Err(status_error(429)),
            Ok(None),
        ]));

        assert_eq!(gateway.reply("hello").await, UNAVAILABLE_FALLBACK);
        assert_eq!(gateway.reply("hello").await, NO_RESPONSE_FALLBACK);
    }

    #[tokio::test]
    async fn http_500_from_endpoint_resolves_to_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string(r#"{"error":"overloaded"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        let gateway = AiGateway::from_config(ProviderConfig::new(
            RIG_OPENROUTER_PROVIDER_ID,
            "test-key",
            server.uri(),
            "mistralai/mistral-7b-instruct",
        ))
        .unwrap();

        assert_eq!(gateway.reply("hello").await, UNAVAILABLE_FALLBACK);
    }

    #[test]
    fn missing_credentials_refuse_construction() {
        let result = AiGateway::from_config(ProviderConfig::new(
            RIG_OPENROUTER_PROVIDER_ID,
            "",
            "https://openrouter.ai/api/v1",
            "m",
        ));
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }
}
