use std::fmt;
use std::str::FromStr;

use smartchat_llm::{AiGateway, TranscriptLine};

use super::message::ChatMessage;

pub const TOXIC_VERDICT: &str = "⚠️ May be toxic";
pub const SAFE_VERDICT: &str = "✅ Looks safe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiAction {
    /// Suggests a concise reply to the scratch text.
    Enhance,
    /// Rewrites the scratch text to be clearer and more polite.
    Polish,
    Summarize,
    SummarizeConversation,
    Translate,
    CheckToxicity,
}

impl AiAction {
    pub const ALL: [Self; 6] = [
        Self::Enhance,
        Self::Polish,
        Self::Summarize,
        Self::SummarizeConversation,
        Self::Translate,
        Self::CheckToxicity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Enhance => "enhance",
            Self::Polish => "polish",
            Self::Summarize => "summarize",
            Self::SummarizeConversation => "summarize-chat",
            Self::Translate => "translate",
            Self::CheckToxicity => "toxicity",
        }
    }

    /// Whether the action reads the open conversation instead of the scratch text.
    pub fn uses_conversation(self) -> bool {
        matches!(self, Self::SummarizeConversation)
    }
}

impl fmt::Display for AiAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl FromStr for AiAction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.name() == wanted)
            .ok_or_else(|| format!("unknown AI action '{}'", raw.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AiRequestId(pub u64);

/// Prompt input for one action; each variant carries exactly what its prompt needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiTask {
    Reply(String),
    Polish(String),
    /// Scratch text summarized as a single line from the peer.
    Summarize(String),
    SummarizeConversation(Vec<TranscriptLine>),
    Translate { text: String, language: String },
    CheckToxicity(String),
}

impl AiTask {
    pub fn action(&self) -> AiAction {
        match self {
            Self::Reply(_) => AiAction::Enhance,
            Self::Polish(_) => AiAction::Polish,
            Self::Summarize(_) => AiAction::Summarize,
            Self::SummarizeConversation(_) => AiAction::SummarizeConversation,
            Self::Translate { .. } => AiAction::Translate,
            Self::CheckToxicity(_) => AiAction::CheckToxicity,
        }
    }
}

/// Work item handed to a spawned task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiJob {
    pub id: AiRequestId,
    pub task: AiTask,
}

impl AiJob {
    /// Resolves to the text shown in the panel output.
    pub async fn run(self, gateway: &AiGateway) -> String {
        match self.task {
            AiTask::Reply(text) => gateway.reply(&text).await,
            AiTask::Polish(text) => gateway.enhance(&text).await,
            AiTask::Summarize(text) => gateway.summarize(&[TranscriptLine::new(false, text)]).await,
            AiTask::SummarizeConversation(lines) => gateway.summarize(&lines).await,
            AiTask::Translate { text, language } => {
                gateway.translate(&text, Some(language.as_str())).await
            }
            AiTask::CheckToxicity(text) => {
                if gateway.detect_toxicity(&text).await {
                    TOXIC_VERDICT.to_string()
                } else {
                    SAFE_VERDICT.to_string()
                }
            }
        }
    }
}

/// Scratch input and output, independent of the message list.
///
/// Requests may overlap; only the most recent one may write the output.
#[derive(Debug, Clone)]
pub struct AiPanel {
    input: String,
    output: String,
    pending: Option<AiRequestId>,
    next_id: u64,
    language: String,
}

impl AiPanel {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            input: String::new(),
            output: String::new(),
            pending: None,
            next_id: 0,
            language: language.into(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Target language for later translate requests.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Records the request and returns the job to run, or `None` when there is nothing
    /// to send.
    pub fn begin(
        &mut self,
        action: AiAction,
        text: &str,
        conversation: &[ChatMessage],
    ) -> Option<AiJob> {
        let task = if action.uses_conversation() {
            if conversation.is_empty() {
                return None;
            }
            AiTask::SummarizeConversation(
                conversation
                    .iter()
                    .map(|message| TranscriptLine::new(message.from_self, message.text.clone()))
                    .collect(),
            )
        } else {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            self.input = text.to_string();
            let text = self.input.clone();
            match action {
                AiAction::Enhance => AiTask::Reply(text),
                AiAction::Polish => AiTask::Polish(text),
                AiAction::Summarize => AiTask::Summarize(text),
                AiAction::Translate => AiTask::Translate {
                    text,
                    language: self.language.clone(),
                },
                AiAction::CheckToxicity => AiTask::CheckToxicity(text),
                AiAction::SummarizeConversation => return None,
            }
        };

        self.next_id += 1;
        let id = AiRequestId(self.next_id);
        self.pending = Some(id);
        tracing::debug!(request = id.0, action = %action, "AI request started");

        Some(AiJob { id, task })
    }

    /// Stores `output` if `id` is the latest request. Returns whether it was stored.
    pub fn complete(&mut self, id: AiRequestId, output: String) -> bool {
        if self.pending != Some(id) {
            tracing::debug!(request = id.0, "discarding superseded AI result");
            return false;
        }
        self.pending = None;
        self.output = output;
        true
    }

    pub fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
        self.pending = None;
    }
}
