use std::sync::Arc;

use smartchat_llm::AiGateway;
use smartchat_storage::UserId;
use smartchat_transport::{
    ChannelResult, ChatBackend, InboundMessage, InboundSubscription, LoginOutcome,
    MessageChannel, OutboundMessage, socket_url,
};
use snafu::ResultExt;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::chat::{
    AiAction, AiPanel, AppEvent, ContactSelector, HistoryTicket, InboundRoute, OutboundDispatch,
    SelectionRejection, SendRejection,
};
use crate::error::{AppResult, ReadInputSnafu, WriteOutputSnafu};
use crate::session::{SessionContext, SessionGeneration};
use crate::settings::SettingsStore;
use crate::terminal::{self, Command};

pub const CREDENTIALS_REQUIRED: &str = "Username and Password are required";
const REALTIME_UNAVAILABLE: &str = "Realtime connection unavailable; live messages are off";

/// Collaborators the shell is built from.
pub struct ShellDeps {
    pub session: SessionContext,
    pub backend: Arc<dyn ChatBackend>,
    pub gateway: AiGateway,
    pub realtime_endpoint: String,
    pub settings: SettingsStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    AvatarRequired,
    Contacts,
    Conversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Owns all view state; mutated only from the loop in [`ChatAppShell::run`].
///
/// Network work runs in spawned tasks that report back through `events`.
pub struct ChatAppShell {
    session: SessionContext,
    backend: Arc<dyn ChatBackend>,
    gateway: AiGateway,
    realtime_endpoint: String,
    settings: SettingsStore,
    channel: MessageChannel,
    inbound: Option<InboundSubscription>,
    selector: ContactSelector,
    ai_panel: AiPanel,
    view: View,
    notice: Option<String>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    last_frame: String,
}

struct ShellDispatch<'a> {
    channel: &'a MessageChannel,
    backend: Arc<dyn ChatBackend>,
}

impl OutboundDispatch for ShellDispatch<'_> {
    fn dispatch(&self, message: &OutboundMessage) {
        if let Err(error) = self.channel.send(message) {
            tracing::warn!(
                peer_id = %message.to,
                correlation_id = %message.correlation_id,
                error = %error,
                "message not relayed"
            );
        }

        let backend = self.backend.clone();
        let message = message.clone();
        tokio::spawn(async move {
            if let Err(error) = backend
                .persist_message(&message.from, &message.to, &message.text)
                .await
            {
                tracing::warn!(
                    peer_id = %message.to,
                    correlation_id = %message.correlation_id,
                    error = %error,
                    "message not persisted"
                );
            }
        });
    }
}

impl ChatAppShell {
    pub fn new(deps: ShellDeps) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let language = deps.settings.settings().translate_language.clone();
        Self {
            session: deps.session,
            backend: deps.backend,
            gateway: deps.gateway,
            realtime_endpoint: deps.realtime_endpoint,
            settings: deps.settings,
            channel: MessageChannel::new(),
            inbound: None,
            selector: ContactSelector::new(),
            ai_panel: AiPanel::new(language),
            view: View::Login,
            notice: None,
            events_tx,
            events_rx,
            last_frame: String::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn selector(&self) -> &ContactSelector {
        &self.selector
    }

    pub fn ai_panel(&self) -> &AiPanel {
        &self.ai_panel
    }

    pub async fn run(mut self) -> AppResult<()> {
        self.start().await;
        let mut stdout = tokio::io::stdout();
        self.present(&mut stdout).await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let flow = tokio::select! {
                line = lines.next_line() => {
                    match line.context(ReadInputSnafu { stage: "read-command" })? {
                        Some(line) => self.handle_line(&line).await,
                        None => Flow::Quit,
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                    Flow::Continue
                }
                inbound = next_inbound(&mut self.inbound) => {
                    self.handle_inbound(inbound);
                    Flow::Continue
                }
            };

            if flow == Flow::Quit {
                break;
            }
            self.present(&mut stdout).await?;
        }

        self.channel.disconnect().await;
        Ok(())
    }

    /// Startup gate: login, avatar notice, or the contact list.
    pub async fn start(&mut self) {
        if self.session.load().is_some() {
            self.enter_session();
        } else {
            self.view = View::Login;
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> Flow {
        match Command::parse(line) {
            Some(command) => self.handle_command(command).await,
            None => Flow::Continue,
        }
    }

    pub async fn handle_command(&mut self, command: Command) -> Flow {
        self.notice = None;
        match (self.view, command) {
            (_, Command::Quit) => return Flow::Quit,
            (_, Command::Help) => self.notice = Some(terminal::help_text()),
            (_, Command::Invalid(message)) => self.notice = Some(message),
            (_, Command::Language(language)) => self.set_language(&language),
            (View::Login, Command::Login { username, password }) => {
                self.begin_login(username, password)
            }
            (View::Login, _) => {
                self.notice = Some("Log in first with /login <username> <password>".to_string())
            }
            (_, Command::Login { .. }) => {
                self.notice = Some("Already logged in; /logout first".to_string())
            }
            (_, Command::Logout) => self.logout().await,
            (View::AvatarRequired, _) => {
                self.notice = Some("Set an avatar first, or /logout".to_string())
            }
            (_, Command::Contacts) => self.view = View::Contacts,
            (_, Command::Open(index)) => self.open(index),
            (_, Command::Close) => {
                self.selector.clear();
                self.view = View::Contacts;
            }
            (_, Command::Ai { action, text }) => self.begin_ai(action, &text),
            (View::Conversation, Command::ScrollUp(rows)) => {
                self.selector.controller_mut().scroll_up(rows)
            }
            (View::Conversation, Command::ScrollDown(rows)) => {
                self.selector.controller_mut().scroll_down(rows)
            }
            (View::Conversation, Command::Say(text)) => self.send(&text),
            (_, Command::Say(_) | Command::ScrollUp(_) | Command::ScrollDown(_)) => {
                self.notice = Some("Open a conversation first with /open <n>".to_string())
            }
        }
        Flow::Continue
    }

    pub async fn handle_event(&mut self, event: AppEvent) {
        tracing::debug!(event = event.name(), "handling task result");
        if let Some(session) = event.session() {
            if session != self.session.generation() {
                tracing::debug!(event = event.name(), "discarding result from an earlier session");
                if let AppEvent::RealtimeReady { channel, .. } = event {
                    retire(channel);
                }
                return;
            }
        }

        match event {
            AppEvent::LoginFinished {
                result: Ok(LoginOutcome::Accepted(record)),
                ..
            } => {
                if let Err(error) = self.session.establish(record) {
                    tracing::warn!(error = %error, "failed to persist session");
                    self.notice = Some(format!("Could not save the session: {error}"));
                    return;
                }
                self.notice = None;
                self.enter_session();
            }
            AppEvent::LoginFinished {
                result: Ok(LoginOutcome::Rejected(message)),
                ..
            } => {
                self.notice = Some(message);
            }
            AppEvent::LoginFinished {
                result: Err(error), ..
            } => {
                tracing::warn!(error = %error, "login request failed");
                self.notice = Some("Login failed, please try again".to_string());
            }
            AppEvent::ContactsLoaded {
                result: Ok(contacts),
                ..
            } => {
                tracing::info!(count = contacts.len(), "contacts loaded");
                self.selector.set_contacts(contacts);
                if self.selector.active_peer().is_none() && self.view == View::Conversation {
                    self.view = View::Contacts;
                }
            }
            AppEvent::ContactsLoaded {
                result: Err(error), ..
            } => {
                tracing::warn!(error = %error, "failed to load contacts");
            }
            AppEvent::RealtimeReady {
                channel, inbound, ..
            } => {
                tracing::info!(endpoint = %self.realtime_endpoint, "realtime channel ready");
                retire(std::mem::replace(&mut self.channel, channel));
                self.inbound = Some(inbound);
            }
            AppEvent::RealtimeFailed { error, .. } => {
                tracing::warn!(
                    endpoint = %self.realtime_endpoint,
                    error = %error,
                    "realtime channel unavailable"
                );
                self.notice = Some(REALTIME_UNAVAILABLE.to_string());
            }
            AppEvent::HistoryLoaded { ticket, result } => {
                let history = match result {
                    Ok(history) => Some(history),
                    Err(error) => {
                        tracing::warn!(ticket = ticket.0, error = %error, "failed to load history");
                        None
                    }
                };
                self.selector.apply_history(ticket, history);
            }
            AppEvent::AiFinished { request, output } => {
                self.ai_panel.complete(request, output);
            }
        }
    }

    pub fn handle_inbound(&mut self, inbound: Option<InboundMessage>) {
        let Some(message) = inbound else {
            tracing::warn!("realtime subscription ended");
            self.inbound = None;
            self.notice = Some("Realtime connection lost; live messages are paused".to_string());
            return;
        };

        match self.selector.route_inbound(message) {
            InboundRoute::Active => tracing::debug!("inbound message appended"),
            InboundRoute::Duplicate => tracing::debug!("inbound echo ignored"),
            InboundRoute::Mailbox { peer_id, unread } => {
                tracing::debug!(peer_id = %peer_id, unread, "inbound message buffered");
            }
            InboundRoute::Dropped => {}
        }
    }

    pub fn render(&self) -> String {
        let notice = self.notice.as_deref();
        let username = self
            .session
            .current()
            .map(|record| record.username.as_str())
            .unwrap_or_default();

        match self.view {
            View::Login => terminal::render_login(notice),
            View::AvatarRequired => terminal::render_avatar_required(username, notice),
            View::Contacts => {
                let mut frame = terminal::render_contacts(username, &self.selector, notice);
                frame.push_str(&terminal::render_panel_only(&self.ai_panel));
                frame
            }
            View::Conversation => match self.selector.active_peer() {
                Some(peer) => terminal::render_conversation(
                    peer,
                    self.selector.controller(),
                    &self.ai_panel,
                    notice,
                ),
                None => terminal::render_contacts(username, &self.selector, notice),
            },
        }
    }

    async fn present<W: AsyncWrite + Unpin>(&mut self, out: &mut W) -> AppResult<()> {
        let frame = self.render();
        if frame == self.last_frame {
            return Ok(());
        }

        out.write_all(format!("\n{frame}").as_bytes())
            .await
            .context(WriteOutputSnafu {
                stage: "write-frame",
            })?;
        out.flush().await.context(WriteOutputSnafu {
            stage: "flush-frame",
        })?;
        self.last_frame = frame;
        Ok(())
    }

    fn enter_session(&mut self) {
        let Some(record) = self.session.current().cloned() else {
            self.view = View::Login;
            return;
        };

        if !record.is_avatar_image_set {
            tracing::info!(user_id = %record.id, "session has no avatar; contacts not loaded");
            self.view = View::AvatarRequired;
            return;
        }

        self.view = View::Contacts;
        self.spawn_contacts(record.id.clone());
        self.spawn_realtime(record.id);
    }

    /// Connects off the loop; the shell keeps serving input while the relay answers or times out.
    fn spawn_realtime(&mut self, self_id: UserId) {
        if let Err(error) = socket_url(&self.realtime_endpoint) {
            tracing::warn!(
                endpoint = %self.realtime_endpoint,
                error = %error,
                "realtime endpoint rejected"
            );
            self.notice = Some(REALTIME_UNAVAILABLE.to_string());
            return;
        }

        let session = self.session.generation();
        let endpoint = self.realtime_endpoint.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match open_realtime(&endpoint, &self_id).await {
                Ok((channel, inbound)) => AppEvent::RealtimeReady {
                    session,
                    channel,
                    inbound,
                },
                Err(error) => AppEvent::RealtimeFailed { session, error },
            };
            if let Err(unsent) = events.send(event) {
                if let AppEvent::RealtimeReady { channel, .. } = unsent.0 {
                    retire(channel);
                }
            }
        });
    }

    fn begin_login(&mut self, username: String, password: String) {
        if username.trim().is_empty() || password.is_empty() {
            self.notice = Some(CREDENTIALS_REQUIRED.to_string());
            return;
        }

        let session = self.session.generation();
        let backend = self.backend.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = backend.login(username.trim(), &password).await;
            let _ = events.send(AppEvent::LoginFinished { session, result });
        });
        self.notice = Some("Signing in…".to_string());
    }

    async fn logout(&mut self) {
        if let Err(error) = self.selector.logout(&mut self.session) {
            tracing::warn!(error = %error, "failed to clear persisted session");
        }
        self.inbound = None;
        self.channel.disconnect().await;
        self.ai_panel.reset();
        self.view = View::Login;
    }

    fn set_language(&mut self, language: &str) {
        match self.settings.set_translate_language(language) {
            Ok(settings) => {
                self.ai_panel.set_language(settings.translate_language.as_str());
                self.notice = Some(format!(
                    "Translations now target {}",
                    settings.translate_language
                ));
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to save translation language");
                self.notice = Some(format!("Could not save the language: {error}"));
            }
        }
    }

    fn open(&mut self, index: usize) {
        let Some(self_id) = self.session.current().map(|record| record.id.clone()) else {
            return;
        };
        let Some(peer_id) = self
            .selector
            .contacts()
            .get(index.saturating_sub(1))
            .filter(|_| index > 0)
            .map(|contact| contact.id.clone())
        else {
            self.notice = Some(format!("No contact #{index}; see /contacts"));
            return;
        };

        match self.selector.select(&peer_id) {
            Ok(ticket) => {
                self.view = View::Conversation;
                self.spawn_history(ticket, self_id, peer_id);
            }
            Err(SelectionRejection::UnknownContact(peer_id)) => {
                tracing::warn!(peer_id = %peer_id, "selection rejected");
            }
        }
    }

    fn send(&mut self, text: &str) {
        let Some(self_id) = self.session.current().map(|record| record.id.clone()) else {
            return;
        };
        let dispatch = ShellDispatch {
            channel: &self.channel,
            backend: self.backend.clone(),
        };

        match self
            .selector
            .controller_mut()
            .send_local(&self_id, text, &dispatch)
        {
            Ok(correlation_id) => {
                tracing::debug!(correlation_id = %correlation_id, "message sent");
            }
            Err(SendRejection::BlankMessage) => {}
            Err(SendRejection::NoActiveConversation) => {
                self.notice = Some("Open a conversation first with /open <n>".to_string());
            }
        }
    }

    fn begin_ai(&mut self, action: AiAction, text: &str) {
        let Some(job) = self
            .ai_panel
            .begin(action, text, self.selector.controller().messages())
        else {
            return;
        };

        let gateway = self.gateway.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let request = job.id;
            let output = job.run(&gateway).await;
            let _ = events.send(AppEvent::AiFinished { request, output });
        });
    }

    fn spawn_contacts(&self, self_id: UserId) {
        let session = self.session.generation();
        let backend = self.backend.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = backend.fetch_contacts(&self_id).await;
            let _ = events.send(AppEvent::ContactsLoaded { session, result });
        });
    }

    fn spawn_history(&self, ticket: HistoryTicket, self_id: UserId, peer_id: UserId) {
        let backend = self.backend.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = backend.fetch_history(&self_id, &peer_id).await;
            let _ = events.send(AppEvent::HistoryLoaded { ticket, result });
        });
    }
}

async fn open_realtime(
    endpoint: &str,
    self_id: &UserId,
) -> ChannelResult<(MessageChannel, InboundSubscription)> {
    let mut channel = MessageChannel::new();
    channel.connect(endpoint).await?;
    channel.announce(self_id)?;
    let inbound = channel.subscribe().await?;
    Ok((channel, inbound))
}

/// Closes a channel that is no longer wanted without holding up the caller.
fn retire(mut channel: MessageChannel) {
    if channel.is_connected() {
        tokio::spawn(async move { channel.disconnect().await });
    }
}

async fn next_inbound(subscription: &mut Option<InboundSubscription>) -> Option<InboundMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use smartchat_llm::{BoxFuture as LlmFuture, CompletionBackend, ProviderResult};
    use smartchat_storage::SessionRecord;
    use smartchat_transport::{
        BackendError, BackendResult, BoxFuture, Contact, HistoryEntry,
    };

    use super::*;
    use crate::session::testing::MemorySessionStore;
    use crate::settings::state::SETTINGS_FILE_NAME;
    use crate::terminal::{LOADING_MARKER, THINKING_MARKER};

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn contact(raw: &str, name: &str) -> Contact {
        Contact {
            id: user(raw),
            username: name.to_string(),
            avatar_image: String::new(),
        }
    }

    fn ada() -> SessionRecord {
        SessionRecord::new(user("a"), "ada").with_avatar("PHN2Zz4=")
    }

    struct FakeBackend {
        login: Mutex<Option<BackendResult<LoginOutcome>>>,
        contacts: Vec<Contact>,
        history: HashMap<UserId, Vec<HistoryEntry>>,
        contact_calls: Mutex<usize>,
        persisted: mpsc::UnboundedSender<(UserId, UserId, String)>,
    }

    impl ChatBackend for FakeBackend {
        fn login<'a>(
            &'a self,
            _username: &'a str,
            _password: &'a str,
        ) -> BoxFuture<'a, BackendResult<LoginOutcome>> {
            let outcome = self
                .login
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(LoginOutcome::Rejected("no script".to_string())));
            Box::pin(async move { outcome })
        }

        fn fetch_contacts<'a>(
            &'a self,
            _self_id: &'a UserId,
        ) -> BoxFuture<'a, BackendResult<Vec<Contact>>> {
            *self.contact_calls.lock().unwrap() += 1;
            let contacts = self.contacts.clone();
            Box::pin(async move { Ok(contacts) })
        }

        fn fetch_history<'a>(
            &'a self,
            _self_id: &'a UserId,
            peer_id: &'a UserId,
        ) -> BoxFuture<'a, BackendResult<Vec<HistoryEntry>>> {
            let history = self.history.get(peer_id).cloned();
            Box::pin(async move {
                history.ok_or(BackendError::UnexpectedStatus {
                    stage: "test",
                    route: "/api/messages/getmsg".to_string(),
                    status: 500,
                })
            })
        }

        fn persist_message<'a>(
            &'a self,
            from: &'a UserId,
            to: &'a UserId,
            text: &'a str,
        ) -> BoxFuture<'a, BackendResult<()>> {
            let _ = self
                .persisted
                .send((from.clone(), to.clone(), text.to_string()));
            Box::pin(async { Ok(()) })
        }
    }

    struct FixedCompletion(&'static str);

    impl CompletionBackend for FixedCompletion {
        fn id(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-model"
        }

        fn complete<'a>(&'a self, _prompt: &'a str) -> LlmFuture<'a, ProviderResult<Option<String>>> {
            let reply = self.0.to_string();
            Box::pin(async move { Ok(Some(reply)) })
        }
    }

    struct Harness {
        shell: ChatAppShell,
        store: Arc<MemorySessionStore>,
        backend: Arc<FakeBackend>,
        persisted: mpsc::UnboundedReceiver<(UserId, UserId, String)>,
        settings_dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(session: Option<SessionRecord>, login: Option<BackendResult<LoginOutcome>>) -> Self {
            // Not a URL, so the channel is refused without touching the network.
            Self::with_relay(session, login, "offline")
        }

        fn with_relay(
            session: Option<SessionRecord>,
            login: Option<BackendResult<LoginOutcome>>,
            realtime_endpoint: &str,
        ) -> Self {
            let store = Arc::new(match session {
                Some(record) => MemorySessionStore::holding(record),
                None => MemorySessionStore::default(),
            });
            let (persisted_tx, persisted) = mpsc::unbounded_channel();
            let backend = Arc::new(FakeBackend {
                login: Mutex::new(login),
                contacts: vec![contact("b", "bea"), contact("c", "cid")],
                history: HashMap::from([(user("b"), vec![HistoryEntry::new(false, "hi")])]),
                contact_calls: Mutex::new(0),
                persisted: persisted_tx,
            });
            let settings_dir = tempfile::tempdir().unwrap();
            let shell = ChatAppShell::new(ShellDeps {
                session: SessionContext::new(store.clone()),
                backend: backend.clone(),
                gateway: AiGateway::new(Arc::new(FixedCompletion("Sure, see you then!"))),
                realtime_endpoint: realtime_endpoint.to_string(),
                settings: SettingsStore::new(settings_dir.path().join(SETTINGS_FILE_NAME)),
            });
            Self {
                shell,
                store,
                backend,
                persisted,
                settings_dir,
            }
        }

        async fn pump(&mut self) {
            let event = self.shell.events_rx.recv().await.unwrap();
            self.shell.handle_event(event).await;
        }

        async fn logged_in() -> Self {
            let mut harness = Self::new(Some(ada()), None);
            harness.shell.start().await;
            harness.pump().await;
            harness
        }
    }

    #[tokio::test]
    async fn no_session_starts_at_login() {
        let mut harness = Harness::new(None, None);

        harness.shell.start().await;

        assert_eq!(harness.shell.view(), View::Login);
        assert!(harness.shell.render().contains("/login"));
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected_locally() {
        let mut harness = Harness::new(None, None);
        harness.shell.start().await;

        harness.shell.handle_line("/login ada").await;

        assert_eq!(harness.shell.notice(), Some(CREDENTIALS_REQUIRED));
        assert!(harness.shell.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_login_shows_server_message() {
        let mut harness = Harness::new(
            None,
            Some(Ok(LoginOutcome::Rejected("Incorrect Username or Password".to_string()))),
        );
        harness.shell.start().await;

        harness.shell.handle_line("/login ada nope").await;
        harness.pump().await;

        assert_eq!(harness.shell.view(), View::Login);
        assert_eq!(harness.shell.notice(), Some("Incorrect Username or Password"));
    }

    #[tokio::test]
    async fn accepted_login_persists_session_and_loads_contacts() {
        let mut harness = Harness::new(None, Some(Ok(LoginOutcome::Accepted(ada()))));
        harness.shell.start().await;

        harness.shell.handle_line("/login ada secret").await;
        harness.pump().await;
        assert_eq!(harness.shell.view(), View::Contacts);
        assert_eq!(*harness.store.record.lock().unwrap(), Some(ada()));

        harness.pump().await;
        assert_eq!(harness.shell.selector().contacts().len(), 2);
        let frame = harness.shell.render();
        assert!(frame.contains("signed in as ada"));
        assert!(frame.contains("Realtime connection unavailable"));
    }

    #[tokio::test]
    async fn session_without_avatar_skips_contacts() {
        let record = SessionRecord::new(user("a"), "ada");
        let mut harness = Harness::new(Some(record), None);

        harness.shell.start().await;

        assert_eq!(harness.shell.view(), View::AvatarRequired);
        assert_eq!(*harness.backend.contact_calls.lock().unwrap(), 0);
        harness.shell.handle_line("/open 1").await;
        assert_eq!(harness.shell.view(), View::AvatarRequired);
    }

    #[tokio::test]
    async fn open_load_and_send() {
        let mut harness = Harness::logged_in().await;

        harness.shell.handle_line("/open 1").await;
        assert_eq!(harness.shell.view(), View::Conversation);
        assert!(harness.shell.render().contains(LOADING_MARKER));

        harness.pump().await;
        harness.shell.handle_line("yo").await;

        let messages: Vec<(bool, String)> = harness
            .shell
            .selector()
            .controller()
            .messages()
            .iter()
            .map(|message| (message.from_self, message.text.clone()))
            .collect();
        assert_eq!(messages, vec![(false, "hi".to_string()), (true, "yo".to_string())]);
        assert_eq!(
            harness.persisted.recv().await.unwrap(),
            (user("a"), user("b"), "yo".to_string())
        );
        let frame = harness.shell.render();
        assert!(frame.contains("  bea: hi\n"));
        assert!(frame.contains("  you: yo\n"));
    }

    #[tokio::test]
    async fn failed_history_still_becomes_ready() {
        let mut harness = Harness::logged_in().await;

        harness.shell.handle_line("/open 2").await;
        harness.pump().await;

        let controller = harness.shell.selector().controller();
        assert!(!controller.is_loading());
        assert!(controller.messages().is_empty());
        assert!(!harness.shell.render().contains(LOADING_MARKER));
    }

    #[tokio::test]
    async fn inbound_for_closed_conversation_counts_unread() {
        let mut harness = Harness::logged_in().await;
        harness.shell.handle_line("/open 1").await;
        harness.pump().await;

        harness.shell.handle_inbound(Some(InboundMessage {
            from: Some(user("c")),
            text: "psst".to_string(),
            correlation_id: None,
        }));
        harness.shell.handle_line("/contacts").await;

        assert!(harness.shell.render().contains("cid (1 unread)"));
    }

    #[tokio::test]
    async fn ai_request_shows_thinking_until_answered() {
        let mut harness = Harness::logged_in().await;

        harness.shell.handle_line("/ai enhance are we still on for 6?").await;
        assert!(harness.shell.render().contains(THINKING_MARKER));

        harness.pump().await;
        let frame = harness.shell.render();
        assert!(!frame.contains(THINKING_MARKER));
        assert!(frame.contains("[AI] Sure, see you then!"));
    }

    #[tokio::test]
    async fn blank_ai_input_does_nothing() {
        let mut harness = Harness::logged_in().await;

        harness.shell.handle_line("/ai polish").await;

        assert!(!harness.shell.ai_panel().is_pending());
        assert!(harness.shell.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn plain_text_without_conversation_is_refused() {
        let mut harness = Harness::logged_in().await;

        harness.shell.handle_line("hello?").await;

        assert_eq!(
            harness.shell.notice(),
            Some("Open a conversation first with /open <n>")
        );
    }

    #[tokio::test]
    async fn logout_returns_to_login_and_clears_store() {
        let mut harness = Harness::logged_in().await;
        harness.shell.handle_line("/open 1").await;

        harness.shell.handle_line("/logout").await;

        assert_eq!(harness.shell.view(), View::Login);
        assert!(harness.store.record.lock().unwrap().is_none());
        assert!(harness.shell.selector().contacts().is_empty());
    }

    #[tokio::test]
    async fn silent_relay_does_not_block_the_shell() {
        // Accepts the dial and then never answers the websocket upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });
        let mut harness = Harness::with_relay(Some(ada()), None, &format!("http://{address}"));

        tokio::time::timeout(Duration::from_secs(1), harness.shell.start())
            .await
            .expect("startup waited on the relay");
        assert_eq!(harness.shell.view(), View::Contacts);

        harness.pump().await;
        assert_eq!(harness.shell.selector().contacts().len(), 2);
        harness.shell.handle_line("/open 1").await;
        assert_eq!(harness.shell.view(), View::Conversation);
        assert_eq!(harness.shell.handle_line("/quit").await, Flow::Quit);
    }

    #[tokio::test]
    async fn contacts_arriving_after_logout_are_discarded() {
        let mut harness = Harness::new(Some(ada()), None);
        harness.shell.start().await;
        let stale = harness.shell.events_rx.recv().await.unwrap();

        harness.shell.handle_line("/logout").await;
        harness.shell.handle_event(stale).await;

        assert_eq!(harness.shell.view(), View::Login);
        assert!(harness.shell.selector().contacts().is_empty());
    }

    #[tokio::test]
    async fn relogin_ignores_results_of_the_previous_session() {
        let mut harness = Harness::new(Some(ada()), None);
        harness.shell.start().await;
        let stale = harness.shell.events_rx.recv().await.unwrap();
        harness.shell.handle_line("/logout").await;

        let bea = SessionRecord::new(user("b"), "bea").with_avatar("PHN2Zz4=");
        *harness.backend.login.lock().unwrap() = Some(Ok(LoginOutcome::Accepted(bea)));
        harness.shell.handle_line("/login bea secret").await;
        harness.pump().await;
        assert_eq!(harness.shell.view(), View::Contacts);

        harness.shell.handle_event(stale).await;
        assert!(harness.shell.selector().contacts().is_empty());

        harness.pump().await;
        assert_eq!(harness.shell.selector().contacts().len(), 2);
        assert_eq!(*harness.backend.contact_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn language_command_updates_panel_and_settings_file() {
        let mut harness = Harness::logged_in().await;

        harness.shell.handle_line("/lang te").await;

        assert_eq!(harness.shell.ai_panel().language(), "te");
        assert_eq!(harness.shell.notice(), Some("Translations now target te"));
        let reloaded =
            SettingsStore::new(harness.settings_dir.path().join(SETTINGS_FILE_NAME)).settings();
        assert_eq!(reloaded.translate_language, "te");
    }

    #[tokio::test]
    async fn quit_ends_the_loop() {
        let mut harness = Harness::new(None, None);
        assert_eq!(harness.shell.handle_line("/quit").await, Flow::Quit);
    }
}
