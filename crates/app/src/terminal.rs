use std::fmt::Write as _;

use smartchat_transport::Contact;

use crate::chat::{AiAction, AiPanel, ContactSelector, ConversationController};

pub const LOADING_MARKER: &str = "loading…";
pub const THINKING_MARKER: &str = "thinking…";
const DEFAULT_SCROLL_ROWS: usize = 5;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Contacts,
    /// 1-based index into the contact list.
    Open(usize),
    Close,
    Ai { action: AiAction, text: String },
    ScrollUp(usize),
    ScrollDown(usize),
    /// Target language for `/ai translate`, saved to the settings file.
    Language(String),
    Logout,
    Quit,
    Help,
    Say(String),
    Invalid(String),
}

impl Command {
    /// Returns `None` for blank lines.
    ///
    /// Plain text is sent as typed. A leading `//` sends a message that starts with `/`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with("//") {
            return Some(Self::Say(line.replacen('/', "", 1)));
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Some(Self::Say(line.to_string()));
        };

        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map(|(name, args)| (name, args.trim()))
            .unwrap_or((rest, ""));

        let command = match name {
            "login" => {
                let mut parts = args.split_whitespace();
                Self::Login {
                    username: parts.next().unwrap_or_default().to_string(),
                    password: parts.next().unwrap_or_default().to_string(),
                }
            }
            "contacts" => Self::Contacts,
            "open" => match args.parse::<usize>() {
                Ok(index) if index > 0 => Self::Open(index),
                _ => Self::Invalid("usage: /open <number from /contacts>".to_string()),
            },
            "close" => Self::Close,
            "ai" => {
                let (action, text) = args
                    .split_once(char::is_whitespace)
                    .unwrap_or((args, ""));
                match action.parse::<AiAction>() {
                    Ok(action) => Self::Ai {
                        action,
                        text: text.trim().to_string(),
                    },
                    Err(message) => Self::Invalid(format!(
                        "{message}; try one of: {}",
                        AiAction::ALL.map(AiAction::name).join(", ")
                    )),
                }
            }
            "up" => Self::ScrollUp(parse_rows(args)),
            "down" => Self::ScrollDown(parse_rows(args)),
            "lang" if args.is_empty() => Self::Invalid("usage: /lang <language>".to_string()),
            "lang" => Self::Language(args.to_string()),
            "logout" => Self::Logout,
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            other => Self::Invalid(format!("unknown command /{other}; type /help")),
        };
        Some(command)
    }
}

fn parse_rows(args: &str) -> usize {
    args.parse().unwrap_or(DEFAULT_SCROLL_ROWS)
}

pub fn help_text() -> String {
    [
        "/login <username> <password>  sign in",
        "/contacts                     list contacts",
        "/open <n>                     open a conversation",
        "/close                        close the conversation",
        "/ai <action> <text>           enhance | polish | summarize | summarize-chat | translate | toxicity",
        "/up [n], /down [n]            scroll the conversation",
        "/lang <language>              set the translation language",
        "/logout, /quit",
        "//text                        send text starting with /",
        "anything else is sent to the open conversation",
    ]
    .join("\n")
}

pub fn render_login(notice: Option<&str>) -> String {
    let mut frame = String::from("SmartChat\nLog in with /login <username> <password>\n");
    push_notice(&mut frame, notice);
    frame
}

pub fn render_avatar_required(username: &str, notice: Option<&str>) -> String {
    let mut frame = format!(
        "SmartChat · {username}\nNo avatar is set for this account. Set one in the web client, then restart.\n/logout to switch accounts.\n"
    );
    push_notice(&mut frame, notice);
    frame
}

pub fn render_contacts(username: &str, selector: &ContactSelector, notice: Option<&str>) -> String {
    let mut frame = format!("SmartChat · signed in as {username}\n");
    if selector.contacts().is_empty() {
        frame.push_str("  (no contacts yet)\n");
    }
    for (index, contact) in selector.contacts().iter().enumerate() {
        let _ = write!(frame, "{:>3}. {}", index + 1, contact.username);
        let unread = selector.unread(&contact.id);
        if unread > 0 {
            let _ = write!(frame, " ({unread} unread)");
        }
        frame.push('\n');
    }
    frame.push_str("/open <n> to chat\n");
    push_notice(&mut frame, notice);
    frame
}

pub fn render_conversation(
    peer: &Contact,
    controller: &ConversationController,
    panel: &AiPanel,
    notice: Option<&str>,
) -> String {
    let mut frame = format!("── {} ──\n", peer.username);
    if controller.is_loading() {
        let _ = writeln!(frame, "{LOADING_MARKER}");
    }
    for message in controller.visible_messages() {
        let speaker = if message.from_self {
            "you"
        } else {
            peer.username.as_str()
        };
        let _ = writeln!(frame, "  {speaker}: {}", message.text);
    }
    let below = controller.scroll().rows_below();
    if below > 0 {
        let _ = writeln!(frame, "  ↓ {below} more (/down)");
    }
    push_ai_panel(&mut frame, panel);
    push_notice(&mut frame, notice);
    frame
}

fn push_ai_panel(frame: &mut String, panel: &AiPanel) {
    if panel.is_pending() {
        let _ = writeln!(frame, "[AI] {THINKING_MARKER}");
    } else if !panel.output().is_empty() {
        let _ = writeln!(frame, "[AI] {}", panel.output());
    }
}

fn push_notice(frame: &mut String, notice: Option<&str>) {
    if let Some(notice) = notice {
        let _ = writeln!(frame, "! {notice}");
    }
}

/// AI panel lines for views without a conversation.
pub fn render_panel_only(panel: &AiPanel) -> String {
    let mut frame = String::new();
    push_ai_panel(&mut frame, panel);
    frame
}
