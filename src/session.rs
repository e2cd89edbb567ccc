//! Assistant conversation state.
//!
//! A [`Session`] lives exactly as long as the chat panel is open. It owns the
//! transcript, the text being typed, and the busy flag that keeps at most one
//! request in flight. Sending is split into [`Session::begin`] and
//! [`Session::resolve`] so the TUI can run the request on a background task;
//! [`Session::submit`] glues the two together for callers that can simply
//! await.

use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use crate::assistant::{AssistantClient, ChatReply, TransportError};

pub const GREETING: &str = "Hi! I'm the SinhgadConnect assistant. Ask me about campus life, \
placements, events, or anything the community has posted.";

/// Shown when the service answers but reports that it could not help.
pub const REPLY_ERROR: &str = "Sorry, I encountered an error. Please try again.";

/// Shown when the service could not be reached or answered with garbage.
pub const CONNECT_ERROR: &str =
    "Unable to connect to the server. Please make sure the assistant service is running.";

const SOURCE_TITLE_LIMIT: usize = 25;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Where an answer came from: community posts or general knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Community,
    General,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "community" => Some(Mode::Community),
            "general" => Some(Mode::General),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Community => "Community",
            Mode::General => "General",
        }
    }
}

/// A citation attached to an assistant answer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
}

impl Source {
    #[cfg(test)]
    pub fn new(id: Option<&str>, title: &str) -> Self {
        Self {
            id: id.map(str::to_string),
            title: title.to_string(),
        }
    }

    /// Title shortened for list display
    pub fn display_title(&self) -> String {
        if self.title.chars().count() > SOURCE_TITLE_LIMIT {
            let short: String = self.title.chars().take(SOURCE_TITLE_LIMIT).collect();
            format!("{}...", short)
        } else {
            self.title.clone()
        }
    }

    /// Link to the platform post this source cites, if it is one
    pub fn post_url(&self, base_url: &str) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("{}/post/{}", base_url.trim_end_matches('/'), id))
    }
}

// Post ids arrive as strings from some backends and as numbers from others.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub sources: Vec<Source>,
    pub mode: Option<Mode>,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            sources: Vec::new(),
            mode: None,
        }
    }

    /// Assistant text with no citations and no mode
    pub fn notice(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            sources: Vec::new(),
            mode: None,
        }
    }

    fn from_reply(reply: ChatReply) -> Self {
        let mode = reply.mode();
        Self {
            role: Role::Assistant,
            content: reply.answer.unwrap_or_default(),
            sources: reply.sources.unwrap_or_default(),
            mode: Some(mode),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    transcript: Vec<Message>,
    pending_input: String,
    cursor: usize, // character index into pending_input
    awaiting_response: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            transcript: vec![Message::notice(GREETING)],
            pending_input: String::new(),
            cursor: 0,
            awaiting_response: false,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Record a user message and mark the session busy.
    ///
    /// Returns the payload to send, or `None` when the text is blank or a
    /// request is already outstanding. In the `None` case nothing changes.
    pub fn begin(&mut self, text: &str) -> Option<String> {
        if self.awaiting_response {
            debug!("submit ignored: a request is already in flight");
            return None;
        }

        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.transcript.push(Message::user(text));
        self.pending_input.clear();
        self.cursor = 0;
        self.awaiting_response = true;
        debug!(chars = text.chars().count(), "dispatching assistant request");

        Some(text.to_string())
    }

    /// Send whatever is in the input box.
    pub fn submit_pending(&mut self) -> Option<String> {
        let text = self.pending_input.clone();
        self.begin(&text)
    }

    /// Append the reply (or a fallback) for the outstanding request and
    /// release the busy flag.
    pub fn resolve(&mut self, outcome: Result<ChatReply, TransportError>) {
        if !self.awaiting_response {
            debug!("reply dropped: no request outstanding");
            return;
        }

        let message = match outcome {
            Ok(reply) if reply.success => {
                info!(
                    sources = reply.sources.as_ref().map_or(0, Vec::len),
                    "assistant answered"
                );
                Message::from_reply(reply)
            }
            Ok(_) => {
                warn!("assistant reported failure");
                Message::notice(REPLY_ERROR)
            }
            Err(err) => {
                warn!(error = %err, "assistant request failed");
                Message::notice(CONNECT_ERROR)
            }
        };

        self.transcript.push(message);
        self.awaiting_response = false;
    }

    /// Dispatch `text` and wait for the answer in place.
    ///
    /// Returns whether a request was sent.
    pub async fn submit(&mut self, client: &AssistantClient, text: &str) -> bool {
        let Some(payload) = self.begin(text) else {
            return false;
        };
        let outcome = client.ask(&payload).await;
        self.resolve(outcome);
        true
    }

    // Input editing. The cursor counts characters, not bytes.

    pub fn set_pending_input(&mut self, text: &str) {
        self.pending_input = text.to_string();
        self.cursor = self.pending_input.chars().count();
    }

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.pending_input, self.cursor);
        self.pending_input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.pending_input, self.cursor);
            self.pending_input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.pending_input.chars().count() {
            let byte_pos = char_to_byte_index(&self.pending_input, self.cursor);
            self.pending_input.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.pending_input.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.pending_input.chars().count();
    }
}

fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
