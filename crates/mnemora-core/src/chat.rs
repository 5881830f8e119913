//! Chat transcript and the streaming reducer for one query.
//!
//! A query produces exactly one assistant message. The driver pushes the
//! user message and an empty assistant placeholder, then feeds every
//! decoded [`QueryEvent`] to a [`ChatReducer`]. The placeholder is the
//! *in-flight* message: the last element of the transcript, growing with
//! every token until `done` attaches the citations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::QueryEvent;
use crate::models::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            sources: None,
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            sources: None,
            is_error: false,
        }
    }

    /// A visually distinct assistant entry carrying a fatal error.
    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            is_error: true,
            ..Self::assistant(format!("Error: {}", message.as_ref()))
        }
    }
}

/// Ordered chat history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Append the empty assistant message that tokens will stream into.
    pub fn push_placeholder(&mut self) {
        self.messages.push(Message::assistant(String::new()));
    }

    pub fn push_error(&mut self, message: impl AsRef<str>) {
        self.messages.push(Message::error(message));
    }

    /// The last message, if it is a non-error assistant message.
    pub fn in_flight_mut(&mut self) -> Option<&mut Message> {
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant && !m.is_error)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Result of folding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStep {
    Continue,
    /// New citations arrived; the live sources panel should refresh.
    SourcesUpdated,
    Completed,
    /// The backend reported a failure. The caller appends an error entry.
    Failed(String),
    Ignored,
}

/// Per-query accumulator. One instance per `POST /query` stream.
#[derive(Debug, Default)]
pub struct ChatReducer {
    accumulated: String,
    sources: Vec<Source>,
    finished: bool,
    tokens: u64,
}

impl ChatReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content accumulated so far.
    pub fn content(&self) -> &str {
        &self.accumulated
    }

    /// Working citation list.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn token_count(&self) -> u64 {
        self.tokens
    }

    /// Fold one record, writing into the in-flight message of `transcript`.
    pub fn apply(&mut self, transcript: &mut Transcript, event: QueryEvent) -> ChatStep {
        if self.finished {
            return ChatStep::Ignored;
        }

        match event {
            QueryEvent::Sources { sources } => {
                self.sources = sources;
                ChatStep::SourcesUpdated
            }
            QueryEvent::Token { content } => {
                self.accumulated.push_str(&content);
                self.tokens += 1;
                if let Some(msg) = transcript.in_flight_mut() {
                    msg.content.clone_from(&self.accumulated);
                }
                ChatStep::Continue
            }
            QueryEvent::Done => {
                self.attach_sources(transcript);
                self.finished = true;
                ChatStep::Completed
            }
            QueryEvent::Error { message } => {
                self.finished = true;
                ChatStep::Failed(message)
            }
            QueryEvent::Unknown => ChatStep::Ignored,
        }
    }

    /// Close a stream that ended without `done`: the partial content stays
    /// and the citations received so far are attached. Returns `false`
    /// when the query had already finished.
    pub fn finish_partial(&mut self, transcript: &mut Transcript) -> bool {
        if self.finished {
            return false;
        }
        self.attach_sources(transcript);
        self.finished = true;
        true
    }

    /// Stop folding after a transport failure. The in-flight message keeps
    /// whatever content it has.
    pub fn abort(&mut self) -> bool {
        !std::mem::replace(&mut self.finished, true)
    }

    fn attach_sources(&self, transcript: &mut Transcript) {
        if let Some(msg) = transcript.in_flight_mut() {
            msg.sources = Some(self.sources.clone());
        }
    }
}
