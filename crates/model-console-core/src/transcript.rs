//! Conversation state and the frame reducer.
//!
//! A [`Transcript`] is the ordered message history of one chat session plus
//! the session identifier the backend assigned. Frames are folded into it with
//! [`Transcript::apply`] (or the free [`reduce`]). Each exchange is bracketed
//! by [`Transcript::begin_exchange`] and one of
//! [`finish_stream`](Transcript::finish_stream),
//! [`complete_reply`](Transcript::complete_reply) or
//! [`fail_exchange`](Transcript::fail_exchange).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TranscriptError};
use crate::frame::{Frame, FrameKind};

/// Content given to an assistant reply that produced no text.
pub const EMPTY_REPLY: &str = "(无回复)";

/// Notice for an `error` frame without a message.
pub const GENERIC_STREAM_ERROR: &str = "发生错误";

/// Notice shown when an exchange is rolled back.
pub const EXCHANGE_FAILED: &str = "对话失败，请重试";

/// Tool name used when a tool frame does not name its tool.
pub const UNKNOWN_TOOL: &str = "未知工具";

const TOOL_RESULT_ANNOTATION: &str = "\n📊 工具执行完成\n\n";

// =============================================================================
// Messages
// =============================================================================

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The operator.
    User,
    /// The assistant.
    Assistant,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Text. Only grows while `is_streaming` is set.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Whether the assistant is still writing this message.
    pub is_streaming: bool,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, is_streaming: bool) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming,
        }
    }

    /// A finished user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, false)
    }

    /// A finished assistant message. Empty text becomes [`EMPTY_REPLY`].
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Assistant, content, false);
        if message.content.is_empty() {
            message.content = EMPTY_REPLY.to_string();
        }
        message
    }

    /// Returns true if the operator wrote this message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// =============================================================================
// Exchange mode
// =============================================================================

/// How the assistant's reply is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeMode {
    /// Incremental frames over a streaming response.
    #[default]
    Stream,
    /// One JSON response carrying the whole reply.
    Normal,
}

impl ExchangeMode {
    /// Wire/CLI name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Normal => "normal",
        }
    }

    /// The other mode.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Stream => Self::Normal,
            Self::Normal => Self::Stream,
        }
    }
}

impl fmt::Display for ExchangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(Self::Stream),
            "normal" => Ok(Self::Normal),
            other => Err(format!("unknown chat mode '{other}', expected 'stream' or 'normal'")),
        }
    }
}

// =============================================================================
// Transcript
// =============================================================================

/// What applying a frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEffect {
    /// The transcript or session changed.
    Updated,
    /// Nothing changed.
    Unchanged,
    /// The backend signalled normal termination.
    Completed,
    /// The backend reported a problem to surface to the operator.
    Notice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Exchange {
    /// Transcript length before the exchange began.
    checkpoint: usize,
    mode: ExchangeMode,
}

/// Ordered conversation history with its session identifier.
///
/// At most one message is streaming at a time, and it is always the last.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    session_id: Option<String>,
    exchange: Option<Exchange>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Session identifier adopted from the backend, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Returns true while an exchange is awaiting its outcome.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.exchange.is_some()
    }

    /// Mode of the exchange in flight.
    #[must_use]
    pub fn exchange_mode(&self) -> Option<ExchangeMode> {
        self.exchange.map(|e| e.mode)
    }

    /// The assistant message currently being streamed.
    #[must_use]
    pub fn in_progress(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.is_streaming)
    }

    fn in_progress_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut().filter(|m| m.is_streaming)
    }

    /// Start an exchange with the operator's `text`.
    ///
    /// Appends the trimmed user message and, in [`ExchangeMode::Stream`], an
    /// empty in-progress assistant message. Returns the trimmed text to send.
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::EmptyMessage`] if `text` is blank and
    /// [`TranscriptError::ExchangeInFlight`] if an exchange is already open.
    pub fn begin_exchange(&mut self, text: &str, mode: ExchangeMode) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TranscriptError::EmptyMessage);
        }
        if self.exchange.is_some() {
            return Err(TranscriptError::ExchangeInFlight);
        }

        self.exchange = Some(Exchange {
            checkpoint: self.messages.len(),
            mode,
        });
        self.messages.push(Message::user(text));
        if mode == ExchangeMode::Stream {
            self.messages.push(Message::new(Role::Assistant, String::new(), true));
        }

        Ok(text.to_string())
    }

    /// Fold one frame into the transcript.
    pub fn apply(&mut self, frame: &Frame) -> FrameEffect {
        let adopted = self.adopt_session(frame.session_id.as_deref());

        let appended = match &frame.kind {
            FrameKind::Session => false,
            FrameKind::Content(text) => self.append(text),
            FrameKind::ToolCall {
                tool_name,
                tool_args,
            }
            | FrameKind::ToolExecuting {
                tool_name,
                tool_args,
            } => self.append(&tool_call_annotation(
                tool_name.as_deref(),
                tool_args.as_ref(),
            )),
            FrameKind::ToolResult => self.append(TOOL_RESULT_ANNOTATION),
            FrameKind::Done => return FrameEffect::Completed,
            FrameKind::Error(message) => {
                let notice = message
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .unwrap_or(GENERIC_STREAM_ERROR);
                return FrameEffect::Notice(notice.to_string());
            }
        };

        if adopted || appended {
            FrameEffect::Updated
        } else {
            FrameEffect::Unchanged
        }
    }

    /// Finalize the in-progress message at end of stream and close the
    /// exchange. A reply with no text becomes [`EMPTY_REPLY`].
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::NoActiveExchange`] if nothing is in flight.
    pub fn finish_stream(&mut self) -> Result<()> {
        if self.exchange.take().is_none() {
            return Err(TranscriptError::NoActiveExchange);
        }
        if let Some(message) = self.in_progress_mut() {
            message.is_streaming = false;
            if message.content.is_empty() {
                message.content = EMPTY_REPLY.to_string();
            }
        }
        Ok(())
    }

    /// Complete a non-streaming exchange with the whole reply.
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::NoActiveExchange`] if nothing is in flight.
    pub fn complete_reply(&mut self, session_id: Option<&str>, text: &str) -> Result<()> {
        if self.exchange.take().is_none() {
            return Err(TranscriptError::NoActiveExchange);
        }
        self.adopt_session(session_id);

        // A streaming placeholder is replaced rather than left behind.
        if self.in_progress().is_some() {
            self.messages.pop();
        }
        self.messages.push(Message::assistant(text));
        Ok(())
    }

    /// Roll back the exchange in flight, restoring the transcript to its
    /// length before [`begin_exchange`](Self::begin_exchange).
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::NoActiveExchange`] if nothing is in flight.
    pub fn fail_exchange(&mut self) -> Result<()> {
        let exchange = self.exchange.take().ok_or(TranscriptError::NoActiveExchange)?;
        self.messages.truncate(exchange.checkpoint);
        Ok(())
    }

    /// Discard all messages, the session and any exchange in flight.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.session_id = None;
        self.exchange = None;
    }

    /// Adopt `id` if no session is known yet.
    fn adopt_session(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if self.session_id.is_none() && !id.is_empty() => {
                self.session_id = Some(id.to_string());
                true
            }
            _ => false,
        }
    }

    fn append(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        if let Some(message) = self.in_progress_mut() {
            message.content.push_str(text);
            true
        } else {
            tracing::debug!(len = text.len(), "Frame text arrived with no message in progress");
            false
        }
    }
}

/// Fold a frame into an owned transcript.
#[must_use]
pub fn reduce(mut transcript: Transcript, frame: &Frame) -> (Transcript, FrameEffect) {
    let effect = transcript.apply(frame);
    (transcript, effect)
}

fn tool_call_annotation(tool_name: Option<&str>, tool_args: Option<&Value>) -> String {
    let name = tool_name.filter(|n| !n.is_empty()).unwrap_or(UNKNOWN_TOOL);
    let mut annotation = format!("\n\n🔧 正在调用工具: {name}");
    if let Some(args) = tool_args {
        let pretty = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
        annotation.push_str("\n参数: ");
        annotation.push_str(&pretty);
    }
    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(kind: FrameKind) -> Frame {
        Frame {
            session_id: None,
            kind,
        }
    }

    fn content(text: &str) -> Frame {
        frame(FrameKind::Content(text.to_string()))
    }

    fn with_session(id: &str, kind: FrameKind) -> Frame {
        Frame {
            session_id: Some(id.to_string()),
            kind,
        }
    }

    fn streaming() -> Transcript {
        let mut t = Transcript::new();
        t.begin_exchange("Hi", ExchangeMode::Stream).unwrap();
        t
    }

    fn assert_single_in_progress(t: &Transcript) {
        let streaming: Vec<_> = t
            .messages()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_streaming)
            .map(|(i, _)| i)
            .collect();
        assert!(streaming.len() <= 1, "more than one in-progress message");
        if let Some(&i) = streaming.first() {
            assert_eq!(i, t.len() - 1, "in-progress message is not last");
        }
    }

    // =========================================================================
    // begin_exchange
    // =========================================================================

    #[test]
    fn begin_stream_adds_user_and_placeholder() {
        let t = streaming();
        assert_eq!(t.len(), 2);
        assert!(t.messages()[0].is_user());
        assert_eq!(t.messages()[0].content, "Hi");
        assert!(t.in_progress().is_some());
        assert!(t.is_sending());
        assert_eq!(t.exchange_mode(), Some(ExchangeMode::Stream));
    }

    #[test]
    fn begin_normal_adds_only_user() {
        let mut t = Transcript::new();
        let sent = t.begin_exchange("  hello  ", ExchangeMode::Normal).unwrap();
        assert_eq!(sent, "hello");
        assert_eq!(t.len(), 1);
        assert!(t.in_progress().is_none());
    }

    #[test]
    fn begin_rejects_blank_text() {
        let mut t = Transcript::new();
        assert_eq!(
            t.begin_exchange("   ", ExchangeMode::Stream),
            Err(TranscriptError::EmptyMessage)
        );
        assert!(t.is_empty());
        assert!(!t.is_sending());
    }

    #[test]
    fn begin_rejects_second_exchange() {
        let mut t = streaming();
        assert_eq!(
            t.begin_exchange("again", ExchangeMode::Stream),
            Err(TranscriptError::ExchangeInFlight)
        );
        assert_eq!(t.len(), 2);
    }

    // =========================================================================
    // apply
    // =========================================================================

    #[test]
    fn content_fragments_concatenate() {
        // Hel + lo -> Hello, finalized.
        let mut t = streaming();
        assert_eq!(t.apply(&content("Hel")), FrameEffect::Updated);
        assert_eq!(t.apply(&content("lo")), FrameEffect::Updated);
        assert!(t.in_progress().unwrap().is_streaming);
        assert_eq!(t.apply(&frame(FrameKind::Done)), FrameEffect::Completed);
        t.finish_stream().unwrap();

        let last = t.messages().last().unwrap();
        assert_eq!(last.content, "Hello");
        assert!(!last.is_streaming);
        assert!(!t.is_sending());
    }

    #[test]
    fn concatenation_is_exact() {
        let pieces = ["a ", "", " b", "\n", "中文", "  "];
        let mut t = streaming();
        for piece in pieces {
            t.apply(&content(piece));
        }
        t.finish_stream().unwrap();
        assert_eq!(t.messages().last().unwrap().content, pieces.concat());
    }

    #[test]
    fn empty_reply_gets_placeholder() {
        let mut t = streaming();
        t.apply(&with_session("s", FrameKind::Session));
        t.apply(&frame(FrameKind::Done));
        t.finish_stream().unwrap();
        assert_eq!(t.messages().last().unwrap().content, EMPTY_REPLY);
    }

    #[test]
    fn stream_end_without_done_finalizes() {
        let mut t = streaming();
        t.apply(&content("partial"));
        t.finish_stream().unwrap();
        let last = t.messages().last().unwrap();
        assert_eq!(last.content, "partial");
        assert!(!last.is_streaming);
    }

    #[test]
    fn tool_annotations_precede_completion() {
        let mut t = streaming();
        t.apply(&frame(FrameKind::ToolCall {
            tool_name: Some("search".to_string()),
            tool_args: Some(json!({"q": "x"})),
        }));
        t.apply(&frame(FrameKind::ToolResult));
        t.apply(&frame(FrameKind::Done));
        t.finish_stream().unwrap();

        let text = &t.messages().last().unwrap().content;
        let call = "\n\n🔧 正在调用工具: search\n参数: {\n  \"q\": \"x\"\n}";
        let call_at = text.find(call).expect("call annotation");
        let result_at = text.find("📊 工具执行完成").expect("result annotation");
        assert!(call_at < result_at);
        assert!(text.ends_with("\n📊 工具执行完成\n\n"));
    }

    #[test]
    fn tool_without_name_or_args() {
        let mut t = streaming();
        t.apply(&frame(FrameKind::ToolExecuting {
            tool_name: None,
            tool_args: None,
        }));
        assert_eq!(
            t.in_progress().unwrap().content,
            format!("\n\n🔧 正在调用工具: {UNKNOWN_TOOL}")
        );
    }

    #[test]
    fn first_session_id_wins() {
        let mut t = streaming();
        assert_eq!(
            t.apply(&with_session("first", FrameKind::Session)),
            FrameEffect::Updated
        );
        assert_eq!(
            t.apply(&with_session("second", FrameKind::Session)),
            FrameEffect::Unchanged
        );
        t.apply(&with_session("third", FrameKind::Content("x".to_string())));
        assert_eq!(t.session_id(), Some("first"));
    }

    #[test]
    fn session_id_on_content_frame_is_adopted() {
        let mut t = streaming();
        t.apply(&with_session("s-9", FrameKind::Content("x".to_string())));
        assert_eq!(t.session_id(), Some("s-9"));
    }

    #[test]
    fn error_frame_is_a_notice_and_stream_continues() {
        let mut t = streaming();
        t.apply(&content("a"));
        assert_eq!(
            t.apply(&frame(FrameKind::Error(Some("quota".to_string())))),
            FrameEffect::Notice("quota".to_string())
        );
        assert_eq!(
            t.apply(&frame(FrameKind::Error(None))),
            FrameEffect::Notice(GENERIC_STREAM_ERROR.to_string())
        );
        t.apply(&content("b"));
        assert_eq!(t.in_progress().unwrap().content, "ab");
    }

    #[test]
    fn content_without_exchange_is_ignored() {
        let mut t = Transcript::new();
        assert_eq!(t.apply(&content("stray")), FrameEffect::Unchanged);
        assert!(t.is_empty());
    }

    #[test]
    fn at_most_one_in_progress_message() {
        let mut t = Transcript::new();
        for round in 0..3 {
            t.begin_exchange(&format!("q{round}"), ExchangeMode::Stream)
                .unwrap();
            assert_single_in_progress(&t);
            t.apply(&content("r"));
            assert_single_in_progress(&t);
            if round == 1 {
                t.fail_exchange().unwrap();
            } else {
                t.finish_stream().unwrap();
            }
            assert_single_in_progress(&t);
            assert!(t.in_progress().is_none());
        }
        assert_eq!(t.len(), 4);
    }

    // =========================================================================
    // Settling an exchange
    // =========================================================================

    #[test]
    fn failure_rolls_back_to_checkpoint() {
        let mut t = streaming();
        t.apply(&content("done"));
        t.finish_stream().unwrap();
        let before: Vec<_> = t.messages().to_vec();

        t.begin_exchange("second", ExchangeMode::Stream).unwrap();
        t.apply(&content("half"));
        t.fail_exchange().unwrap();

        assert_eq!(t.messages(), before.as_slice());
        assert!(!t.is_sending());
    }

    #[test]
    fn failure_in_normal_mode_removes_user_message() {
        let mut t = Transcript::new();
        t.begin_exchange("q", ExchangeMode::Normal).unwrap();
        t.fail_exchange().unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn complete_reply_appends_finalized_message() {
        let mut t = Transcript::new();
        t.begin_exchange("q", ExchangeMode::Normal).unwrap();
        t.complete_reply(Some("sess"), "answer").unwrap();

        assert_eq!(t.len(), 2);
        let reply = &t.messages()[1];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "answer");
        assert!(!reply.is_streaming);
        assert_eq!(t.session_id(), Some("sess"));
    }

    #[test]
    fn complete_reply_with_empty_text_uses_placeholder() {
        let mut t = Transcript::new();
        t.begin_exchange("q", ExchangeMode::Normal).unwrap();
        t.complete_reply(None, "").unwrap();
        assert_eq!(t.messages()[1].content, EMPTY_REPLY);
        assert_eq!(t.session_id(), None);
    }

    #[test]
    fn settling_without_exchange_fails() {
        let mut t = Transcript::new();
        assert_eq!(t.finish_stream(), Err(TranscriptError::NoActiveExchange));
        assert_eq!(t.fail_exchange(), Err(TranscriptError::NoActiveExchange));
        assert_eq!(
            t.complete_reply(None, "x"),
            Err(TranscriptError::NoActiveExchange)
        );
    }

    #[test]
    fn clear_drops_messages_and_session() {
        let mut t = streaming();
        t.apply(&with_session("s", FrameKind::Content("x".to_string())));
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.session_id(), None);
        assert!(!t.is_sending());
    }

    #[test]
    fn reduce_folds_frames() {
        let frames = [
            with_session("s", FrameKind::Session),
            content("Hel"),
            content("lo"),
            frame(FrameKind::Done),
        ];
        let (t, effects) = frames.iter().fold(
            (streaming(), Vec::new()),
            |(t, mut effects), f| {
                let (t, effect) = reduce(t, f);
                effects.push(effect);
                (t, effects)
            },
        );
        assert_eq!(t.in_progress().unwrap().content, "Hello");
        assert_eq!(effects.last(), Some(&FrameEffect::Completed));
    }

    #[test]
    fn mode_parses_and_toggles() {
        assert_eq!("stream".parse::<ExchangeMode>(), Ok(ExchangeMode::Stream));
        assert_eq!(" Normal ".parse::<ExchangeMode>(), Ok(ExchangeMode::Normal));
        assert!("batch".parse::<ExchangeMode>().is_err());
        assert_eq!(ExchangeMode::Stream.toggled(), ExchangeMode::Normal);
        assert_eq!(ExchangeMode::Normal.to_string(), "normal");
    }
}
