//! Chat stream frames.
//!
//! A frame is one JSON object carried on one line of the agent chat stream:
//!
//! ```text
//! data: {"type":"session","session_id":"..."}
//! data: {"type":"content","content":"..."}
//! data: {"type":"tool_call","tool_name":"...","tool_args":{...}}
//! data: {"type":"tool_executing","tool_name":"..."}
//! data: {"type":"tool_result"}
//! data: {"type":"done"}
//! data: {"type":"error","message":"..."}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

/// One decoded frame of the chat stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Session identifier, if the backend attached one to this frame.
    pub session_id: Option<String>,
    /// What the frame carries.
    pub kind: FrameKind,
}

/// The kind-specific payload of a [`Frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Announces the session identifier.
    Session,
    /// A fragment of assistant text.
    Content(String),
    /// The assistant decided to call a tool.
    ToolCall {
        /// Tool name, when the backend sent one.
        tool_name: Option<String>,
        /// Tool arguments, when present and not `null`.
        tool_args: Option<Value>,
    },
    /// A tool is running on the backend.
    ToolExecuting {
        /// Tool name, when the backend sent one.
        tool_name: Option<String>,
        /// Tool arguments, when present and not `null`.
        tool_args: Option<Value>,
    },
    /// A tool finished.
    ToolResult,
    /// The backend finished the reply.
    Done,
    /// The backend reported a problem. The stream may continue.
    Error(Option<String>),
}

impl FrameKind {
    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Content(_) => "content",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolExecuting { .. } => "tool_executing",
            Self::ToolResult => "tool_result",
            Self::Done => "done",
            Self::Error(_) => "error",
        }
    }
}

/// Wire shape of a frame, keyed on the `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    Session,
    Content {
        #[serde(default)]
        content: Option<String>,
    },
    ToolCall {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        tool_args: Option<Value>,
    },
    ToolExecuting {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        tool_args: Option<Value>,
    },
    ToolResult,
    Done,
    Error {
        #[serde(default, alias = "error")]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Why a record could not be turned into a frame.
#[derive(Debug)]
pub(crate) enum Rejected {
    /// Not a JSON object, or a known kind with ill-typed fields.
    Malformed(String),
    /// A well-formed object whose `type` is not one we understand.
    UnknownKind(Option<String>),
}

impl Frame {
    /// Build a frame from one record of the stream (prefix already removed).
    pub(crate) fn parse(payload: &str) -> Result<Self, Rejected> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| Rejected::Malformed(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(Rejected::Malformed("payload is not a JSON object".to_string()));
        };

        let session_id = session_id_of(&object);
        let type_name = object.get("type").and_then(Value::as_str).map(String::from);

        let wire: WireFrame = serde_json::from_value(Value::Object(object))
            .map_err(|e| Rejected::Malformed(e.to_string()))?;

        let kind = match wire {
            WireFrame::Session => FrameKind::Session,
            WireFrame::Content { content } => FrameKind::Content(content.unwrap_or_default()),
            WireFrame::ToolCall {
                tool_name,
                tool_args,
            } => FrameKind::ToolCall {
                tool_name,
                tool_args: tool_args.filter(|v| !v.is_null()),
            },
            WireFrame::ToolExecuting {
                tool_name,
                tool_args,
            } => FrameKind::ToolExecuting {
                tool_name,
                tool_args: tool_args.filter(|v| !v.is_null()),
            },
            WireFrame::ToolResult => FrameKind::ToolResult,
            WireFrame::Done => FrameKind::Done,
            WireFrame::Error { message } => FrameKind::Error(message),
            // Dropped whole: a session_id on an unknown kind is not adopted.
            WireFrame::Unknown => return Err(Rejected::UnknownKind(type_name)),
        };

        Ok(Self { session_id, kind })
    }
}

/// Non-empty string `session_id` of a frame object.
fn session_id_of(object: &Map<String, Value>) -> Option<String> {
    object
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_frame_parses() {
        let frame = Frame::parse(r#"{"type":"session","session_id":"abc"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Session);
        assert_eq!(frame.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn content_frame_parses() {
        let frame = Frame::parse(r#"{"type":"content","content":"Hel"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Content("Hel".to_string()));
        assert!(frame.session_id.is_none());
    }

    #[test]
    fn content_frame_without_text_is_empty() {
        let frame = Frame::parse(r#"{"type":"content"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Content(String::new()));
    }

    #[test]
    fn tool_call_keeps_arguments() {
        let frame =
            Frame::parse(r#"{"type":"tool_call","tool_name":"search","tool_args":{"q":"x"}}"#)
                .unwrap();
        match frame.kind {
            FrameKind::ToolCall {
                tool_name,
                tool_args,
            } => {
                assert_eq!(tool_name.as_deref(), Some("search"));
                assert_eq!(tool_args, Some(json!({"q": "x"})));
            }
            other => panic!("Expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn null_tool_args_are_dropped() {
        let frame =
            Frame::parse(r#"{"type":"tool_executing","tool_name":"t","tool_args":null}"#).unwrap();
        assert_eq!(
            frame.kind,
            FrameKind::ToolExecuting {
                tool_name: Some("t".to_string()),
                tool_args: None,
            }
        );
    }

    #[test]
    fn error_frame_accepts_message_or_error_key() {
        let a = Frame::parse(r#"{"type":"error","message":"boom"}"#).unwrap();
        let b = Frame::parse(r#"{"type":"error","error":"boom"}"#).unwrap();
        assert_eq!(a.kind, FrameKind::Error(Some("boom".to_string())));
        assert_eq!(b.kind, FrameKind::Error(Some("boom".to_string())));
    }

    #[test]
    fn session_id_is_read_from_any_frame() {
        let frame = Frame::parse(r#"{"type":"done","session_id":"s-1"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Done);
        assert_eq!(frame.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn unknown_kind_is_rejected_as_unknown() {
        let err = Frame::parse(r#"{"type":"thinking","text":"hm"}"#).unwrap_err();
        assert!(matches!(err, Rejected::UnknownKind(Some(ref t)) if t == "thinking"));
    }

    #[test]
    fn unknown_kind_with_session_is_still_rejected() {
        let err = Frame::parse(r#"{"type":"thinking","session_id":"s-9"}"#).unwrap_err();
        assert!(matches!(err, Rejected::UnknownKind(_)));
    }

    #[test]
    fn missing_type_is_rejected() {
        assert!(Frame::parse(r#"{"content":"x"}"#).is_err());
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(Frame::parse("[1,2]"), Err(Rejected::Malformed(_))));
        assert!(matches!(Frame::parse("not json"), Err(Rejected::Malformed(_))));
    }

    #[test]
    fn kind_names_match_wire() {
        assert_eq!(FrameKind::Done.as_str(), "done");
        assert_eq!(FrameKind::Content(String::new()).as_str(), "content");
        assert_eq!(
            FrameKind::ToolCall {
                tool_name: None,
                tool_args: None
            }
            .as_str(),
            "tool_call"
        );
    }
}
