//! Voice-agent wire protocol and its versioned dialects.
//!
//! The upstream agent provider speaks JSON events over a persistent socket,
//! but the schema has shipped in two revisions that disagree on the settings
//! layout and on which tag carries agent audio. All mapping between raw
//! frames and the relay's normalized [`AgentEvent`] therefore lives behind
//! the [`AgentDialect`] trait; session and link logic never touch raw frames.

use serde_json::{Value, json};
use std::collections::HashMap;

/// Instructions used when the caller supplied no prompt (or a blank one).
pub const DEFAULT_PROMPT: &str = "You are a friendly and helpful voice assistant \
on a phone call. Keep your answers short and conversational.";

/// Caller-supplied parameters captured from the telephony `start` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    pub prompt: Option<String>,
    pub first_message: Option<String>,
}

impl SessionParams {
    /// Extracts the recognized parameters from the stream's custom-parameter
    /// map. Unrecognized keys are ignored.
    pub fn from_custom_parameters(parameters: &HashMap<String, String>) -> Self {
        Self {
            prompt: parameters.get("prompt").cloned(),
            first_message: parameters.get("first_message").cloned(),
        }
    }

    /// The agent instructions: the caller's prompt, or [`DEFAULT_PROMPT`]
    /// when absent or blank.
    pub fn instructions(&self) -> &str {
        match self.prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => DEFAULT_PROMPT,
        }
    }

    /// The opening utterance, if a non-blank one was supplied.
    pub fn opening_line(&self) -> Option<&str> {
        self.first_message
            .as_deref()
            .filter(|message| !message.trim().is_empty())
    }
}

/// A normalized event received from the agent socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The provider acknowledged the connection or its configuration.
    Ack,
    /// One chunk of agent speech to relay back to the caller.
    Audio(String),
    /// A finalized line of conversation, from either side of the call.
    Text { role: String, content: String },
    /// Intermediate agent reasoning; informational only.
    Thinking(String),
    /// A fatal protocol error; the owning session must tear down.
    Error(String),
    /// A tag this dialect does not recognize; ignored, never an error.
    Unknown(String),
}

/// One revision of the provider's agent schema.
///
/// Command builders are pure: they wrap payloads unchanged (no transcoding)
/// and carry no state beyond their inputs.
pub trait AgentDialect: Send + Sync {
    /// Provider WebSocket endpoint for this schema revision.
    fn endpoint(&self) -> &'static str;

    /// The one-time configuration command sent after connect.
    fn settings(&self, params: &SessionParams) -> Value;

    /// The optional opening utterance command.
    fn opening_line(&self, text: &str) -> Value;

    /// One chunk of caller audio, payload passed through untouched.
    fn audio_input(&self, payload: &str) -> Value;

    /// The periodic liveness command.
    fn keepalive(&self) -> Value;

    /// Parses one inbound frame into a normalized event. Fails only on
    /// malformed JSON; unrecognized tags map to [`AgentEvent::Unknown`].
    fn parse_event(&self, raw: &str) -> serde_json::Result<AgentEvent>;
}

/// Which schema revision to speak, selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Nested `listen`/`think`/`speak` provider objects.
    V1,
    /// Flat `*_model` fields.
    Legacy,
}

impl SchemaVersion {
    pub fn dialect(self) -> &'static dyn AgentDialect {
        match self {
            SchemaVersion::V1 => &V1Dialect,
            SchemaVersion::Legacy => &LegacyDialect,
        }
    }
}

/// Audio declaration shared by both revisions: base64-encoded, 8 kHz
/// telephony rate in both directions.
fn audio_settings() -> Value {
    json!({
        "input": { "encoding": "base64", "sample_rate": 8000 },
        "output": { "encoding": "base64", "sample_rate": 8000 }
    })
}

fn text_at<'v>(value: &'v Value, pointer: &str) -> Option<&'v str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Maps the informational tags both revisions share. Returns `None` for
/// tags the caller must handle itself.
fn common_event(tag: &str, value: &Value) -> Option<AgentEvent> {
    match tag {
        "Welcome" | "SettingsApplied" => Some(AgentEvent::Ack),
        "ConversationText" => Some(AgentEvent::Text {
            role: text_at(value, "/role").unwrap_or("agent").to_string(),
            content: text_at(value, "/content").unwrap_or_default().to_string(),
        }),
        "AgentThinking" => Some(AgentEvent::Thinking(
            text_at(value, "/content").unwrap_or_default().to_string(),
        )),
        _ => None,
    }
}

/// Current schema: nested provider objects, instructions under
/// `agent.think.prompt`, agent audio arriving as `AudioData`.
pub struct V1Dialect;

impl AgentDialect for V1Dialect {
    fn endpoint(&self) -> &'static str {
        "wss://agent.deepgram.com/v1/agent/converse"
    }

    fn settings(&self, params: &SessionParams) -> Value {
        json!({
            "type": "Settings",
            "audio": audio_settings(),
            "agent": {
                "listen": { "provider": { "type": "deepgram", "model": "nova-3" } },
                "think": {
                    "provider": { "type": "open_ai", "model": "gpt-4o-mini" },
                    "prompt": params.instructions()
                },
                "speak": { "provider": { "type": "deepgram", "model": "aura-2-thalia-en" } }
            }
        })
    }

    fn opening_line(&self, text: &str) -> Value {
        json!({ "type": "Utterance", "text": text })
    }

    fn audio_input(&self, payload: &str) -> Value {
        json!({ "type": "Audio", "audio": { "payload": payload } })
    }

    fn keepalive(&self) -> Value {
        json!({ "type": "KeepAlive" })
    }

    fn parse_event(&self, raw: &str) -> serde_json::Result<AgentEvent> {
        let value: Value = serde_json::from_str(raw)?;
        let tag = text_at(&value, "/type").unwrap_or_default().to_string();
        Ok(match tag.as_str() {
            "AudioData" => match text_at(&value, "/data") {
                Some(payload) => AgentEvent::Audio(payload.to_string()),
                None => AgentEvent::Unknown(tag),
            },
            "Error" => AgentEvent::Error(
                text_at(&value, "/description")
                    .or_else(|| text_at(&value, "/message"))
                    .unwrap_or("unspecified agent error")
                    .to_string(),
            ),
            _ => common_event(&tag, &value).unwrap_or(AgentEvent::Unknown(tag)),
        })
    }
}

/// Earlier schema: flat model fields, instructions under
/// `agent.instructions`, agent audio arriving as `AgentAudio`.
pub struct LegacyDialect;

impl AgentDialect for LegacyDialect {
    fn endpoint(&self) -> &'static str {
        "wss://agent.deepgram.com/agent"
    }

    fn settings(&self, params: &SessionParams) -> Value {
        json!({
            "type": "Settings",
            "audio": audio_settings(),
            "agent": {
                "listen_model": "nova-2",
                "think_model": "gpt-4o-mini",
                "speak_model": "aura-asteria-en",
                "instructions": params.instructions()
            }
        })
    }

    fn opening_line(&self, text: &str) -> Value {
        json!({ "type": "Speak", "text": text })
    }

    fn audio_input(&self, payload: &str) -> Value {
        json!({ "type": "Speak", "audio": { "payload": payload } })
    }

    fn keepalive(&self) -> Value {
        json!({ "type": "KeepAlive" })
    }

    fn parse_event(&self, raw: &str) -> serde_json::Result<AgentEvent> {
        let value: Value = serde_json::from_str(raw)?;
        let tag = text_at(&value, "/type").unwrap_or_default().to_string();
        Ok(match tag.as_str() {
            "AgentAudio" => match text_at(&value, "/audio/payload") {
                Some(payload) => AgentEvent::Audio(payload.to_string()),
                None => AgentEvent::Unknown(tag),
            },
            "Error" => AgentEvent::Error(
                text_at(&value, "/message")
                    .or_else(|| text_at(&value, "/description"))
                    .unwrap_or("unspecified agent error")
                    .to_string(),
            ),
            _ => common_event(&tag, &value).unwrap_or(AgentEvent::Unknown(tag)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_fall_back_to_the_default() {
        assert_eq!(SessionParams::default().instructions(), DEFAULT_PROMPT);
        let blank = SessionParams {
            prompt: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.instructions(), DEFAULT_PROMPT);
        let custom = SessionParams {
            prompt: Some("Be terse".to_string()),
            ..Default::default()
        };
        assert_eq!(custom.instructions(), "Be terse");
    }

    #[test]
    fn blank_first_message_means_no_opening_line() {
        assert_eq!(SessionParams::default().opening_line(), None);
        let blank = SessionParams {
            first_message: Some("".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.opening_line(), None);
        let greeting = SessionParams {
            first_message: Some("Hi there".to_string()),
            ..Default::default()
        };
        assert_eq!(greeting.opening_line(), Some("Hi there"));
    }

    #[test]
    fn from_custom_parameters_picks_recognized_keys() {
        let mut raw = HashMap::new();
        raw.insert("prompt".to_string(), "Be terse".to_string());
        raw.insert("first_message".to_string(), "Hi there".to_string());
        raw.insert("unrelated".to_string(), "x".to_string());
        let params = SessionParams::from_custom_parameters(&raw);
        assert_eq!(params.prompt.as_deref(), Some("Be terse"));
        assert_eq!(params.first_message.as_deref(), Some("Hi there"));
    }

    #[test]
    fn v1_settings_carry_instructions_in_the_think_prompt() {
        let params = SessionParams {
            prompt: Some("Be terse".to_string()),
            ..Default::default()
        };
        let settings = V1Dialect.settings(&params);
        assert_eq!(settings["type"], "Settings");
        assert_eq!(
            settings.pointer("/agent/think/prompt").and_then(Value::as_str),
            Some("Be terse")
        );
        assert_eq!(
            settings.pointer("/audio/input/sample_rate").and_then(Value::as_i64),
            Some(8000)
        );
        assert_eq!(
            settings.pointer("/audio/output/encoding").and_then(Value::as_str),
            Some("base64")
        );
    }

    #[test]
    fn legacy_settings_carry_flat_instructions() {
        let settings = LegacyDialect.settings(&SessionParams::default());
        assert_eq!(
            settings.pointer("/agent/instructions").and_then(Value::as_str),
            Some(DEFAULT_PROMPT)
        );
        assert!(settings.pointer("/agent/listen_model").is_some());
        assert!(settings.pointer("/agent/think").is_none());
    }

    #[test]
    fn audio_input_passes_the_payload_through() {
        let payload = "dGVzdA==";
        assert_eq!(
            V1Dialect.audio_input(payload).pointer("/audio/payload"),
            Some(&Value::from(payload))
        );
        assert_eq!(
            LegacyDialect.audio_input(payload).pointer("/audio/payload"),
            Some(&Value::from(payload))
        );
    }

    #[test]
    fn opening_line_commands_carry_the_text() {
        assert_eq!(
            V1Dialect.opening_line("Hi there"),
            json!({ "type": "Utterance", "text": "Hi there" })
        );
        assert_eq!(
            LegacyDialect.opening_line("Hi there"),
            json!({ "type": "Speak", "text": "Hi there" })
        );
    }

    #[test]
    fn keepalive_is_a_bare_tagged_command() {
        assert_eq!(V1Dialect.keepalive()["type"], "KeepAlive");
        assert_eq!(LegacyDialect.keepalive()["type"], "KeepAlive");
    }

    #[test]
    fn v1_parses_its_audio_tag() {
        let event = V1Dialect
            .parse_event(r#"{"type": "AudioData", "data": "dGVzdA=="}"#)
            .unwrap();
        assert_eq!(event, AgentEvent::Audio("dGVzdA==".to_string()));
    }

    #[test]
    fn legacy_parses_its_audio_tag() {
        let event = LegacyDialect
            .parse_event(r#"{"type": "AgentAudio", "audio": {"payload": "dGVzdA=="}}"#)
            .unwrap();
        assert_eq!(event, AgentEvent::Audio("dGVzdA==".to_string()));
    }

    #[test]
    fn error_events_are_fatal_in_both_revisions() {
        let v1 = V1Dialect
            .parse_event(r#"{"type": "Error", "description": "bad settings"}"#)
            .unwrap();
        assert_eq!(v1, AgentEvent::Error("bad settings".to_string()));
        let legacy = LegacyDialect
            .parse_event(r#"{"type": "Error", "message": "bad settings"}"#)
            .unwrap();
        assert_eq!(legacy, AgentEvent::Error("bad settings".to_string()));
    }

    #[test]
    fn conversation_and_thinking_are_informational() {
        let text = V1Dialect
            .parse_event(r#"{"type": "ConversationText", "role": "user", "content": "hello"}"#)
            .unwrap();
        assert_eq!(
            text,
            AgentEvent::Text {
                role: "user".to_string(),
                content: "hello".to_string()
            }
        );
        let thinking = LegacyDialect
            .parse_event(r#"{"type": "AgentThinking", "content": "hmm"}"#)
            .unwrap();
        assert_eq!(thinking, AgentEvent::Thinking("hmm".to_string()));
    }

    #[test]
    fn unknown_tags_never_fail() {
        let event = V1Dialect
            .parse_event(r#"{"type": "SomeFutureEvent", "x": 1}"#)
            .unwrap();
        assert_eq!(event, AgentEvent::Unknown("SomeFutureEvent".to_string()));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(V1Dialect.parse_event("{not json").is_err());
        assert!(LegacyDialect.parse_event("").is_err());
    }
}
