//! Wire format for the telephony media-stream socket.
//!
//! Twilio Media Streams delivers JSON text frames tagged by an `event` field.
//! The relay only acts on `start`, `media` and `stop`; everything else the
//! provider sends (`connected`, `mark`, future additions) is tolerated and
//! ignored rather than treated as a protocol violation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A frame received from the telephony socket.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// The stream is live; carries the stream id and caller parameters.
    Start { start: StartMeta },
    /// One chunk of caller audio.
    Media { media: MediaPayload },
    /// The call has ended.
    Stop,
    /// Any event tag the relay does not act on.
    #[serde(other)]
    Other,
}

/// Metadata attached to the `start` event.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartMeta {
    /// Opaque identifier the provider assigned to this media stream.
    /// Outbound frames must be addressed with it.
    pub stream_sid: String,
    /// Parameters the call-control document forwarded from the caller,
    /// e.g. `prompt` and `first_message`.
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

/// Base64-encoded audio, passed through the relay untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub payload: String,
}

/// A frame this relay sends back down the telephony socket.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// One chunk of agent audio, addressed to a specific stream.
    #[serde(rename_all = "camelCase")]
    Media {
        stream_sid: String,
        media: MediaPayload,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_start_with_custom_parameters() {
        let raw = r#"{
            "event": "start",
            "start": {
                "streamSid": "MZ0123",
                "customParameters": {"prompt": "Be terse", "first_message": "Hi there"}
            }
        }"#;
        let event: TelephonyEvent = serde_json::from_str(raw).unwrap();
        match event {
            TelephonyEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZ0123");
                assert_eq!(start.custom_parameters["prompt"], "Be terse");
                assert_eq!(start.custom_parameters["first_message"], "Hi there");
            }
            other => panic!("Expected start, got {other:?}"),
        }
    }

    #[test]
    fn parses_start_without_custom_parameters() {
        let raw = r#"{"event": "start", "start": {"streamSid": "MZ0123"}}"#;
        let event: TelephonyEvent = serde_json::from_str(raw).unwrap();
        match event {
            TelephonyEvent::Start { start } => assert!(start.custom_parameters.is_empty()),
            other => panic!("Expected start, got {other:?}"),
        }
    }

    #[test]
    fn parses_media_payload() {
        let raw = r#"{"event": "media", "media": {"payload": "dGVzdA=="}}"#;
        let event: TelephonyEvent = serde_json::from_str(raw).unwrap();
        match event {
            TelephonyEvent::Media { media } => assert_eq!(media.payload, "dGVzdA=="),
            other => panic!("Expected media, got {other:?}"),
        }
    }

    #[test]
    fn parses_stop_with_trailing_fields() {
        let raw = r#"{"event": "stop", "stop": {"callSid": "CA1"}}"#;
        let event: TelephonyEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, TelephonyEvent::Stop));
    }

    #[test]
    fn unknown_event_tags_are_tolerated() {
        let raw = r#"{"event": "connected", "protocol": "Call"}"#;
        let event: TelephonyEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, TelephonyEvent::Other));
    }

    #[test]
    fn outbound_media_frame_shape() {
        let frame = OutboundFrame::Media {
            stream_sid: "MZ0123".to_string(),
            media: MediaPayload {
                payload: "dGVzdA==".to_string(),
            },
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "media",
                "streamSid": "MZ0123",
                "media": {"payload": "dGVzdA=="}
            })
        );
    }
}
