//! Telephony provider access: outbound call initiation and the call-control
//! document. The REST call is the only thing here that touches the network;
//! URL and TwiML rendering are pure so the parameter round-trip (request →
//! callback URL → control document → stream `start` event) can be tested
//! directly.

use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Issues outbound calls through the telephony provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallIssuer: Send + Sync {
    /// Requests a new call to `to`, directing the provider to fetch its
    /// call-control document from `callback_url`. Returns the provider's
    /// call identifier.
    async fn initiate_call(&self, to: &str, callback_url: &str) -> Result<String>;
}

/// `CallIssuer` backed by the Twilio REST API.
pub struct TwilioIssuer {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioIssuer {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_from_number.clone(),
        }
    }
}

#[derive(Deserialize)]
struct CallResource {
    sid: String,
}

#[async_trait]
impl CallIssuer for TwilioIssuer {
    async fn initiate_call(&self, to: &str, callback_url: &str) -> Result<String> {
        let endpoint = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            TWILIO_API_BASE, self.account_sid
        );
        let response = self
            .http
            .post(&endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Url", callback_url),
            ])
            .send()
            .await
            .context("Failed to reach the Twilio API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Twilio rejected the call request ({status}): {body}"));
        }

        let call: CallResource = response
            .json()
            .await
            .context("Unexpected Twilio response body")?;
        Ok(call.sid)
    }
}

/// Builds the absolute callback URL for the control-document endpoint,
/// percent-encoding the caller parameters so they survive the round trip
/// back into the stream's `start` event.
pub fn callback_url(host: &str, prompt: Option<&str>, first_message: Option<&str>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if let Some(prompt) = prompt {
        serializer.append_pair("prompt", prompt);
    }
    if let Some(first_message) = first_message {
        serializer.append_pair("first_message", first_message);
    }
    let query = serializer.finish();

    if query.is_empty() {
        format!("https://{host}/outbound-call-twiml")
    } else {
        format!("https://{host}/outbound-call-twiml?{query}")
    }
}

/// Renders the TwiML control document: connect the call's media stream to
/// this relay and re-emit the caller parameters as stream parameters.
pub fn stream_twiml(host: &str, prompt: Option<&str>, first_message: Option<&str>) -> String {
    let mut parameters = String::new();
    for (name, value) in [("prompt", prompt), ("first_message", first_message)] {
        if let Some(value) = value {
            parameters.push_str(&format!(
                "\n      <Parameter name=\"{name}\" value=\"{}\" />",
                xml_escape(value)
            ));
        }
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="wss://{host}/outbound-media-stream">{parameters}
    </Stream>
  </Connect>
</Response>"#
    )
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use url::Url;

    #[test]
    fn callback_url_without_parameters_has_no_query() {
        assert_eq!(
            callback_url("relay.example.com", None, None),
            "https://relay.example.com/outbound-call-twiml"
        );
    }

    #[test]
    fn callback_url_parameters_survive_a_round_trip() {
        let url = callback_url(
            "relay.example.com:8000",
            Some("Be terse & kind, 100%"),
            Some("¡Hola! ¿Qué tal?"),
        );
        let parsed = Url::parse(&url).unwrap();
        let pairs: HashMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs["prompt"], "Be terse & kind, 100%");
        assert_eq!(pairs["first_message"], "¡Hola! ¿Qué tal?");
    }

    #[test]
    fn twiml_points_the_stream_at_this_relay() {
        let xml = stream_twiml("relay.example.com", None, None);
        assert!(xml.contains("<Stream url=\"wss://relay.example.com/outbound-media-stream\">"));
        assert!(!xml.contains("<Parameter"));
    }

    #[test]
    fn twiml_reemits_escaped_parameters() {
        let xml = stream_twiml("relay.example.com", Some("Say \"hi\" & <wait>"), Some("Hi"));
        assert!(xml.contains(
            "<Parameter name=\"prompt\" value=\"Say &quot;hi&quot; &amp; &lt;wait&gt;\" />"
        ));
        assert!(xml.contains("<Parameter name=\"first_message\" value=\"Hi\" />"));
    }

    #[test]
    fn xml_escape_covers_the_reserved_set() {
        assert_eq!(xml_escape("a&b<c>d\"e'f"), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
        assert_eq!(xml_escape("plain"), "plain");
    }
}
