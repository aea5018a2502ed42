//! OpenAI chat-completions wire types: the inbound request, the body sent
//! upstream and the buffered response returned to the caller.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::config::FeaturesConfig;
use crate::error::GatewayError;
use crate::routing::RouteTarget;

/// The fields of an inbound request the gateway reads. `messages` is kept as
/// raw JSON and forwarded byte for byte.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Empty when absent or `null`; both resolve to the default model.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub model: String,
    #[serde(default)]
    pub messages: Option<Box<RawValue>>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub thinking: Option<bool>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse and minimally validate an inbound request body.
///
/// # Errors
///
/// Returns `GatewayError::InvalidRequest` when the body is not JSON or has no
/// `messages`.
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, GatewayError> {
    let request: ChatRequest = serde_json::from_slice(body)
        .map_err(|err| GatewayError::InvalidRequest(format!("body is not valid JSON: {err}")))?;
    if request.messages.is_none() {
        return Err(GatewayError::InvalidRequest(
            "'messages' is required".to_string(),
        ));
    }
    Ok(request)
}

impl ChatRequest {
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Whether the caller asked for extended reasoning.
    #[must_use]
    pub fn wants_reasoning(&self) -> bool {
        if self.thinking == Some(true) {
            return true;
        }
        self.reasoning_effort.as_deref().is_some_and(|effort| {
            let effort = effort.trim();
            !effort.is_empty() && !effort.eq_ignore_ascii_case("none")
        })
    }

    /// Build the upstream body for the resolved route.
    ///
    /// `temperature` and `max_tokens` fall back to the configured defaults when
    /// absent or zero.
    #[must_use]
    pub fn to_upstream<'a>(
        &'a self,
        messages: &'a RawValue,
        target: &RouteTarget<'a>,
        features: &FeaturesConfig,
    ) -> UpstreamChatRequest<'a> {
        let temperature = self
            .temperature
            .filter(|value| *value != 0.0)
            .unwrap_or(features.default_temperature);
        let max_tokens = self
            .max_tokens
            .filter(|value| *value != 0)
            .unwrap_or(features.default_max_tokens);
        let thinking = target.thinking || features.enable_thinking_mode || self.wants_reasoning();

        UpstreamChatRequest {
            model: target.upstream_model,
            messages,
            temperature,
            max_tokens,
            chat_template_kwargs: thinking.then_some(TemplateKwargs { thinking: true }),
            stream: self.is_stream(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpstreamChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a RawValue,
    pub temperature: f64,
    pub max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_template_kwargs: Option<TemplateKwargs>,
    pub stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemplateKwargs {
    pub thinking: bool,
}

/// Buffered response handed back to the caller.
#[derive(Debug, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CompletionChoice {
    pub index: u64,
    pub message: CompletionMessage,
    pub finish_reason: Value,
}

#[derive(Debug, Serialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: Value,
}

impl ChatCompletion {
    /// Reshape an (already aggregated) upstream record. `usage` is copied
    /// verbatim; the model is reported under its public id.
    #[must_use]
    pub fn from_upstream(record: &Value, id: String, created: u64, public_model: &str) -> Self {
        let choices = record
            .get("choices")
            .and_then(Value::as_array)
            .map(|choices| {
                choices
                    .iter()
                    .enumerate()
                    .map(|(position, choice)| completion_choice(position, choice))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            object: "chat.completion",
            created,
            model: public_model.to_string(),
            choices,
            usage: record.get("usage").cloned(),
        }
    }
}

fn completion_choice(position: usize, choice: &Value) -> CompletionChoice {
    let message = choice.get("message");
    let role = message
        .and_then(|message| message.get("role"))
        .and_then(Value::as_str)
        .unwrap_or("assistant");
    CompletionChoice {
        index: choice
            .get("index")
            .and_then(Value::as_u64)
            .unwrap_or(position as u64),
        message: CompletionMessage {
            role: role.to_string(),
            content: message
                .and_then(|message| message.get("content"))
                .cloned()
                .unwrap_or(Value::Null),
        },
        finish_reason: choice.get("finish_reason").cloned().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteSource;
    use serde_json::json;

    fn target(thinking: bool) -> RouteTarget<'static> {
        RouteTarget {
            upstream_model: "deepseek-ai/deepseek-v3.1",
            thinking,
            source: RouteSource::Table,
        }
    }

    #[test]
    fn test_missing_messages_is_rejected() {
        let err = parse_chat_request(br#"{"model":"gpt-4o"}"#).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
        let err = parse_chat_request(br#"{"model":"gpt-4o","messages":null}"#).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn test_null_or_missing_model_is_empty() {
        for body in [
            br#"{"model":null,"messages":[]}"#.as_slice(),
            br#"{"messages":[]}"#.as_slice(),
        ] {
            let request = parse_chat_request(body).unwrap();
            assert_eq!(request.model, "");
        }
        let err = parse_chat_request(br#"{"model":7,"messages":[]}"#).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = parse_chat_request(b"{not json").unwrap_err();
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_body_forwards_messages_verbatim() {
        let body = br#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi","name":"x"}],"temperature":0.2,"max_tokens":50}"#;
        let request = parse_chat_request(body).unwrap();
        let messages = request.messages.as_deref().unwrap();
        let upstream = request.to_upstream(messages, &target(false), &FeaturesConfig::default());
        let encoded = serde_json::to_value(&upstream).unwrap();
        assert_eq!(
            encoded,
            json!({
                "model": "deepseek-ai/deepseek-v3.1",
                "messages": [{"role": "user", "content": "hi", "name": "x"}],
                "temperature": 0.2,
                "max_tokens": 50,
                "stream": false
            })
        );
        assert_eq!(
            upstream.messages.get(),
            r#"[{"role":"user","content":"hi","name":"x"}]"#
        );
    }

    #[test]
    fn test_zero_or_missing_sampling_values_use_defaults() {
        let features = FeaturesConfig::default();
        for body in [
            br#"{"messages":[],"temperature":0,"max_tokens":0}"#.as_slice(),
            br#"{"messages":[]}"#.as_slice(),
            br#"{"messages":[],"temperature":null}"#.as_slice(),
        ] {
            let request = parse_chat_request(body).unwrap();
            let messages = request.messages.as_deref().unwrap();
            let upstream = request.to_upstream(messages, &target(false), &features);
            assert!((upstream.temperature - 0.6).abs() < f64::EPSILON);
            assert_eq!(upstream.max_tokens, 9024);
        }
    }

    #[test]
    fn test_reasoning_hint_sources() {
        let features = FeaturesConfig::default();
        let plain = parse_chat_request(br#"{"messages":[]}"#).unwrap();
        let messages = plain.messages.as_deref().unwrap();
        assert_eq!(plain.to_upstream(messages, &target(false), &features).chat_template_kwargs, None);
        assert_eq!(
            plain.to_upstream(messages, &target(true), &features).chat_template_kwargs,
            Some(TemplateKwargs { thinking: true })
        );

        let global = FeaturesConfig {
            enable_thinking_mode: true,
            ..FeaturesConfig::default()
        };
        assert!(plain.to_upstream(messages, &target(false), &global).chat_template_kwargs.is_some());

        for body in [
            br#"{"messages":[],"thinking":true}"#.as_slice(),
            br#"{"messages":[],"reasoning_effort":"high"}"#.as_slice(),
        ] {
            let request = parse_chat_request(body).unwrap();
            assert!(request.wants_reasoning());
        }
        for body in [
            br#"{"messages":[],"thinking":false}"#.as_slice(),
            br#"{"messages":[],"reasoning_effort":"none"}"#.as_slice(),
            br#"{"messages":[],"reasoning_effort":""}"#.as_slice(),
        ] {
            let request = parse_chat_request(body).unwrap();
            assert!(!request.wants_reasoning());
        }
    }

    #[test]
    fn test_completion_reshapes_upstream_record() {
        let record = json!({
            "id": "upstream-id",
            "model": "deepseek-ai/deepseek-v3.1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "4", "extra": 1}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        });
        let completion =
            ChatCompletion::from_upstream(&record, "chatcmpl-abc".to_string(), 1_700_000_000, "gpt-4o");
        assert_eq!(
            serde_json::to_value(&completion).unwrap(),
            json!({
                "id": "chatcmpl-abc",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": "gpt-4o",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "4"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            })
        );
    }

    #[test]
    fn test_completion_tolerates_sparse_record() {
        let completion = ChatCompletion::from_upstream(&json!({}), "id".into(), 0, "m");
        assert!(completion.choices.is_empty());
        assert!(completion.usage.is_none());

        let record = json!({"choices": [{}, {"message": {"content": null}}]});
        let completion = ChatCompletion::from_upstream(&record, "id".into(), 0, "m");
        assert_eq!(completion.choices[1].index, 1);
        assert_eq!(completion.choices[1].message.role, "assistant");
        assert_eq!(completion.choices[0].finish_reason, Value::Null);
    }
}
