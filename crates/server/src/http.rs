//! HTTP implementations of the outbound seams: the Slack Web API client and
//! the relay sink. All failure classification happens here; retries live in
//! `intake_slack::api`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use intake_core::{DeliveryError, RelaySink, Submission};
use intake_slack::api::{ApiFailure, SlackApi, UserProfile};
use intake_slack::blocks::{Block, ButtonElement, MessageTemplate, PromptView, TextObject};

const SLACK_API_BASE_URL: &str = "https://slack.com/api";
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

pub struct HttpSlackApi {
    client: Client,
    bot_token: SecretString,
    base_url: String,
}

impl HttpSlackApi {
    pub fn new(client: Client, bot_token: SecretString) -> Self {
        Self { client, bot_token, base_url: SLACK_API_BASE_URL.to_owned() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call_method(&self, method: &'static str, body: Value) -> Result<Value, ApiFailure> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| ApiFailure::Transient(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok()),
            );
            return Err(ApiFailure::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(ApiFailure::Transient(format!("{method} returned {status}")));
        }
        if !status.is_success() {
            return Err(ApiFailure::Fatal(format!("{method} returned {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| ApiFailure::Transient(error.to_string()))?;

        // Slack reports most failures as HTTP 200 with `ok: false`.
        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let error =
                payload.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
            return Err(classify_slack_error(error));
        }

        Ok(payload)
    }
}

fn parse_retry_after(header: Option<&str>) -> Duration {
    header
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn classify_slack_error(error: &str) -> ApiFailure {
    match error {
        "ratelimited" => ApiFailure::RateLimited { retry_after: DEFAULT_RETRY_AFTER },
        "internal_error" | "service_unavailable" | "request_timeout" | "fatal_error" => {
            ApiFailure::Transient(error.to_owned())
        }
        other => ApiFailure::Fatal(other.to_owned()),
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    user: UserObject,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
    #[serde(default)]
    profile: Option<ProfileObject>,
}

#[derive(Debug, Deserialize)]
struct ProfileObject {
    #[serde(default)]
    real_name: Option<String>,
}

fn text_json(text: &TextObject) -> Value {
    match text {
        TextObject::Plain { text } => json!({ "type": "plain_text", "text": text }),
        TextObject::Mrkdwn { text } => json!({ "type": "mrkdwn", "text": text }),
    }
}

fn button_json(button: &ButtonElement) -> Value {
    let mut element = json!({
        "type": "button",
        "action_id": button.action_id,
        "text": text_json(&button.text),
    });
    if let Some(style) = &button.style {
        element["style"] = json!(style);
    }
    if let Some(value) = &button.value {
        element["value"] = json!(value);
    }
    element
}

fn blocks_json(blocks: &[Block]) -> Value {
    let rendered: Vec<Value> = blocks
        .iter()
        .map(|block| match block {
            Block::Section { block_id, text } => json!({
                "type": "section",
                "block_id": block_id,
                "text": text_json(text),
            }),
            Block::Actions { block_id, elements } => json!({
                "type": "actions",
                "block_id": block_id,
                "elements": elements.iter().map(button_json).collect::<Vec<_>>(),
            }),
            Block::Context { block_id, elements } => json!({
                "type": "context",
                "block_id": block_id,
                "elements": elements.iter().map(text_json).collect::<Vec<_>>(),
            }),
        })
        .collect();
    Value::Array(rendered)
}

fn view_json(view: &PromptView) -> Value {
    json!({
        "type": "modal",
        "callback_id": view.callback_id,
        "private_metadata": view.private_metadata,
        "title": text_json(&view.title),
        "submit": text_json(&view.submit_label),
        "blocks": [{
            "type": "input",
            "block_id": format!("{}_block", view.field_name),
            "label": text_json(&view.label),
            "element": {
                "type": "plain_text_input",
                "action_id": view.field_name,
            },
        }],
    })
}

#[async_trait]
impl SlackApi for HttpSlackApi {
    async fn user_info(&self, user_id: &str) -> Result<UserProfile, ApiFailure> {
        let payload = self.call_method("users.info", json!({ "user": user_id })).await?;
        let parsed: UserInfoResponse = serde_json::from_value(payload)
            .map_err(|error| ApiFailure::Fatal(format!("users.info response: {error}")))?;

        Ok(UserProfile {
            user_id: parsed.user.id,
            real_name: parsed.user.profile.and_then(|profile| profile.real_name),
        })
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), ApiFailure> {
        self.call_method(
            "chat.postMessage",
            json!({
                "channel": channel_id,
                "text": message.fallback_text,
                "blocks": blocks_json(&message.blocks),
            }),
        )
        .await
        .map(|_| ())
    }

    async fn replace_message(
        &self,
        channel_id: &str,
        message_ts: &str,
        message: &MessageTemplate,
    ) -> Result<(), ApiFailure> {
        self.call_method(
            "chat.update",
            json!({
                "channel": channel_id,
                "ts": message_ts,
                "text": message.fallback_text,
                "blocks": blocks_json(&message.blocks),
            }),
        )
        .await
        .map(|_| ())
    }

    async fn open_view(&self, trigger_id: &str, view: &PromptView) -> Result<(), ApiFailure> {
        self.call_method(
            "views.open",
            json!({
                "trigger_id": trigger_id,
                "view": view_json(view),
            }),
        )
        .await
        .map(|_| ())
    }
}

/// Posts completed submissions to the configured collection endpoint.
pub struct HttpRelaySink {
    client: Client,
    endpoint_url: String,
}

impl HttpRelaySink {
    pub fn new(client: Client, endpoint_url: impl Into<String>) -> Self {
        Self { client, endpoint_url: endpoint_url.into() }
    }
}

fn classify_delivery_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(DeliveryError::Rejected(format!("sink returned {status}")))
    } else {
        Err(DeliveryError::Unreachable(format!("sink returned {status}")))
    }
}

#[async_trait]
impl RelaySink for HttpRelaySink {
    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint_url)
            .json(&submission.to_json())
            .send()
            .await
            .map_err(|error| DeliveryError::Unreachable(error.to_string()))?;

        classify_delivery_status(response.status())
    }
}
