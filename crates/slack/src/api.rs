use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{MessageTemplate, PromptView};

/// Classification of one failed platform call, produced by the concrete
/// client at the HTTP boundary. Only a rate-limit signal carries enough
/// information to retry safely: it tells us how long to wait.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiFailure {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("transient platform failure: {0}")]
    Transient(String),
    #[error("platform rejected the call: {0}")]
    Fatal(String),
}

/// What the call site sees once the retry wrapper is done. `RateLimited`
/// never appears here: it is absorbed by waiting, or converted to
/// `RetriesExhausted`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("transient platform failure calling `{operation}`: {message}")]
    Transient { operation: &'static str, message: String },
    #[error("platform rejected `{operation}`: {message}")]
    Fatal { operation: &'static str, message: String },
    #[error("`{operation}` still rate limited after {attempts} attempts")]
    RetriesExhausted { operation: &'static str, attempts: u32 },
}

impl CallError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Transient { .. } | Self::RetriesExhausted { .. } => {
                "Slack is temporarily unavailable. Please try again shortly."
            }
            Self::Fatal { .. } => "Slack rejected the request. Please contact an administrator.",
        }
    }
}

/// Immutable retry configuration. `base_delay` is the wait used when a
/// rate-limit response carries a degenerate zero hint; a real hint always
/// wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay: Duration::from_millis(200) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        // attempts are total, including the first; zero would mean "never
        // even try"
        Self { max_attempts: max_attempts.max(1), base_delay }
    }
}

/// Run `call` until it succeeds, fails for a reason waiting cannot fix, or
/// `policy.max_attempts` rate-limited attempts have been made (the first
/// attempt counts). The wait between attempts is the server-provided
/// retry-after hint, awaited on the runtime so concurrent event handling is
/// unaffected.
///
/// The wrapper is a pure control-flow decorator: no logging, no persistence,
/// no shared state.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiFailure>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match call().await {
            Ok(value) => return Ok(value),
            Err(ApiFailure::RateLimited { retry_after }) => {
                if attempt == max_attempts {
                    return Err(CallError::RetriesExhausted { operation, attempts: max_attempts });
                }
                let wait =
                    if retry_after.is_zero() { policy.base_delay } else { retry_after };
                tokio::time::sleep(wait).await;
            }
            Err(ApiFailure::Transient(message)) => {
                // no retry-after hint means no safe wait length; surface it
                return Err(CallError::Transient { operation, message });
            }
            Err(ApiFailure::Fatal(message)) => {
                return Err(CallError::Fatal { operation, message });
            }
        }
    }

    unreachable!("retry loop returns from its final iteration")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub real_name: Option<String>,
}

impl UserProfile {
    /// Name to greet the user by; falls back to an `<@id>` mention, which
    /// Slack renders as the profile name anyway.
    pub fn greeting_name(&self) -> String {
        match &self.real_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("<@{}>", self.user_id),
        }
    }
}

/// The outbound platform operations the handlers need. Implementations
/// classify their failures into [`ApiFailure`]; retries live one layer up in
/// [`execute_with_retry`].
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn user_info(&self, user_id: &str) -> Result<UserProfile, ApiFailure>;

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), ApiFailure>;

    async fn replace_message(
        &self,
        channel_id: &str,
        message_ts: &str,
        message: &MessageTemplate,
    ) -> Result<(), ApiFailure>;

    async fn open_view(&self, trigger_id: &str, view: &PromptView) -> Result<(), ApiFailure>;
}

#[derive(Default)]
pub struct NoopSlackApi;

#[async_trait]
impl SlackApi for NoopSlackApi {
    async fn user_info(&self, user_id: &str) -> Result<UserProfile, ApiFailure> {
        Ok(UserProfile { user_id: user_id.to_owned(), real_name: None })
    }

    async fn post_message(
        &self,
        _channel_id: &str,
        _message: &MessageTemplate,
    ) -> Result<(), ApiFailure> {
        Ok(())
    }

    async fn replace_message(
        &self,
        _channel_id: &str,
        _message_ts: &str,
        _message: &MessageTemplate,
    ) -> Result<(), ApiFailure> {
        Ok(())
    }

    async fn open_view(&self, _trigger_id: &str, _view: &PromptView) -> Result<(), ApiFailure> {
        Ok(())
    }
}
