use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use intake_core::workflow::{default_registry, WorkflowRegistry};
use intake_core::{NoopRelaySink, RelaySink};

use crate::api::{execute_with_retry, NoopSlackApi, RetryPolicy, SlackApi};
use crate::events::{
    default_dispatcher, EventContext, EventDispatcher, HandlerDeps, HandlerResult, SlackEnvelope,
    SlackEvent,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Socket Mode pump: receives envelopes, acknowledges them, and dispatches
/// each one with the collaborators injected per invocation. One failed event
/// never takes the loop down.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    api: Arc<dyn SlackApi>,
    relay: Arc<dyn RelaySink>,
    registry: Arc<WorkflowRegistry>,
    retry_policy: RetryPolicy,
}

impl Default for SocketModeRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopSocketTransport),
            dispatcher: default_dispatcher(),
            reconnect_policy: ReconnectPolicy::default(),
            api: Arc::new(NoopSlackApi),
            relay: Arc::new(NoopRelaySink),
            registry: Arc::new(default_registry()),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl SocketModeRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
        api: Arc<dyn SlackApi>,
        relay: Arc<dyn RelaySink>,
        registry: Arc<WorkflowRegistry>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy, api, relay, registry, retry_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let channel_id = channel_hint(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.as_deref().unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            let deps = HandlerDeps {
                api: self.api.as_ref(),
                relay: self.relay.as_ref(),
                registry: self.registry.as_ref(),
                retry_policy: &self.retry_policy,
            };

            match self.dispatcher.dispatch(&envelope, &context, deps).await {
                Ok(HandlerResult::Responded(outbound)) => {
                    let result = execute_with_retry(&self.retry_policy, "chat.postMessage", || {
                        self.api.post_message(&outbound.channel_id, &outbound.message)
                    })
                    .await;
                    if let Err(error) = result {
                        warn!(
                            envelope_id = %envelope.envelope_id,
                            correlation_id = %envelope.envelope_id,
                            channel_id = %outbound.channel_id,
                            error = %error,
                            "could not deliver handler response"
                        );
                    }
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        channel_id = channel_id.as_deref().unwrap_or("unknown"),
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            }
        }
    }
}

fn channel_hint(envelope: &SlackEnvelope) -> Option<String> {
    match &envelope.event {
        SlackEvent::Message(event) => Some(event.channel_id.clone()),
        SlackEvent::BlockAction(event) => Some(event.channel_id.clone()),
        SlackEvent::ViewSubmission(_) | SlackEvent::Unsupported { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use intake_core::workflow::default_registry;
    use intake_core::NoopRelaySink;

    use super::{
        ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError,
    };
    use crate::api::{ApiFailure, RetryPolicy, SlackApi, UserProfile};
    use crate::blocks::{MessageTemplate, PromptView};
    use crate::events::{
        default_dispatcher, EventDispatcher, MessageEvent, SlackEnvelope, SlackEvent,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        disconnect_results: VecDeque<Result<(), TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
            disconnect_results: Vec<Result<(), TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    disconnect_results: disconnect_results.into(),
                    connect_attempts: 0,
                    acknowledgements: Vec::new(),
                    disconnect_calls: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            state.disconnect_results.pop_front().unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct CountingApi {
        posts: AtomicUsize,
    }

    #[async_trait]
    impl SlackApi for CountingApi {
        async fn user_info(&self, user_id: &str) -> Result<UserProfile, ApiFailure> {
            Ok(UserProfile { user_id: user_id.to_owned(), real_name: Some("Ada".to_owned()) })
        }

        async fn post_message(
            &self,
            _channel_id: &str,
            _message: &MessageTemplate,
        ) -> Result<(), ApiFailure> {
            self.posts.fetch_add(1, Ordering::SeqCst);
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

        async fn open_view(
            &self,
            _trigger_id: &str,
            _view: &PromptView,
        ) -> Result<(), ApiFailure> {
            Ok(())
        }
    }

    fn runner_with(
        transport: Arc<ScriptedTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
        api: Arc<CountingApi>,
    ) -> SocketModeRunner {
        SocketModeRunner::new(
            transport,
            dispatcher,
            reconnect_policy,
            api,
            Arc::new(NoopRelaySink),
            Arc::new(default_registry()),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: SlackEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let runner = runner_with(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
            Arc::new(CountingApi::default()),
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            vec![],
        ));

        let runner = runner_with(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
            Arc::new(CountingApi::default()),
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn responded_messages_are_posted_through_the_api() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-greet".to_owned(),
                    event: SlackEvent::Message(MessageEvent {
                        channel_id: "C1".to_owned(),
                        user_id: "U1".to_owned(),
                        text: "hi".to_owned(),
                    }),
                })),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let api = Arc::new(CountingApi::default());
        let runner = runner_with(
            transport.clone(),
            default_dispatcher(),
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
            api.clone(),
        );

        runner.start().await.expect("runner");

        // the greeting itself from the handler, plus the menu posted by the
        // pump for the Responded result
        assert_eq!(api.posts.load(Ordering::SeqCst), 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-greet"]);
    }
}
