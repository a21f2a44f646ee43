use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use intake_core::workflow::WorkflowRegistry;
use intake_core::{DecodeError, DeliveryError, RelaySink, TransitionError};

use crate::api::{CallError, RetryPolicy, SlackApi};
use crate::blocks::MessageTemplate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    BlockAction(BlockActionEvent),
    ViewSubmission(ViewSubmissionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    BlockAction,
    ViewSubmission,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub user_id: String,
    pub action_id: String,
    pub value: Option<String>,
    pub trigger_id: String,
}

/// A modal submission. `private_metadata` is the context token the modal
/// was opened with, returned unchanged by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSubmissionEvent {
    pub user_id: String,
    pub callback_id: String,
    pub private_metadata: Option<String>,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Collaborators handed to every handler invocation. Handlers never reach
/// for an ambient client: everything they are allowed to call arrives here.
#[derive(Clone, Copy)]
pub struct HandlerDeps<'a> {
    pub api: &'a dyn SlackApi,
    pub relay: &'a dyn RelaySink,
    pub registry: &'a WorkflowRegistry,
    pub retry_policy: &'a RetryPolicy,
}

/// A message the transport should deliver on the handler's behalf once
/// dispatch returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub message: MessageTemplate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(OutboundMessage),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Api(#[from] CallError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
        deps: HandlerDeps<'_>,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Typed dispatch table keyed by event kind. Built once at bootstrap and
/// read-only afterwards.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
        deps: HandlerDeps<'_>,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx, deps).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(crate::handlers::GreetingHandler);
    dispatcher.register(crate::handlers::WorkflowTriggerHandler);
    dispatcher.register(crate::handlers::InputSubmittedHandler);
    dispatcher
}
