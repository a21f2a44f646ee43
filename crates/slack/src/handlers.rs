use async_trait::async_trait;
use tracing::{debug, warn};

use intake_core::workflow::{self, TransitionOutcome, WorkflowDefinition};
use intake_core::{ContextToken, ConversationContext, Submission};

use crate::api::execute_with_retry;
use crate::blocks::{
    self, MessageTemplate, WORKFLOW_CONTINUE_ACTION_ID, WORKFLOW_INPUT_CALLBACK_ID,
    WORKFLOW_START_ACTION_ID,
};
use crate::events::{
    BlockActionEvent, EventContext, EventHandler, EventHandlerError, HandlerDeps, HandlerResult,
    OutboundMessage, SlackEnvelope, SlackEvent, SlackEventType, ViewSubmissionEvent,
};

fn respond(channel_id: impl Into<String>, message: MessageTemplate) -> HandlerResult {
    HandlerResult::Responded(OutboundMessage { channel_id: channel_id.into(), message })
}

/// Greets a user who says "hi" and offers the workflow menu. The display
/// name comes from a rate-limit-retried `users.info` lookup; if the lookup
/// ultimately fails the greeting degrades to an `<@id>` mention rather than
/// going unanswered.
pub struct GreetingHandler;

fn is_greeting(text: &str) -> bool {
    text.split_whitespace().any(|word| word.eq_ignore_ascii_case("hi"))
}

#[async_trait]
impl EventHandler for GreetingHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
        deps: HandlerDeps<'_>,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !is_greeting(&event.text) {
            return Ok(HandlerResult::Processed);
        }

        let name = match execute_with_retry(deps.retry_policy, "users.info", || {
            deps.api.user_info(&event.user_id)
        })
        .await
        {
            Ok(profile) => profile.greeting_name(),
            Err(error) => {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    user_id = %event.user_id,
                    error = %error,
                    "user lookup failed, greeting with a mention instead"
                );
                format!("<@{}>", event.user_id)
            }
        };

        let greeting = blocks::greeting_message(&name);
        execute_with_retry(deps.retry_policy, "chat.postMessage", || {
            deps.api.post_message(&event.channel_id, &greeting)
        })
        .await?;

        let menu = blocks::workflow_menu_message(&deps.registry.definitions());
        Ok(respond(event.channel_id.clone(), menu))
    }
}

/// Handles workflow buttons: a start button (value names the workflow) mints
/// a fresh context, a continue button (value carries the token) resumes one.
/// Either way the outcome is a modal whose `private_metadata` is the token
/// for the awaited field.
pub struct WorkflowTriggerHandler;

#[async_trait]
impl EventHandler for WorkflowTriggerHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
        deps: HandlerDeps<'_>,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match event.action_id.as_str() {
            WORKFLOW_START_ACTION_ID => start_workflow(event, ctx, deps).await,
            WORKFLOW_CONTINUE_ACTION_ID => resume_workflow(event, ctx, deps).await,
            other => {
                debug!(
                    correlation_id = %ctx.correlation_id,
                    action_id = %other,
                    "no workflow behind this action"
                );
                Ok(HandlerResult::Processed)
            }
        }
    }
}

async fn start_workflow(
    event: &BlockActionEvent,
    ctx: &EventContext,
    deps: HandlerDeps<'_>,
) -> Result<HandlerResult, EventHandlerError> {
    let workflow_id = event.value.as_deref().unwrap_or_default();
    let Some(definition) = deps.registry.get(workflow_id) else {
        warn!(
            correlation_id = %ctx.correlation_id,
            workflow_id = %workflow_id,
            "start requested for unregistered workflow"
        );
        return Ok(respond(
            event.channel_id.clone(),
            blocks::workflow_unavailable_message(workflow_id),
        ));
    };

    let outcome = workflow::start(definition, &event.user_id, &event.channel_id);
    let token = ContextToken::encode(&outcome.context);

    // Disarm the clicked button so a double click cannot mint two
    // conversations from one menu message. Losing this update only costs
    // cosmetics, so a failure is logged and the flow continues.
    let processing = blocks::processing_message();
    if let Err(error) = execute_with_retry(deps.retry_policy, "chat.update", || {
        deps.api.replace_message(&event.channel_id, &event.message_ts, &processing)
    })
    .await
    {
        warn!(
            correlation_id = %ctx.correlation_id,
            error = %error,
            "could not replace the menu message"
        );
    }

    open_prompt(definition, &outcome.prompt.name, &token, event, ctx, deps).await
}

async fn resume_workflow(
    event: &BlockActionEvent,
    ctx: &EventContext,
    deps: HandlerDeps<'_>,
) -> Result<HandlerResult, EventHandlerError> {
    let Some(raw_token) = event.value.as_deref() else {
        return Ok(respond(
            event.channel_id.clone(),
            blocks::session_expired_message(&ctx.correlation_id),
        ));
    };

    let token = ContextToken::from_raw(raw_token);
    let context = match token.decode(deps.registry) {
        Ok(context) => context,
        Err(error) => {
            warn!(
                correlation_id = %ctx.correlation_id,
                error = %error,
                "continue button carried an unusable token"
            );
            return Ok(respond(
                event.channel_id.clone(),
                blocks::session_expired_message(&ctx.correlation_id),
            ));
        }
    };

    // A terminal token never rides a continue button; whatever sent one is
    // not the prompt flow. Fail closed.
    let (Some(definition), workflow::WorkflowStep::AwaitingInput { field }) =
        (deps.registry.get(&context.workflow_id), &context.step)
    else {
        return Ok(respond(
            event.channel_id.clone(),
            blocks::session_expired_message(&ctx.correlation_id),
        ));
    };

    open_prompt(definition, field, &token, event, ctx, deps).await
}

async fn open_prompt(
    definition: &WorkflowDefinition,
    field_name: &str,
    token: &ContextToken,
    event: &BlockActionEvent,
    ctx: &EventContext,
    deps: HandlerDeps<'_>,
) -> Result<HandlerResult, EventHandlerError> {
    let Some(field) = definition.field(field_name) else {
        return Ok(respond(
            event.channel_id.clone(),
            blocks::session_expired_message(&ctx.correlation_id),
        ));
    };

    let view = blocks::prompt_view(definition, field, token);
    match execute_with_retry(deps.retry_policy, "views.open", || {
        deps.api.open_view(&event.trigger_id, &view)
    })
    .await
    {
        Ok(()) => Ok(HandlerResult::Processed),
        Err(error) => {
            warn!(
                correlation_id = %ctx.correlation_id,
                workflow_id = %definition.workflow_id(),
                error = %error,
                "could not open the input prompt"
            );
            Ok(respond(
                event.channel_id.clone(),
                blocks::error_message(error.user_message(), &ctx.correlation_id),
            ))
        }
    }
}

/// Handles modal submissions: decode the token, record the value, then
/// either re-issue the next prompt with a fresh token or hand the completed
/// payload to the relay. Any decode or transition failure is a dead
/// conversation and is reported to the user as an expired session — never
/// silently dropped, never patched up.
pub struct InputSubmittedHandler;

#[async_trait]
impl EventHandler for InputSubmittedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
        deps: HandlerDeps<'_>,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.callback_id != WORKFLOW_INPUT_CALLBACK_ID {
            return Ok(HandlerResult::Processed);
        }

        // Once the token is gone there is no channel to answer in; the
        // submitting user's DM is the only address left.
        let expired = |reason: &dyn std::fmt::Display| {
            warn!(
                correlation_id = %ctx.correlation_id,
                user_id = %event.user_id,
                reason = %reason,
                "cannot resume conversation from submitted token"
            );
            Ok(respond(
                event.user_id.clone(),
                blocks::session_expired_message(&ctx.correlation_id),
            ))
        };

        let Some(raw_token) = event.private_metadata.as_deref() else {
            return expired(&"submission carried no token");
        };
        let token = ContextToken::from_raw(raw_token);
        let context = match token.decode(deps.registry) {
            Ok(context) => context,
            Err(error) => return expired(&error),
        };
        let Some(definition) = deps.registry.get(&context.workflow_id) else {
            return expired(&"workflow disappeared between decode and dispatch");
        };
        let workflow_title = definition.title().to_owned();

        match workflow::apply_input(definition, context, event.value.clone()) {
            Ok(TransitionOutcome::Advanced { context, prompt }) => {
                let next_token = ContextToken::encode(&context);
                Ok(respond(
                    context.destination_channel_id,
                    blocks::next_prompt_message(&prompt, &next_token),
                ))
            }
            Ok(TransitionOutcome::Completed { context }) => {
                deliver_submission(&workflow_title, &token, &context, ctx, deps).await
            }
            Err(error) => expired(&error),
        }
    }
}

async fn deliver_submission(
    workflow_title: &str,
    token: &ContextToken,
    context: &ConversationContext,
    ctx: &EventContext,
    deps: HandlerDeps<'_>,
) -> Result<HandlerResult, EventHandlerError> {
    let submission = Submission::from_terminal_context(token, context);
    let channel_id = context.destination_channel_id.clone();

    match deps.relay.deliver(&submission).await {
        Ok(()) => Ok(respond(channel_id, blocks::submission_confirmed_message(workflow_title))),
        Err(error @ intake_core::DeliveryError::Unreachable(_)) => {
            warn!(
                correlation_id = %ctx.correlation_id,
                idempotency_key = %submission.idempotency_key,
                error = %error,
                "relay delivery not confirmed"
            );
            Ok(respond(channel_id, blocks::submission_unconfirmed_message(workflow_title)))
        }
        Err(error @ intake_core::DeliveryError::Rejected(_)) => {
            warn!(
                correlation_id = %ctx.correlation_id,
                idempotency_key = %submission.idempotency_key,
                error = %error,
                "relay rejected the submission"
            );
            Ok(respond(channel_id, blocks::submission_rejected_message(workflow_title)))
        }
    }
}
