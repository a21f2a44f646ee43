use serde::Serialize;

use intake_core::workflow::{FieldSpec, WorkflowDefinition};
use intake_core::ContextToken;

pub const WORKFLOW_START_ACTION_ID: &str = "intake.workflow.start.v1";
pub const WORKFLOW_CONTINUE_ACTION_ID: &str = "intake.workflow.continue.v1";
pub const WORKFLOW_INPUT_CALLBACK_ID: &str = "intake.workflow.input.v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// A single-input modal. The context token rides in `private_metadata`,
/// which Slack returns verbatim on the matching view submission; that
/// round-trip is the only conversation memory the system has.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptView {
    pub callback_id: String,
    pub title: TextObject,
    pub field_name: String,
    pub label: TextObject,
    pub private_metadata: String,
    pub submit_label: TextObject,
}

pub fn prompt_view(
    definition: &WorkflowDefinition,
    field: &FieldSpec,
    token: &ContextToken,
) -> PromptView {
    PromptView {
        callback_id: WORKFLOW_INPUT_CALLBACK_ID.to_owned(),
        title: TextObject::plain(definition.title()),
        field_name: field.name.clone(),
        label: TextObject::plain(field.prompt.clone()),
        private_metadata: token.as_str().to_owned(),
        submit_label: TextObject::plain("Submit"),
    }
}

pub fn greeting_message(name: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Hello, {name}!"))
        .section("intake.greeting.v1", |section| {
            section.plain(format!("Hello, {name}!"));
        })
        .build()
}

pub fn workflow_menu_message(definitions: &[&WorkflowDefinition]) -> MessageTemplate {
    MessageBuilder::new("What do you want to do today?")
        .section("intake.menu.header.v1", |section| {
            section.plain("It's good to see you 😇. What do you want to do today?");
        })
        .section("intake.menu.hint.v1", |section| {
            section.plain("Pick one⬇️");
        })
        .actions("intake.menu.actions.v1", |actions| {
            for definition in definitions {
                actions.button(
                    ButtonElement::new(WORKFLOW_START_ACTION_ID, definition.title())
                        .style(ButtonStyle::Primary)
                        .value(definition.workflow_id()),
                );
            }
        })
        .build()
}

pub fn processing_message() -> MessageTemplate {
    MessageBuilder::new("Processing...")
        .section("intake.processing.v1", |section| {
            section.mrkdwn("Processing...");
        })
        .build()
}

/// Channel message that carries the next prompt's entry point: the button
/// value is the re-encoded context token.
pub fn next_prompt_message(field: &FieldSpec, token: &ContextToken) -> MessageTemplate {
    MessageBuilder::new(field.prompt.clone())
        .section("intake.prompt.v1", |section| {
            section.plain(field.prompt.clone());
        })
        .actions("intake.prompt.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(WORKFLOW_CONTINUE_ACTION_ID, "Answer")
                    .style(ButtonStyle::Primary)
                    .value(token.as_str()),
            );
        })
        .build()
}

pub fn session_expired_message(correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new("This session has expired or is no longer valid.")
        .section("intake.session_expired.v1", |section| {
            section.mrkdwn(
                ":warning: This session has expired or is no longer valid. Please start again \
                 from the menu.",
            );
        })
        .context("intake.session_expired.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn workflow_unavailable_message(workflow_id: &str) -> MessageTemplate {
    MessageBuilder::new("That workflow is not available.")
        .section("intake.workflow_unavailable.v1", |section| {
            section.mrkdwn(format!(
                ":warning: The workflow `{workflow_id}` is not available on this workspace."
            ));
        })
        .build()
}

pub fn submission_confirmed_message(workflow_title: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{workflow_title} submitted."))
        .section("intake.submission.confirmed.v1", |section| {
            section.mrkdwn(format!(":white_check_mark: *{workflow_title}* has been submitted."));
        })
        .build()
}

/// Delivery failed before reaching the sink; the data may retry later.
pub fn submission_unconfirmed_message(workflow_title: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{workflow_title} submission not confirmed."))
        .section("intake.submission.unconfirmed.v1", |section| {
            section.mrkdwn(format!(
                ":warning: *{workflow_title}* submission was not confirmed. The collection \
                 endpoint could not be reached — please submit again."
            ));
        })
        .build()
}

/// The sink answered and said no; retrying the same payload will not help.
pub fn submission_rejected_message(workflow_title: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{workflow_title} submission rejected."))
        .section("intake.submission.rejected.v1", |section| {
            section.mrkdwn(format!(
                ":no_entry: *{workflow_title}* submission was rejected by the collection \
                 endpoint. Please contact an administrator."
            ));
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("intake.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("intake.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use intake_core::workflow::statement_of_work;
    use intake_core::{ContextToken, ConversationContext, Payload, WorkflowStep};

    use super::{
        next_prompt_message, prompt_view, workflow_menu_message, Block, ButtonElement,
        ButtonStyle, MessageBuilder, TextObject, WORKFLOW_CONTINUE_ACTION_ID,
        WORKFLOW_INPUT_CALLBACK_ID, WORKFLOW_START_ACTION_ID,
    };

    fn sample_token() -> ContextToken {
        ContextToken::encode(&ConversationContext {
            originating_user_id: "U1".to_owned(),
            destination_channel_id: "C1".to_owned(),
            workflow_id: "statement_of_work".to_owned(),
            step: WorkflowStep::awaiting("client"),
            payload: Payload::new(),
        })
    }

    #[test]
    fn builder_assembles_blocks_in_order() {
        let message = MessageBuilder::new("fallback")
            .section("s1", |section| {
                section.plain("first");
            })
            .actions("a1", |actions| {
                actions.button(ButtonElement::new("act", "Go").style(ButtonStyle::Primary));
            })
            .build();

        assert_eq!(message.fallback_text, "fallback");
        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(&message.blocks[0], Block::Section { block_id, .. } if block_id == "s1"));
        assert!(matches!(&message.blocks[1], Block::Actions { block_id, .. } if block_id == "a1"));
    }

    #[test]
    fn menu_carries_one_start_button_per_workflow() {
        let sow = statement_of_work();
        let message = workflow_menu_message(&[&sow]);

        let Some(Block::Actions { elements, .. }) =
            message.blocks.iter().find(|block| matches!(block, Block::Actions { .. }))
        else {
            panic!("menu must contain an actions block");
        };
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].action_id, WORKFLOW_START_ACTION_ID);
        assert_eq!(elements[0].value.as_deref(), Some("statement_of_work"));
        assert_eq!(elements[0].text, TextObject::plain("Create SoW"));
    }

    #[test]
    fn prompt_view_embeds_the_token_as_private_metadata() {
        let definition = statement_of_work();
        let token = sample_token();
        let view = prompt_view(&definition, definition.first_field(), &token);

        assert_eq!(view.callback_id, WORKFLOW_INPUT_CALLBACK_ID);
        assert_eq!(view.field_name, "client");
        assert_eq!(view.private_metadata, token.as_str());
    }

    #[test]
    fn next_prompt_button_value_is_the_token() {
        let definition = statement_of_work();
        let token = sample_token();
        let message = next_prompt_message(definition.first_field(), &token);

        let Some(Block::Actions { elements, .. }) =
            message.blocks.iter().find(|block| matches!(block, Block::Actions { .. }))
        else {
            panic!("prompt must contain an actions block");
        };
        assert_eq!(elements[0].action_id, WORKFLOW_CONTINUE_ACTION_ID);
        assert_eq!(elements[0].value.as_deref(), Some(token.as_str()));
    }
}
