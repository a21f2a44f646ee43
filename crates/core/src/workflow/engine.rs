use thiserror::Error;

use crate::context::{ConversationContext, Payload};
use crate::workflow::definition::{FieldSpec, WorkflowDefinition};
use crate::workflow::states::WorkflowStep;

/// Result of the trigger transition: a freshly minted context parked at the
/// first field, plus the prompt to issue for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartOutcome {
    pub context: ConversationContext,
    pub prompt: FieldSpec,
}

/// Result of applying one submitted input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// More fields remain; the context has advanced and the next prompt
    /// should be issued with a re-encoded token.
    Advanced { context: ConversationContext, prompt: FieldSpec },
    /// The final field was collected; the payload is complete and ready for
    /// the relay. No further token is issued.
    Completed { context: ConversationContext },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("context belongs to workflow `{context_workflow}`, not `{definition_workflow}`")]
    WorkflowMismatch { context_workflow: String, definition_workflow: String },
    #[error("field `{field}` is not part of workflow `{workflow_id}`")]
    UnknownField { workflow_id: String, field: String },
    #[error("workflow `{workflow_id}` has already been submitted")]
    AlreadySubmitted { workflow_id: String },
}

/// Trigger transition: mint a new context at the first field of
/// `definition`. Handling an event is a pure function of the event and the
/// decoded context, so there is nothing to look up and nothing to lock.
pub fn start(
    definition: &WorkflowDefinition,
    originating_user_id: impl Into<String>,
    destination_channel_id: impl Into<String>,
) -> StartOutcome {
    let first = definition.first_field().clone();
    let context = ConversationContext {
        originating_user_id: originating_user_id.into(),
        destination_channel_id: destination_channel_id.into(),
        workflow_id: definition.workflow_id().to_owned(),
        step: WorkflowStep::awaiting(first.name.clone()),
        payload: Payload::new(),
    };

    StartOutcome { context, prompt: first }
}

/// Input-submitted transition: record the value for the awaited field and
/// advance to the next field, or to `Submitted` when none remain.
pub fn apply_input(
    definition: &WorkflowDefinition,
    mut context: ConversationContext,
    value: impl Into<String>,
) -> Result<TransitionOutcome, TransitionError> {
    if context.workflow_id != definition.workflow_id() {
        return Err(TransitionError::WorkflowMismatch {
            context_workflow: context.workflow_id,
            definition_workflow: definition.workflow_id().to_owned(),
        });
    }

    let field = match &context.step {
        WorkflowStep::Submitted => {
            return Err(TransitionError::AlreadySubmitted { workflow_id: context.workflow_id })
        }
        WorkflowStep::AwaitingInput { field } => field.clone(),
    };

    if definition.field_position(&field).is_none() {
        return Err(TransitionError::UnknownField { workflow_id: context.workflow_id, field });
    }

    context.payload.set(field.clone(), value);

    Ok(match definition.field_after(&field) {
        Some(next) => {
            context.step = WorkflowStep::awaiting(next.name.clone());
            TransitionOutcome::Advanced { context, prompt: next.clone() }
        }
        None => {
            context.step = WorkflowStep::Submitted;
            TransitionOutcome::Completed { context }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{apply_input, start, TransitionError, TransitionOutcome};
    use crate::workflow::definition::{statement_of_work, FieldSpec, WorkflowDefinition};
    use crate::workflow::states::WorkflowStep;

    fn engagement() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "engagement",
            "Engagement",
            vec![
                FieldSpec::new("client", "who?"),
                FieldSpec::new("scope", "what?"),
                FieldSpec::new("deadline", "when?"),
            ],
        )
        .expect("definition")
    }

    #[test]
    fn trigger_mints_context_at_first_field() {
        let definition = statement_of_work();
        let outcome = start(&definition, "U1", "C1");

        assert_eq!(outcome.context.step, WorkflowStep::awaiting("client"));
        assert!(outcome.context.payload.is_empty());
        assert_eq!(outcome.prompt.name, "client");
    }

    #[test]
    fn single_field_workflow_completes_on_first_input() {
        let definition = statement_of_work();
        let started = start(&definition, "U1", "C1");

        let outcome =
            apply_input(&definition, started.context, "Acme Corp").expect("transition");

        let TransitionOutcome::Completed { context } = outcome else {
            panic!("single-field workflow must complete immediately");
        };
        assert_eq!(context.step, WorkflowStep::Submitted);
        assert_eq!(context.payload.get("client"), Some("Acme Corp"));
    }

    #[test]
    fn n_field_workflow_passes_through_exactly_n_awaiting_states() {
        let definition = engagement();
        let values = [("client", "Acme Corp"), ("scope", "migration"), ("deadline", "Q3")];

        let started = start(&definition, "U1", "C1");
        let mut awaiting_states = vec![started.context.step.clone()];
        let mut current = started.context;

        for (index, (_, value)) in values.iter().enumerate() {
            match apply_input(&definition, current, *value).expect("transition") {
                TransitionOutcome::Advanced { context, prompt } => {
                    assert_eq!(context.step, WorkflowStep::awaiting(prompt.name.clone()));
                    awaiting_states.push(context.step.clone());
                    current = context;
                }
                TransitionOutcome::Completed { context } => {
                    assert_eq!(index, values.len() - 1, "only the last input completes");
                    current = context;
                }
            }
        }

        assert_eq!(awaiting_states.len(), 3);
        assert_eq!(current.step, WorkflowStep::Submitted);
        for (name, value) in values {
            assert_eq!(current.payload.get(name), Some(value));
        }
    }

    #[test]
    fn prompts_follow_declaration_order() {
        let definition = engagement();
        let started = start(&definition, "U1", "C1");
        assert_eq!(started.prompt.name, "client");

        let TransitionOutcome::Advanced { context, prompt } =
            apply_input(&definition, started.context, "Acme Corp").expect("transition")
        else {
            panic!("two fields remain");
        };
        assert_eq!(prompt.name, "scope");

        let TransitionOutcome::Advanced { prompt, .. } =
            apply_input(&definition, context, "migration").expect("transition")
        else {
            panic!("one field remains");
        };
        assert_eq!(prompt.name, "deadline");
    }

    #[test]
    fn submitted_context_accepts_no_further_input() {
        let definition = statement_of_work();
        let started = start(&definition, "U1", "C1");
        let TransitionOutcome::Completed { context } =
            apply_input(&definition, started.context, "Acme Corp").expect("transition")
        else {
            panic!("must complete");
        };

        let error = apply_input(&definition, context, "again").expect_err("terminal state");
        assert_eq!(
            error,
            TransitionError::AlreadySubmitted { workflow_id: "statement_of_work".to_owned() }
        );
    }

    #[test]
    fn context_from_another_workflow_is_rejected() {
        let definition = statement_of_work();
        let other = engagement();
        let started = start(&other, "U1", "C1");

        let error =
            apply_input(&definition, started.context, "value").expect_err("wrong definition");
        assert!(matches!(error, TransitionError::WorkflowMismatch { .. }));
    }

    #[test]
    fn awaited_field_unknown_to_definition_is_rejected() {
        let definition = engagement();
        let mut started = start(&definition, "U1", "C1");
        started.context.step = WorkflowStep::awaiting("budget");

        let error = apply_input(&definition, started.context, "1M").expect_err("foreign field");
        assert_eq!(
            error,
            TransitionError::UnknownField {
                workflow_id: "engagement".to_owned(),
                field: "budget".to_owned(),
            }
        );
    }

    #[test]
    fn resubmitting_a_field_overwrites_its_value() {
        let definition = engagement();
        let started = start(&definition, "U1", "C1");

        let TransitionOutcome::Advanced { mut context, .. } =
            apply_input(&definition, started.context, "Acme").expect("transition")
        else {
            panic!("two fields remain");
        };

        // A duplicate delivery of the first prompt's submission: rewind the
        // step as the decoded duplicate token would present it.
        context.step = WorkflowStep::awaiting("client");
        context.payload = {
            let mut payload = crate::context::Payload::new();
            payload.set("client", "Acme");
            payload
        };
        let TransitionOutcome::Advanced { context, .. } =
            apply_input(&definition, context, "Acme Corp").expect("transition")
        else {
            panic!("two fields remain");
        };

        assert_eq!(context.payload.get("client"), Some("Acme Corp"));
    }
}
