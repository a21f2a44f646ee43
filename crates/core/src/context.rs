use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::{WorkflowRegistry, WorkflowStep};

/// Collected field values, in the order they were first set.
///
/// Setting a key that already exists overwrites its value in place; the key
/// keeps its original position. The payload only ever grows over a
/// conversation's lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: Vec<PayloadField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(existing) => existing.value = value,
            None => self.fields.push(PayloadField { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|field| field.name == name).map(|field| field.value.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PayloadField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON object form, for the relay submission body.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for field in &self.fields {
            object.insert(field.name.clone(), serde_json::Value::String(field.value.clone()));
        }
        serde_json::Value::Object(object)
    }
}

/// Everything a later, unrelated inbound event needs to resume the
/// conversation. Reconstructed from its token on every event; never held in
/// process memory between events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub originating_user_id: String,
    pub destination_channel_id: String,
    pub workflow_id: String,
    pub step: WorkflowStep,
    pub payload: Payload,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("context token is not well-formed")]
    Malformed,
    #[error("context token references unknown workflow `{workflow_id}`")]
    UnknownWorkflow { workflow_id: String },
    #[error("context token step is not valid for workflow `{workflow_id}`")]
    InvalidStep { workflow_id: String },
}

/// Opaque, round-trippable encoding of a [`ConversationContext`], attached
/// to a UI artifact and returned unchanged by the platform on a later event.
///
/// Tokens carry no integrity protection: a client that tampers with or
/// forges one can point a conversation at another user or channel. Decoding
/// validates structure against the registry and fails closed, but it does
/// not authenticate the sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextToken(String);

impl ContextToken {
    pub fn encode(context: &ConversationContext) -> Self {
        let json = serde_json::to_vec(context)
            .expect("ConversationContext serializes to JSON without error");
        Self(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(
        &self,
        registry: &WorkflowRegistry,
    ) -> Result<ConversationContext, DecodeError> {
        let bytes = URL_SAFE_NO_PAD.decode(&self.0).map_err(|_| DecodeError::Malformed)?;
        let context: ConversationContext =
            serde_json::from_slice(&bytes).map_err(|_| DecodeError::Malformed)?;
        let workflow_id = context.workflow_id.clone();

        let Some(definition) = registry.get(&workflow_id) else {
            return Err(DecodeError::UnknownWorkflow { workflow_id });
        };

        // Only tokens the prompt flow could actually have minted are
        // accepted: the payload must be exactly the fields preceding the
        // awaited field (or all fields, once submitted), in declaration
        // order. Anything else fails closed.
        let collected_until = match &context.step {
            WorkflowStep::AwaitingInput { field } => match definition.field_position(field) {
                Some(position) => position,
                None => return Err(DecodeError::InvalidStep { workflow_id }),
            },
            WorkflowStep::Submitted => definition.fields().len(),
        };

        let expected = definition.fields()[..collected_until].iter().map(|f| f.name.as_str());
        if !context.payload.names().eq(expected) {
            return Err(DecodeError::InvalidStep { workflow_id });
        }

        Ok(context)
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextToken, ConversationContext, DecodeError, Payload};
    use crate::workflow::{
        default_registry, FieldSpec, WorkflowDefinition, WorkflowRegistry, WorkflowStep,
    };

    fn three_field_registry() -> WorkflowRegistry {
        WorkflowRegistry::build(vec![WorkflowDefinition::new(
            "engagement",
            "Engagement",
            vec![
                FieldSpec::new("client", "who?"),
                FieldSpec::new("scope", "what?"),
                FieldSpec::new("deadline", "when?"),
            ],
        )
        .expect("definition")])
    }

    fn context_at(step: WorkflowStep, collected: &[(&str, &str)]) -> ConversationContext {
        let mut payload = Payload::new();
        for (name, value) in collected {
            payload.set(*name, *value);
        }
        ConversationContext {
            originating_user_id: "U100".to_owned(),
            destination_channel_id: "C200".to_owned(),
            workflow_id: "engagement".to_owned(),
            step,
            payload,
        }
    }

    #[test]
    fn round_trip_is_lossless() {
        let registry = three_field_registry();
        let context =
            context_at(WorkflowStep::awaiting("scope"), &[("client", "Acme Corp")]);

        let token = ContextToken::encode(&context);
        let decoded = token.decode(&registry).expect("decode");

        assert_eq!(decoded, context);
    }

    #[test]
    fn round_trip_preserves_payload_insertion_order() {
        let registry = three_field_registry();
        let context = context_at(
            WorkflowStep::awaiting("deadline"),
            &[("client", "Acme Corp"), ("scope", "migration")],
        );

        let decoded = ContextToken::encode(&context).decode(&registry).expect("decode");
        let names: Vec<_> = decoded.payload.names().collect();
        assert_eq!(names, vec!["client", "scope"]);
    }

    #[test]
    fn encode_is_deterministic() {
        let context = context_at(WorkflowStep::awaiting("client"), &[]);
        assert_eq!(ContextToken::encode(&context), ContextToken::encode(&context));
    }

    #[test]
    fn garbage_token_is_malformed() {
        let registry = default_registry();
        let error = ContextToken::from_raw("!!not-base64!!")
            .decode(&registry)
            .expect_err("garbage must fail");
        assert_eq!(error, DecodeError::Malformed);
    }

    #[test]
    fn valid_base64_of_non_context_json_is_malformed() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;

        let registry = default_registry();
        let token = ContextToken::from_raw(URL_SAFE_NO_PAD.encode(br#"{"kind":"other"}"#));
        assert_eq!(token.decode(&registry).expect_err("shape mismatch"), DecodeError::Malformed);
    }

    #[test]
    fn unregistered_workflow_fails_with_unknown_workflow() {
        let context = context_at(WorkflowStep::awaiting("client"), &[]);
        let token = ContextToken::encode(&context);

        let empty = WorkflowRegistry::build(Vec::new());
        assert_eq!(
            token.decode(&empty).expect_err("unknown workflow"),
            DecodeError::UnknownWorkflow { workflow_id: "engagement".to_owned() }
        );
    }

    #[test]
    fn step_naming_a_foreign_field_is_invalid() {
        let registry = three_field_registry();
        let context = context_at(WorkflowStep::awaiting("budget"), &[]);

        assert_eq!(
            ContextToken::encode(&context).decode(&registry).expect_err("foreign field"),
            DecodeError::InvalidStep { workflow_id: "engagement".to_owned() }
        );
    }

    #[test]
    fn payload_ahead_of_the_awaited_field_is_invalid() {
        let registry = three_field_registry();
        // Claims to await the first field while already carrying the second.
        let context =
            context_at(WorkflowStep::awaiting("client"), &[("scope", "migration")]);

        assert_eq!(
            ContextToken::encode(&context).decode(&registry).expect_err("inconsistent order"),
            DecodeError::InvalidStep { workflow_id: "engagement".to_owned() }
        );
    }

    #[test]
    fn submitted_token_missing_fields_is_invalid() {
        let registry = three_field_registry();
        let context = context_at(WorkflowStep::Submitted, &[("client", "Acme Corp")]);

        assert_eq!(
            ContextToken::encode(&context).decode(&registry).expect_err("incomplete submission"),
            DecodeError::InvalidStep { workflow_id: "engagement".to_owned() }
        );
    }

    #[test]
    fn complete_submitted_token_decodes() {
        let registry = three_field_registry();
        let context = context_at(
            WorkflowStep::Submitted,
            &[("client", "Acme Corp"), ("scope", "migration"), ("deadline", "Q3")],
        );

        let decoded = ContextToken::encode(&context).decode(&registry).expect("decode");
        assert!(decoded.step.is_terminal());
    }

    #[test]
    fn payload_overwrite_keeps_position_and_latest_value() {
        let mut payload = Payload::new();
        payload.set("client", "Acme");
        payload.set("scope", "migration");
        payload.set("client", "Acme Corp");

        assert_eq!(payload.get("client"), Some("Acme Corp"));
        let names: Vec<_> = payload.names().collect();
        assert_eq!(names, vec!["client", "scope"]);
    }

    #[test]
    fn payload_json_carries_every_field() {
        let mut payload = Payload::new();
        payload.set("client", "Acme Corp");
        payload.set("scope", "migration");

        let json = payload.to_json();
        assert_eq!(json["client"], "Acme Corp");
        assert_eq!(json["scope"], "migration");
        assert_eq!(json.as_object().map(|o| o.len()), Some(2));
    }
}
