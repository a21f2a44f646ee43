use serde::{Deserialize, Serialize};

/// Position of a conversation inside its workflow.
///
/// `AwaitingTrigger` has no representation here on purpose: before the
/// trigger fires there is no context and therefore no token. A context only
/// exists from the first prompt onward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowStep {
    AwaitingInput { field: String },
    Submitted,
}

impl WorkflowStep {
    pub fn awaiting(field: impl Into<String>) -> Self {
        Self::AwaitingInput { field: field.into() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted)
    }
}
