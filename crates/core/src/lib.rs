pub mod config;
pub mod context;
pub mod relay;
pub mod workflow;

pub use context::{ContextToken, ConversationContext, DecodeError, Payload, PayloadField};
pub use relay::{DedupingRelay, DeliveryError, NoopRelaySink, RelaySink, Submission};
pub use workflow::{
    apply_input, default_registry, start, statement_of_work, FieldSpec, StartOutcome,
    TransitionError, TransitionOutcome, WorkflowDefinition, WorkflowDefinitionError,
    WorkflowRegistry, WorkflowStep,
};
