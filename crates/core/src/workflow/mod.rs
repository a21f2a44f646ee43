pub mod definition;
pub mod engine;
pub mod states;

pub use definition::{
    default_registry, statement_of_work, FieldSpec, WorkflowDefinition, WorkflowDefinitionError,
    WorkflowRegistry,
};
pub use engine::{apply_input, start, StartOutcome, TransitionError, TransitionOutcome};
pub use states::WorkflowStep;
