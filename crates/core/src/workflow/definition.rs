use std::collections::HashMap;

use thiserror::Error;

/// One input the workflow collects: the payload key it is stored under and
/// the prompt shown to the user when it is requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub prompt: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { name: name.into(), prompt: prompt.into() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowDefinitionError {
    #[error("workflow `{0}` must declare at least one field")]
    NoFields(String),
    #[error("workflow `{workflow_id}` declares field `{field}` more than once")]
    DuplicateField { workflow_id: String, field: String },
}

/// An ordered template for one kind of conversation: which fields to collect
/// and in what order. Definitions are immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowDefinition {
    workflow_id: String,
    title: String,
    fields: Vec<FieldSpec>,
}

impl WorkflowDefinition {
    pub fn new(
        workflow_id: impl Into<String>,
        title: impl Into<String>,
        fields: Vec<FieldSpec>,
    ) -> Result<Self, WorkflowDefinitionError> {
        let workflow_id = workflow_id.into();
        if fields.is_empty() {
            return Err(WorkflowDefinitionError::NoFields(workflow_id));
        }
        for (index, field) in fields.iter().enumerate() {
            if fields[..index].iter().any(|other| other.name == field.name) {
                return Err(WorkflowDefinitionError::DuplicateField {
                    workflow_id,
                    field: field.name.clone(),
                });
            }
        }

        Ok(Self { workflow_id, title: title.into(), fields })
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn first_field(&self) -> &FieldSpec {
        // construction guarantees at least one field
        &self.fields[0]
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn field_after(&self, name: &str) -> Option<&FieldSpec> {
        self.field_position(name).and_then(|position| self.fields.get(position + 1))
    }
}

/// Read-only lookup table of every workflow the process knows about.
///
/// Built once at bootstrap and never mutated afterwards; handlers only ever
/// borrow it.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, WorkflowDefinition>,
}

impl WorkflowRegistry {
    pub fn build(definitions: Vec<WorkflowDefinition>) -> Self {
        let workflows = definitions
            .into_iter()
            .map(|definition| (definition.workflow_id.clone(), definition))
            .collect();
        Self { workflows }
    }

    pub fn get(&self, workflow_id: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(workflow_id)
    }

    pub fn contains(&self, workflow_id: &str) -> bool {
        self.workflows.contains_key(workflow_id)
    }

    /// All definitions, ordered by workflow id so menus render the same way
    /// every time.
    pub fn definitions(&self) -> Vec<&WorkflowDefinition> {
        let mut definitions: Vec<_> = self.workflows.values().collect();
        definitions.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        definitions
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }
}

/// The built-in intake workflow: one field naming the client the engagement
/// is for.
pub fn statement_of_work() -> WorkflowDefinition {
    WorkflowDefinition::new(
        "statement_of_work",
        "Create SoW",
        vec![FieldSpec::new(
            "client",
            "Who are we doing this project for? Respond with a company name or the name of the \
             point of contact (POC).",
        )],
    )
    .unwrap_or_else(|_| unreachable!("built-in workflow definition is valid"))
}

pub fn default_registry() -> WorkflowRegistry {
    WorkflowRegistry::build(vec![statement_of_work()])
}
