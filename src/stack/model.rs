// src/stack/model.rs

use crate::types::StackName;

/// Remote identifier of a stack: a pure function of project and stack name.
pub fn remote_name(project: &str, name: &str) -> String {
    format!("{project}-{name}")
}

/// One provisionable unit of infrastructure description.
///
/// Stacks are immutable while a scheduler runs; the template is rendered
/// before scheduling starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    /// Logical name, unique within a run.
    pub name: StackName,
    /// Name sent to the backend. Set once, never regenerated.
    pub remote_name: String,
    /// Declared prerequisites, in config order.
    pub depends_on: Vec<StackName>,
    /// Whether the current run includes this stack.
    pub actioned: bool,
    /// Fully rendered provisioning document.
    pub template: String,
}

impl Stack {
    pub fn new(project: &str, name: impl Into<StackName>) -> Self {
        let name = name.into();
        Self {
            remote_name: remote_name(project, &name),
            name,
            depends_on: Vec::new(),
            actioned: false,
            template: String::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StackName>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn depends_on(&self, other: &str) -> bool {
        self.depends_on.iter().any(|d| d == other)
    }
}
