//! Prompt rendering with Jinja templates.

use std::collections::BTreeMap;

use minijinja::Environment;

use ragpipe_shared::{RagPipeError, Result};

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

/// Variable that receives retrieved documents.
const DOCUMENTS_VARIABLE: &str = "documents";

/// Renders a Jinja template into a `prompt`.
///
/// Each variable the template reads becomes an input socket: `documents`
/// takes [`ValueKind::Documents`], every other variable takes text.
/// Variables are optional and render empty when unfed, unless listed in
/// `required_variables`.
pub struct PromptBuilder {
    env: Environment<'static>,
    template: String,
    variables: Vec<String>,
    required: Vec<String>,
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("variables", &self.variables)
            .field("required", &self.required)
            .finish()
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        Self::with_required_variables(template, &[])
    }

    /// Like [`PromptBuilder::new`], with some variables made mandatory.
    pub fn with_required_variables(template: impl Into<String>, required: &[&str]) -> Result<Self> {
        let template = template.into();
        let env = Environment::new();
        let mut variables: Vec<String> = env
            .template_from_str(&template)
            .map_err(template_error)?
            .undeclared_variables(false)
            .into_iter()
            .collect();
        variables.sort();

        if let Some(missing) = required.iter().find(|r| !variables.iter().any(|v| v == *r)) {
            return Err(RagPipeError::Template(format!(
                "required variable '{missing}' does not appear in the template"
            )));
        }

        Ok(Self {
            env,
            template,
            variables,
            required: required.iter().map(|r| r.to_string()).collect(),
        })
    }

    /// Template variables, sorted.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    fn kind_of(variable: &str) -> ValueKind {
        if variable == DOCUMENTS_VARIABLE {
            ValueKind::Documents
        } else {
            ValueKind::Text
        }
    }

    /// Render with explicit variable values.
    pub fn render(&self, context: &BTreeMap<String, minijinja::Value>) -> Result<String> {
        self.env
            .template_from_str(&self.template)
            .and_then(|t| t.render(context))
            .map_err(template_error)
    }
}

fn template_error(err: minijinja::Error) -> RagPipeError {
    RagPipeError::Template(err.to_string())
}

impl Component for PromptBuilder {
    fn inputs(&self) -> Vec<SocketSpec> {
        self.variables
            .iter()
            .map(|name| {
                let kind = Self::kind_of(name);
                if self.required.contains(name) {
                    SocketSpec::required(name.as_str(), kind)
                } else {
                    SocketSpec::optional(name.as_str(), kind)
                }
            })
            .collect()
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::output("prompt", ValueKind::Text)]
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let mut context = BTreeMap::new();
        for name in &self.variables {
            let value = match inputs.take_concatenated(name) {
                None => continue,
                Some(Value::Text(text)) => minijinja::Value::from(text),
                Some(Value::Documents(docs)) => minijinja::Value::from_serialize(&docs),
                Some(Value::Json(json)) => minijinja::Value::from_serialize(&json),
                Some(other) => {
                    return Err(RagPipeError::validation(format!(
                        "input '{name}' expects {}, got {}",
                        Self::kind_of(name),
                        other.kind()
                    )));
                }
            };
            context.insert(name.clone(), value);
        }
        let prompt = self.render(&context)?;
        Ok(SocketValues::new().with("prompt", Value::Text(prompt)))
    }
}
