//! Writing documents into the shared store.

use std::sync::Arc;

use serde_json::Value as Json;

use ragpipe_shared::{RagPipeError, Result};
use ragpipe_store::{DuplicatePolicy, InMemoryDocumentStore};

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

/// Writes incoming documents and reports how many were stored.
///
/// The optional `policy` input (`"none"`, `"skip"`, `"overwrite"`, or
/// `"fail"`) overrides the policy given at construction for one run.
pub struct DocumentWriter {
    store: Arc<InMemoryDocumentStore>,
    policy: DuplicatePolicy,
}

impl DocumentWriter {
    pub fn new(store: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            store,
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Component for DocumentWriter {
    fn inputs(&self) -> Vec<SocketSpec> {
        vec![
            SocketSpec::required("documents", ValueKind::Documents),
            SocketSpec::optional("policy", ValueKind::Json),
        ]
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::output("documents_written", ValueKind::Count)]
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let documents = inputs.take_documents("documents")?;
        let policy = match inputs.take_optional_json("policy")? {
            None | Some(Json::Null) => self.policy,
            Some(Json::String(name)) => name.parse()?,
            Some(other) => {
                return Err(RagPipeError::validation(format!(
                    "policy must be a string, got {other}"
                )));
            }
        };
        let written = self.store.write_documents(documents, policy)?;
        Ok(SocketValues::new().with("documents_written", Value::Count(written)))
    }
}
