//! Typed socket payloads and socket descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use ragpipe_shared::{Document, RagPipeError, Result};
use ragpipe_store::Filter;

/// Payload carried on a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Texts(Vec<String>),
    Embedding(Vec<f32>),
    Documents(Vec<Document>),
    /// File paths.
    Sources(Vec<PathBuf>),
    Filter(Filter),
    Json(serde_json::Value),
    Count(usize),
}

/// The type of a socket; edges connect sockets of equal kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Texts,
    Embedding,
    Documents,
    Sources,
    Filter,
    Json,
    Count,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Texts(_) => ValueKind::Texts,
            Self::Embedding(_) => ValueKind::Embedding,
            Self::Documents(_) => ValueKind::Documents,
            Self::Sources(_) => ValueKind::Sources,
            Self::Filter(_) => ValueKind::Filter,
            Self::Json(_) => ValueKind::Json,
            Self::Count(_) => ValueKind::Count,
        }
    }

    /// Concatenate list payloads of the same kind.
    fn concat(self, other: Value) -> Option<Value> {
        match (self, other) {
            (Self::Documents(mut a), Self::Documents(b)) => {
                a.extend(b);
                Some(Self::Documents(a))
            }
            (Self::Texts(mut a), Self::Texts(b)) => {
                a.extend(b);
                Some(Self::Texts(a))
            }
            (Self::Sources(mut a), Self::Sources(b)) => {
                a.extend(b);
                Some(Self::Sources(a))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "Text",
            Self::Texts => "Texts",
            Self::Embedding => "Embedding",
            Self::Documents => "Documents",
            Self::Sources => "Sources",
            Self::Filter => "Filter",
            Self::Json => "Json",
            Self::Count => "Count",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Socket descriptors
// ---------------------------------------------------------------------------

/// Whether an input must be fed.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    Required,
    /// Optional, with the value used when nothing is fed (if any).
    Optional(Option<Value>),
}

/// Static description of one socket.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketSpec {
    pub name: String,
    pub kind: ValueKind,
    pub requirement: Requirement,
    /// Accepts any number of edges; contributions arrive in edge order.
    pub variadic: bool,
}

impl SocketSpec {
    /// A required input, or any output.
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            requirement: Requirement::Required,
            variadic: false,
        }
    }

    /// An optional input with no default.
    pub fn optional(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            requirement: Requirement::Optional(None),
            ..Self::required(name, kind)
        }
    }

    /// An optional input that falls back to `default`.
    pub fn with_default(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            kind: default.kind(),
            requirement: Requirement::Optional(Some(default)),
            variadic: false,
        }
    }

    /// Output sockets carry no requirement.
    pub fn output(name: impl Into<String>, kind: ValueKind) -> Self {
        Self::required(name, kind)
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }
}

// ---------------------------------------------------------------------------
// SocketValues
// ---------------------------------------------------------------------------

/// Values keyed by socket name. A variadic input may hold several.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocketValues {
    slots: BTreeMap<String, Vec<Value>>,
}

impl SocketValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`SocketValues::push`].
    pub fn with(mut self, socket: impl Into<String>, value: Value) -> Self {
        self.push(socket, value);
        self
    }

    /// Add a value to a socket, after any already there.
    pub fn push(&mut self, socket: impl Into<String>, value: Value) {
        self.slots.entry(socket.into()).or_default().push(value);
    }

    pub fn contains(&self, socket: &str) -> bool {
        self.slots.contains_key(socket)
    }

    /// Number of values fed to a socket.
    pub fn count(&self, socket: &str) -> usize {
        self.slots.get(socket).map_or(0, Vec::len)
    }

    pub fn get(&self, socket: &str) -> Option<&Value> {
        self.slots.get(socket).and_then(|values| values.first())
    }

    pub fn sockets(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Every `(socket, value)` pair, variadic values included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remove a socket's first value.
    pub fn take(&mut self, socket: &str) -> Option<Value> {
        self.slots
            .remove(socket)
            .and_then(|values| values.into_iter().next())
    }

    /// Remove every value fed to a socket, in arrival order.
    pub fn take_all(&mut self, socket: &str) -> Vec<Value> {
        self.slots.remove(socket).unwrap_or_default()
    }

    /// Remove a socket's values and concatenate them into one list.
    pub fn take_concatenated(&mut self, socket: &str) -> Option<Value> {
        let mut values = self.take_all(socket).into_iter();
        let first = values.next()?;
        values.try_fold(first, Value::concat)
    }

    /// Consume into `(socket, value)` pairs, one per socket.
    pub(crate) fn into_single_values(self) -> impl Iterator<Item = (String, Value)> {
        self.slots
            .into_iter()
            .filter_map(|(name, values)| values.into_iter().next().map(|v| (name, v)))
    }

    // --- typed accessors used by components ---

    pub fn take_text(&mut self, socket: &str) -> Result<String> {
        match self.take(socket) {
            Some(Value::Text(text)) => Ok(text),
            other => Err(unexpected(socket, ValueKind::Text, other)),
        }
    }

    pub fn take_embedding(&mut self, socket: &str) -> Result<Vec<f32>> {
        match self.take(socket) {
            Some(Value::Embedding(embedding)) => Ok(embedding),
            other => Err(unexpected(socket, ValueKind::Embedding, other)),
        }
    }

    pub fn take_documents(&mut self, socket: &str) -> Result<Vec<Document>> {
        match self.take_concatenated(socket) {
            Some(Value::Documents(docs)) => Ok(docs),
            other => Err(unexpected(socket, ValueKind::Documents, other)),
        }
    }

    pub fn take_sources(&mut self, socket: &str) -> Result<Vec<PathBuf>> {
        match self.take_concatenated(socket) {
            Some(Value::Sources(paths)) => Ok(paths),
            other => Err(unexpected(socket, ValueKind::Sources, other)),
        }
    }

    pub fn take_optional_filter(&mut self, socket: &str) -> Result<Option<Filter>> {
        match self.take(socket) {
            None => Ok(None),
            Some(Value::Filter(filter)) => Ok(Some(filter)),
            other => Err(unexpected(socket, ValueKind::Filter, other)),
        }
    }

    pub fn take_optional_count(&mut self, socket: &str) -> Result<Option<usize>> {
        match self.take(socket) {
            None => Ok(None),
            Some(Value::Count(n)) => Ok(Some(n)),
            other => Err(unexpected(socket, ValueKind::Count, other)),
        }
    }

    pub fn take_optional_json(&mut self, socket: &str) -> Result<Option<serde_json::Value>> {
        match self.take(socket) {
            None => Ok(None),
            Some(Value::Json(json)) => Ok(Some(json)),
            other => Err(unexpected(socket, ValueKind::Json, other)),
        }
    }
}

fn unexpected(socket: &str, expected: ValueKind, got: Option<Value>) -> RagPipeError {
    match got {
        None => RagPipeError::validation(format!("input '{socket}' was not provided")),
        Some(value) => RagPipeError::validation(format!(
            "input '{socket}' expects {expected}, got {}",
            value.kind()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variadic_values_concatenate_in_order() {
        let mut values = SocketValues::new()
            .with("documents", Value::Documents(vec![Document::new("a")]))
            .with("documents", Value::Documents(vec![Document::new("b"), Document::new("c")]));
        let docs = values.take_documents("documents").expect("documents");
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        assert!(values.is_empty());
    }

    #[test]
    fn typed_accessors_report_mismatches() {
        let mut values = SocketValues::new().with("text", Value::Count(3));
        let err = values.take_text("text").unwrap_err();
        assert!(err.to_string().contains("expects Text, got Count"));

        let mut empty = SocketValues::new();
        assert!(empty.take_text("text").unwrap_err().to_string().contains("not provided"));
        assert_eq!(empty.take_optional_count("top_k").expect("optional"), None);
    }

    #[test]
    fn socket_spec_constructors() {
        let spec = SocketSpec::with_default("top_k", Value::Count(10));
        assert_eq!(spec.kind, ValueKind::Count);
        assert!(!spec.is_required());
        assert!(SocketSpec::required("text", ValueKind::Text).is_required());
        assert!(SocketSpec::required("documents", ValueKind::Documents).variadic().variadic);
    }
}
