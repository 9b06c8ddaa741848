//! File-to-document converters and MIME routing.

use serde_json::Value as Json;
use tracing::{debug, info};

use ragpipe_convert::{SourceFormat, route_by_mime};
use ragpipe_shared::{Meta, RagPipeError, Result};

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

/// Socket receiving files whose type is not configured.
pub const UNCLASSIFIED: &str = "unclassified";

/// Routes file paths to one output per configured MIME type.
///
/// Every configured output and `unclassified` is emitted on each run, empty
/// when no file matched, so downstream converters always run.
#[derive(Debug, Clone)]
pub struct FileTypeRouter {
    mime_types: Vec<String>,
}

impl FileTypeRouter {
    pub fn new<I, S>(mime_types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mime_types: Vec<String> = mime_types.into_iter().map(Into::into).collect();
        if mime_types.is_empty() {
            return Err(RagPipeError::validation("FileTypeRouter needs at least one MIME type"));
        }
        if let Some(bad) = mime_types.iter().find(|m| !m.contains('/') || m.as_str() == UNCLASSIFIED) {
            return Err(RagPipeError::validation(format!("invalid MIME type '{bad}'")));
        }
        Ok(Self { mime_types })
    }
}

impl Component for FileTypeRouter {
    fn inputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::required("sources", ValueKind::Sources)]
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        self.mime_types
            .iter()
            .map(|m| SocketSpec::output(m.as_str(), ValueKind::Sources))
            .chain(std::iter::once(SocketSpec::output(UNCLASSIFIED, ValueKind::Sources)))
            .collect()
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let sources = inputs.take_sources("sources")?;
        let routes = route_by_mime(&sources, &self.mime_types);

        let mut out = SocketValues::new();
        for (mime, paths) in routes.routes {
            debug!(%mime, files = paths.len(), "routed");
            out.push(mime, Value::Sources(paths));
        }
        if !routes.unclassified.is_empty() {
            info!(files = routes.unclassified.len(), "files with unconfigured types");
        }
        out.push(UNCLASSIFIED, Value::Sources(routes.unclassified));
        Ok(out)
    }
}

/// Converts files of one format into documents.
///
/// Each document's metadata holds `file_path` plus the entries of the
/// optional `meta` input. Files that fail to convert are skipped.
#[derive(Debug, Clone, Copy)]
pub struct FileConverter {
    format: SourceFormat,
}

impl FileConverter {
    pub fn new(format: SourceFormat) -> Self {
        Self { format }
    }

    pub fn text() -> Self {
        Self::new(SourceFormat::Text)
    }

    pub fn markdown() -> Self {
        Self::new(SourceFormat::Markdown)
    }

    pub fn pdf() -> Self {
        Self::new(SourceFormat::Pdf)
    }

    pub fn html() -> Self {
        Self::new(SourceFormat::Html)
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }
}

impl Component for FileConverter {
    fn inputs(&self) -> Vec<SocketSpec> {
        vec![
            SocketSpec::required("sources", ValueKind::Sources),
            SocketSpec::optional("meta", ValueKind::Json),
        ]
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::output("documents", ValueKind::Documents)]
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let sources = inputs.take_sources("sources")?;
        let extra = match inputs.take_optional_json("meta")? {
            None | Some(Json::Null) => Meta::new(),
            Some(Json::Object(map)) => map,
            Some(other) => {
                return Err(RagPipeError::validation(format!(
                    "converter meta must be a JSON object, got {other}"
                )));
            }
        };
        let documents = self.format.convert_all(&sources, &extra);
        Ok(SocketValues::new().with("documents", Value::Documents(documents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn router_emits_every_configured_output() {
        let router = FileTypeRouter::new(["text/plain", "application/pdf"]).unwrap();
        let sources = vec![PathBuf::from("a.txt"), PathBuf::from("b.xyzzy")];
        let out = router
            .run(SocketValues::new().with("sources", Value::Sources(sources)))
            .unwrap();
        assert_eq!(out.get("text/plain"), Some(&Value::Sources(vec!["a.txt".into()])));
        assert_eq!(out.get("application/pdf"), Some(&Value::Sources(Vec::new())));
        assert_eq!(out.get(UNCLASSIFIED), Some(&Value::Sources(vec!["b.xyzzy".into()])));
        assert_eq!(router.outputs().len(), 3);
    }

    #[test]
    fn router_rejects_bad_configuration() {
        assert!(FileTypeRouter::new(Vec::<String>::new()).is_err());
        assert!(FileTypeRouter::new(["plain"]).is_err());
    }

    #[test]
    fn converter_merges_meta_and_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello there").unwrap();
        let sources = vec![path.clone(), dir.path().join("missing.txt")];

        let mut out = FileConverter::text()
            .run(
                SocketValues::new()
                    .with("sources", Value::Sources(sources))
                    .with("meta", Value::Json(json!({ "lang": "en" }))),
            )
            .unwrap();
        let docs = out.take_documents("documents").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "hello there");
        assert_eq!(docs[0].meta_value("lang"), Some(&json!("en")));
        assert_eq!(
            docs[0].meta_value("file_path"),
            Some(&json!(path.display().to_string()))
        );
    }

    #[test]
    fn converter_rejects_non_object_meta() {
        let err = FileConverter::markdown()
            .run(
                SocketValues::new()
                    .with("sources", Value::Sources(Vec::new()))
                    .with("meta", Value::Json(json!("nope"))),
            )
            .unwrap_err();
        assert!(matches!(err, RagPipeError::Validation { .. }));
    }
}
