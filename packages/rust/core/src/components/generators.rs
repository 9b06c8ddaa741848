//! Text generation component.

use serde_json::Value as Json;
use tracing::{debug, info};

use ragpipe_providers::{GenerationKwargs, TextGenerator};
use ragpipe_shared::{RagPipeError, Result};

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

/// Sends a prompt to a [`TextGenerator`].
///
/// Run-time `generation_kwargs` are layered over the kwargs given at
/// construction; keys set at run time win.
pub struct Generator {
    backend: Box<dyn TextGenerator>,
    kwargs: GenerationKwargs,
}

impl Generator {
    pub fn new(backend: Box<dyn TextGenerator>) -> Self {
        Self {
            backend,
            kwargs: GenerationKwargs::new(),
        }
    }

    pub fn with_kwargs(mut self, kwargs: GenerationKwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    fn merged_kwargs(&self, overrides: Option<Json>) -> Result<GenerationKwargs> {
        let mut kwargs = self.kwargs.clone();
        match overrides {
            None | Some(Json::Null) => {}
            Some(Json::Object(extra)) => kwargs.extend(extra),
            Some(other) => {
                return Err(RagPipeError::validation(format!(
                    "generation_kwargs must be a JSON object, got {other}"
                )));
            }
        }
        Ok(kwargs)
    }
}

impl Component for Generator {
    fn inputs(&self) -> Vec<SocketSpec> {
        vec![
            SocketSpec::required("prompt", ValueKind::Text),
            SocketSpec::optional("generation_kwargs", ValueKind::Json),
        ]
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![
            SocketSpec::output("replies", ValueKind::Texts),
            SocketSpec::output("meta", ValueKind::Json),
        ]
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let prompt = inputs.take_text("prompt")?;
        let kwargs = self.merged_kwargs(inputs.take_optional_json("generation_kwargs")?)?;
        debug!(model = self.backend.model(), prompt_chars = prompt.chars().count(), "generating");

        let generation = self.backend.generate(&prompt, &kwargs)?;
        info!(model = self.backend.model(), replies = generation.replies.len(), "generation complete");

        Ok(SocketValues::new()
            .with("replies", Value::Texts(generation.replies))
            .with("meta", Value::Json(generation.meta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragpipe_providers::Generation;
    use serde_json::json;

    /// Replies with the kwargs it was called with.
    struct KwargsEcho;

    impl TextGenerator for KwargsEcho {
        fn model(&self) -> &str {
            "kwargs-echo"
        }

        fn generate(&self, prompt: &str, kwargs: &GenerationKwargs) -> Result<Generation> {
            Ok(Generation {
                replies: vec![prompt.to_uppercase()],
                meta: Json::Object(kwargs.clone()),
            })
        }
    }

    fn defaults() -> GenerationKwargs {
        let mut kwargs = GenerationKwargs::new();
        kwargs.insert("max_new_tokens".into(), json!(100));
        kwargs.insert("temperature".into(), json!(0.2));
        kwargs
    }

    #[test]
    fn run_time_kwargs_override_defaults() {
        let generator = Generator::new(Box::new(KwargsEcho)).with_kwargs(defaults());
        let mut out = generator
            .run(
                SocketValues::new()
                    .with("prompt", Value::Text("hi".into()))
                    .with("generation_kwargs", Value::Json(json!({ "max_new_tokens": 350 }))),
            )
            .unwrap();
        assert_eq!(out.take("replies"), Some(Value::Texts(vec!["HI".into()])));
        assert_eq!(
            out.take_optional_json("meta").unwrap(),
            Some(json!({ "max_new_tokens": 350, "temperature": 0.2 }))
        );
    }

    #[test]
    fn non_object_kwargs_are_rejected() {
        let generator = Generator::new(Box::new(KwargsEcho));
        let err = generator
            .run(
                SocketValues::new()
                    .with("prompt", Value::Text("hi".into()))
                    .with("generation_kwargs", Value::Json(json!([1, 2]))),
            )
            .unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }
}
