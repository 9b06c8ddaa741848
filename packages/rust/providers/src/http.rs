//! Blocking HTTP plumbing shared by the remote backends.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use ragpipe_shared::{ApiKey, HttpConfig, RagPipeError, Result};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("ragpipe/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Build a blocking client with the configured request timeout.
pub(crate) fn build_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RagPipeError::Provider(format!("failed to build HTTP client: {e}")))
}

/// Join `path` onto a base URL, keeping any path the base already has.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&base)
        .and_then(|b| b.join(path.trim_start_matches('/')))
        .map_err(|e| RagPipeError::config(format!("invalid provider URL {base}{path}: {e}")))
}

/// POST a JSON body with bearer auth and decode the JSON response.
pub(crate) fn post_json<B, R>(client: &Client, url: &Url, key: &ApiKey, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    debug!(%url, "provider request");
    let response = client
        .post(url.clone())
        .bearer_auth(key.expose())
        .json(body)
        .send()
        .map_err(|e| RagPipeError::Provider(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        return Err(RagPipeError::Provider(format!("{url}: HTTP {status}: {body}")));
    }

    response
        .json()
        .map_err(|e| RagPipeError::Provider(format!("{url}: unexpected response body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let url = endpoint("https://api.openai.com/v1", "/embeddings").expect("url");
        assert_eq!(url.as_str(), "https://api.openai.com/v1/embeddings");

        let url = endpoint("http://localhost:8080/hf/", "models/a/b").expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/hf/models/a/b");
    }

    #[test]
    fn endpoint_rejects_garbage() {
        assert!(endpoint("not a url", "x").is_err());
    }
}
