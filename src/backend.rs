//! QueryBackend (external interface, §6): the shell submits Cypher-inspired
//! statements and receives back a tagged `{data, graph}` response. Parsing
//! and execution are fully delegated — this crate's core is the shell, not a
//! query engine — so the trait and its HTTP implementation stay narrow.

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::graph::Graph;
use crate::schema::Gvr;

/// Response shape for a single executed statement. Constructed from the
/// backend's wire JSON in one deserialization step so downstream code never
/// re-pattern-matches on a dynamic `Value` to pull out `data`/`graph`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub graph: Graph,
}

/// External collaborator out of scope for this crate: parses and executes
/// statements against a live cluster (or a service that does). The shipped
/// implementation ([`HttpQueryBackend`]) talks to a Cyphernetes API server;
/// any other backend need only implement this trait.
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    /// Validate `text` without executing it. Returns an opaque error message
    /// on a parse failure (the AST itself is not surfaced to the shell).
    async fn parse(&self, text: &str) -> Result<()>;

    /// Execute a single statement in `namespace` (empty string meaning "all
    /// namespaces"). `cancel` is the cooperative cancellation token for this
    /// request (§5): implementations should race their I/O against
    /// `cancel.cancelled()` and return promptly rather than letting the
    /// request run to completion after the caller has given up on it.
    async fn execute(&self, text: &str, namespace: &str, cancel: CancellationToken) -> Result<QueryResponse>;

    async fn list_gvrs(&self) -> Result<Vec<(String, Gvr)>>;

    async fn field_paths(&self, kind: &str) -> Result<Vec<String>>;
}

/// HTTP/JSON implementation reusing one long-lived [`reqwest::Client`]. It
/// deliberately carries no login/cookie/CSRF machinery — cluster
/// authentication is out of scope here — so a rejected request simply
/// surfaces as an execution error, the same as any other backend failure.
pub struct HttpQueryBackend {
    base: Url,
    client: reqwest::Client,
}

impl HttpQueryBackend {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).context("invalid backend URL")?;
        Ok(Self { base, client })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).context("invalid backend path")
    }
}

#[async_trait::async_trait]
impl QueryBackend for HttpQueryBackend {
    async fn parse(&self, text: &str) -> Result<()> {
        let url = self.url("/parse")?;
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "query": text }))
            .send()
            .await
            .context("parse request failed")?;
        if !resp.status().is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(anyhow!("{}", extract_message(&body)));
        }
        Ok(())
    }

    async fn execute(&self, text: &str, namespace: &str, cancel: CancellationToken) -> Result<QueryResponse> {
        let url = self.url("/execute")?;
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "query": text, "namespace": namespace }))
            .send();

        let resp = tokio::select! {
            result = request => result.context("execute request failed")?,
            _ = cancel.cancelled() => return Err(anyhow!("request cancelled")),
        };
        let status = resp.status();
        let body: Value = tokio::select! {
            body = resp.json() => body.unwrap_or(Value::Null),
            _ = cancel.cancelled() => return Err(anyhow!("request cancelled")),
        };
        if !status.is_success() {
            return Err(anyhow!("{}", extract_message(&body)));
        }
        serde_json::from_value(body).context("malformed execute response")
    }

    async fn list_gvrs(&self) -> Result<Vec<(String, Gvr)>> {
        let url = self.url("/discovery/gvrs")?;
        let resp = self.client.get(url).send().await.context("discovery request failed")?;
        let body: Vec<GvrWire> = resp.json().await.context("malformed discovery response")?;
        Ok(body
            .into_iter()
            .map(|w| (w.alias, Gvr { group: w.group, version: w.version, resource: w.resource }))
            .collect())
    }

    async fn field_paths(&self, kind: &str) -> Result<Vec<String>> {
        let url = self.url(&format!("/discovery/fields/{kind}"))?;
        let resp = self.client.get(url).send().await.context("field-path request failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("kind not indexed: {kind}"));
        }
        resp.json::<Vec<String>>().await.context("malformed field-path response")
    }
}

#[derive(Debug, Deserialize)]
struct GvrWire {
    alias: String,
    group: String,
    version: String,
    resource: String,
}

fn extract_message(body: &Value) -> String {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unknown backend error")
        .to_string()
}
