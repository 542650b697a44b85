//! GraphAggregator (C5): accumulates graph fragments returned by the query
//! backend, drops anything the tabular result doesn't corroborate, and
//! renders the surviving shape to ASCII via an external DOT-to-ASCII
//! endpoint.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const RENDER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl Node {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let kind = kind.into();
        let name = name.into();
        let id = format!("{kind}/{name}");
        Self { id, kind, name, namespace: namespace.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Sequence concatenation; duplicates are tolerated, `sanitize` collapses
    /// them (§8 merge associativity modulo duplicate collapsing).
    pub fn merge(mut self, other: Graph) -> Graph {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self
    }

    /// Deduplicate nodes by id, then drop any node the tabular query result
    /// doesn't corroborate, then drop any edge left dangling.
    ///
    /// `tabular` maps a node-id-or-kind key to an array of row objects; a
    /// node survives only if that array contains an object whose `name`
    /// field equals the node's name.
    pub fn sanitize(&self, tabular: &Value) -> Graph {
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut deduped: Vec<&Node> = Vec::new();
        for n in &self.nodes {
            if seen_ids.insert(n.id.as_str()) {
                deduped.push(n);
            }
        }

        let surviving: Vec<Node> = deduped
            .into_iter()
            .filter(|n| row_confirms_name(tabular, &n.id, &n.kind, &n.name))
            .cloned()
            .collect();

        let surviving_ids: HashSet<&str> = surviving.iter().map(|n| n.id.as_str()).collect();
        let edges: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| surviving_ids.contains(e.from.as_str()) && surviving_ids.contains(e.to.as_str()))
            .cloned()
            .collect();

        Graph { nodes: surviving, edges }
    }

    /// Render as a DOT document. `layout_lr` selects `rankdir = LR`.
    pub fn to_dot(&self, layout_lr: bool) -> String {
        let mut out = String::from("digraph G {\n");
        if layout_lr {
            out.push_str("  rankdir = LR;\n");
        }
        for n in &self.nodes {
            out.push_str(&format!("  \"{}\" [label=\"*{}* {}\"];\n", n.id, n.kind, n.name));
        }
        for e in &self.edges {
            out.push_str(&format!("  \"{}\" -> \"{}\" [label=\":{}\"];\n", e.from, e.to, e.edge_type));
        }
        out.push_str("}\n");
        out
    }
}

fn row_confirms_name(tabular: &Value, id: &str, kind: &str, name: &str) -> bool {
    let rows = tabular.get(id).or_else(|| tabular.get(kind));
    let Some(rows) = rows.and_then(Value::as_array) else {
        return false;
    };
    rows.iter()
        .any(|row| row.get("name").and_then(Value::as_str) == Some(name))
}

/// Converts a DOT document to an ASCII-art rendering via an external HTTP
/// service. Implemented against one long-lived client so it never pays
/// per-call connection setup.
pub struct GraphRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl GraphRenderer {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }

    /// Render `graph` to an ASCII string. Never returns an `Err` the caller
    /// must abort on: an unreachable endpoint yields a textual error instead,
    /// matching the specification's "gracefully return a textual error"
    /// requirement so the tabular result still prints.
    pub async fn render(&self, graph: &Graph, layout_lr: bool) -> String {
        if graph.is_empty() {
            return String::new();
        }
        let dot = graph.to_dot(layout_lr);
        match self.call_endpoint(&dot).await {
            Ok(ascii) => ascii,
            Err(e) => format!("(graph render unavailable: {e})"),
        }
    }

    async fn call_endpoint(&self, dot: &str) -> Result<String, String> {
        let resp = tokio::time::timeout(
            RENDER_TIMEOUT,
            self.client
                .post(&self.endpoint)
                .header("content-type", "text/vnd.graphviz")
                .body(dot.to_string())
                .send(),
        )
        .await
        .map_err(|_| "timed out".to_string())?
        .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("endpoint returned {}", resp.status()));
        }
        resp.text().await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_drops_nodes_not_confirmed_by_tabular_result() {
        let graph = Graph {
            nodes: vec![
                Node::new("Pod", "pod1", ""),
                Node::new("Service", "svc1", ""),
            ],
            edges: vec![Edge { from: "Pod/pod1".into(), to: "Service/svc1".into(), edge_type: "EXPOSE".into() }],
        };
        let tabular = json!({ "Pod": [{"name": "pod1"}] });
        let sanitized = graph.sanitize(&tabular);
        assert_eq!(sanitized.nodes, vec![Node::new("Pod", "pod1", "")]);
        assert!(sanitized.edges.is_empty());
    }

    #[test]
    fn sanitize_dedups_nodes_by_id() {
        let graph = Graph {
            nodes: vec![Node::new("Pod", "pod1", ""), Node::new("Pod", "pod1", "")],
            edges: vec![],
        };
        let tabular = json!({ "Pod": [{"name": "pod1"}] });
        let sanitized = graph.sanitize(&tabular);
        assert_eq!(sanitized.nodes.len(), 1);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let graph = Graph {
            nodes: vec![Node::new("Pod", "pod1", "default")],
            edges: vec![],
        };
        let tabular = json!({ "Pod": [{"name": "pod1"}] });
        let once = graph.sanitize(&tabular);
        let twice = once.sanitize(&tabular);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_associative_modulo_duplicate_collapsing() {
        let a = Graph { nodes: vec![Node::new("Pod", "a", "")], edges: vec![] };
        let b = Graph { nodes: vec![Node::new("Pod", "b", "")], edges: vec![] };
        let c = Graph { nodes: vec![Node::new("Pod", "c", "")], edges: vec![] };

        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        assert_eq!(left.nodes, right.nodes);
    }

    #[test]
    fn to_dot_includes_rankdir_only_when_lr() {
        let g = Graph { nodes: vec![Node::new("Pod", "pod1", "")], edges: vec![] };
        assert!(g.to_dot(true).contains("rankdir = LR"));
        assert!(!g.to_dot(false).contains("rankdir"));
    }

    #[test]
    fn to_dot_labels_nodes_and_edges() {
        let g = Graph {
            nodes: vec![Node::new("Pod", "pod1", "")],
            edges: vec![Edge { from: "Pod/pod1".into(), to: "Service/svc1".into(), edge_type: "EXPOSE".into() }],
        };
        let dot = g.to_dot(false);
        assert!(dot.contains("*Pod* pod1"));
        assert!(dot.contains(":EXPOSE"));
    }

    #[tokio::test]
    async fn render_of_empty_graph_is_empty_string() {
        let client = reqwest::Client::new();
        let renderer = GraphRenderer::new(client, "http://127.0.0.1:0/dot2ascii");
        let out = renderer.render(&Graph::default(), false).await;
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn render_against_unreachable_endpoint_returns_textual_error() {
        let client = reqwest::Client::new();
        let renderer = GraphRenderer::new(client, "http://127.0.0.1:0/dot2ascii");
        let g = Graph { nodes: vec![Node::new("Pod", "pod1", "")], edges: vec![] };
        let out = renderer.render(&g, false).await;
        assert!(out.starts_with("(graph render unavailable:"));
    }
}
