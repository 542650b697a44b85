//! Completer (C3): classifies the token under the cursor into one of four
//! slots (kind, JSONPath, macro, keyword) and returns completion suffixes.
//!
//! `complete` is a pure function so it can be unit tested directly; the
//! [`ShellHelper`] at the bottom wires it into `rustyline`'s completion trait
//! for interactive use.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::macros::MacroStore;
use crate::schema::SchemaIndex;

const KEYWORDS: &[&str] = &[
    "match", "where", "return", "set", "delete", "create", "as", "sum", "count", "in", "contains",
];

static KIND_SLOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*\w*:(\w*)$").unwrap());
static JSONPATH_IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z_]\w*)\.([A-Za-z0-9_.]*)$").unwrap());
static NODE_DECL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*([A-Za-z_]\w*)\s*:\s*([A-Za-z_]\w*)\s*\)").unwrap());
static MACRO_SLOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:(\w*)$").unwrap());
static LAST_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\s(),\[\]]*$").unwrap());

/// Entry point for C3: given the buffer and cursor position (byte offset),
/// return completion suffixes and the length of the token being replaced.
pub fn complete(buffer: &str, cursor: usize, schema: &SchemaIndex, macros: &MacroStore) -> (Vec<String>, usize) {
    let head = &buffer[..cursor.min(buffer.len())];

    if let Some(caps) = KIND_SLOT_RE.captures(head) {
        let prefix = caps.get(1).unwrap().as_str();
        return (kind_suggestions(schema, prefix), prefix.len());
    }

    if let Some(caps) = JSONPATH_IDENT_RE.captures(head) {
        let ident = caps.get(1).unwrap().as_str();
        let path_prefix = caps.get(2).unwrap().as_str();
        if let Some(kind) = declared_kind_for(head, ident) {
            return (jsonpath_suggestions(schema, &kind, path_prefix), path_prefix.len());
        }
    }

    if let Some(caps) = MACRO_SLOT_RE.captures(head) {
        let prefix = caps.get(1).unwrap().as_str();
        let mut names: Vec<String> = macros
            .names_sorted()
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .map(|n| n[prefix.len()..].to_string())
            .collect();
        names.sort();
        return (names, prefix.len());
    }

    let last = LAST_TOKEN_RE.find(head).map(|m| m.as_str()).unwrap_or("");
    let lower = last.to_ascii_lowercase();
    let mut suggestions: Vec<String> = KEYWORDS
        .iter()
        .filter(|k| k.starts_with(&lower))
        .map(|k| k[lower.len()..].to_string())
        .collect();
    suggestions.sort();
    (suggestions, last.len())
}

fn kind_suggestions(schema: &SchemaIndex, prefix: &str) -> Vec<String> {
    let lower = prefix.to_ascii_lowercase();
    let mut out: Vec<String> = schema
        .resource_names()
        .into_iter()
        .filter(|r| r.to_ascii_lowercase().starts_with(&lower))
        .map(|r| r[prefix.len().min(r.len())..].to_string())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn jsonpath_suggestions(schema: &SchemaIndex, kind: &str, path_prefix: &str) -> Vec<String> {
    let Ok(paths) = schema.field_paths(kind) else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for path in paths {
        if !path.starts_with(path_prefix) {
            continue;
        }
        let rest = &path[path_prefix.len()..];
        let next_segment = match rest.find('.') {
            Some(i) => format!("{}.", &rest[..i]),
            None => rest.to_string(),
        };
        if next_segment.is_empty() {
            continue;
        }
        if seen.insert(next_segment.clone()) {
            out.push(next_segment);
        }
    }
    // A path that exists both as a terminal value and as a non-terminal
    // prefix is suppressed in favor of its `.`-terminated form.
    let dotted: std::collections::HashSet<String> =
        out.iter().filter(|s| s.ends_with('.')).map(|s| s.trim_end_matches('.').to_string()).collect();
    out.retain(|s| s.ends_with('.') || !dotted.contains(s.as_str()));
    out.sort();
    out
}

/// Scan `head` for the nearest preceding `(ident:Kind)` declaration of
/// `ident`, so `ident.foo` in a RETURN/WHERE/SET clause can resolve to a
/// schema lookup.
fn declared_kind_for(head: &str, ident: &str) -> Option<String> {
    NODE_DECL_RE
        .captures_iter(head)
        .filter(|c| c.get(1).unwrap().as_str() == ident)
        .last()
        .map(|c| c.get(2).unwrap().as_str().to_string())
}

/// Adapter bridging [`complete`] into `rustyline`'s `Helper` trait family.
/// Classification failures never panic: [`complete`] always falls back to
/// the keyword slot on a buffer it can't otherwise classify. Also wires
/// [`crate::painter::paint`] (C4) in as the editor's highlighter, so every
/// redraw of the in-progress buffer is colorized the same way the final
/// submitted line would be (§2 "each redraw invokes SyntaxPainter").
pub struct ShellHelper {
    pub schema: Arc<SchemaIndex>,
    pub macros: Arc<parking_lot::RwLock<MacroStore>>,
    pub no_color: bool,
}

impl rustyline::completion::Completer for ShellHelper {
    type Candidate = rustyline::completion::Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let macros = self.macros.read();
        let (suffixes, token_len) = complete(line, pos, &self.schema, &macros);
        let start = pos.saturating_sub(token_len);
        let prefix = &line[start..pos];
        let pairs = suffixes
            .into_iter()
            .map(|suffix| {
                let replacement = format!("{prefix}{suffix}");
                rustyline::completion::Pair { display: replacement.clone(), replacement }
            })
            .collect();
        Ok((start, pairs))
    }
}

impl rustyline::hint::Hinter for ShellHelper {
    type Hint = String;
}

impl rustyline::highlight::Highlighter for ShellHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> std::borrow::Cow<'l, str> {
        if self.no_color {
            std::borrow::Cow::Borrowed(line)
        } else {
            std::borrow::Cow::Owned(crate::painter::paint(line, false))
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: rustyline::highlight::CmdKind) -> bool {
        !self.no_color
    }
}

impl rustyline::validate::Validator for ShellHelper {}

impl rustyline::Helper for ShellHelper {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn empty_macros() -> MacroStore {
        let (store, _) = MacroStore::bootstrap(None);
        store
    }

    fn schema_with(specs: HashMap<String, Vec<String>>, gvrs: Vec<(String, crate::schema::Gvr)>) -> SchemaIndex {
        struct P(Vec<(String, crate::schema::Gvr)>);
        impl crate::schema::SchemaProvider for P {
            fn list_gvrs(&self) -> anyhow::Result<Vec<(String, crate::schema::Gvr)>> {
                Ok(self.0.clone())
            }
            fn field_paths(&self, _schema_name: &str) -> anyhow::Result<Vec<String>> {
                Ok(vec![])
            }
        }
        let idx = SchemaIndex::new(Arc::new(P(gvrs)));
        idx.prime();
        idx.seed_resource_specs(specs);
        idx
    }

    #[test]
    fn keyword_slot_completes_match() {
        let schema = schema_with(HashMap::new(), vec![]);
        let macros = empty_macros();
        let (suggestions, span) = complete("mat", 3, &schema, &macros);
        assert_eq!(suggestions, vec!["ch".to_string()]);
        assert_eq!(span, 3);
    }

    #[test]
    fn macro_slot_suggests_defined_names() {
        let schema = schema_with(HashMap::new(), vec![]);
        let macros = empty_macros();
        let (suggestions, span) = complete(":po", 3, &schema, &macros);
        assert!(suggestions.contains(&"ds".to_string()));
        assert_eq!(span, 2);
    }

    #[test]
    fn jsonpath_slot_resolves_declared_kind() {
        let mut specs = HashMap::new();
        specs.insert(
            "io.k8s.api.core.v1.Pod".to_string(),
            vec!["metadata.name".to_string(), "metadata.namespace".to_string(), "spec.nodeName".to_string()],
        );
        let gvrs = vec![("pods".to_string(), crate::schema::Gvr {
            group: "core".into(),
            version: "v1".into(),
            resource: "pods".into(),
        })];
        let schema = schema_with(specs, gvrs);
        let macros = empty_macros();
        let buf = "MATCH (p:Pod) RETURN p.meta";
        let (suggestions, span) = complete(buf, buf.len(), &schema, &macros);
        assert!(suggestions.iter().any(|s| s.starts_with("data.")));
        assert_eq!(span, "meta".len());
    }

    #[test]
    fn kind_slot_suggests_resource_names() {
        let gvrs = vec![
            ("pods".to_string(), crate::schema::Gvr { group: "core".into(), version: "v1".into(), resource: "pods".into() }),
            ("podmonitors".to_string(), crate::schema::Gvr { group: "monitoring".into(), version: "v1".into(), resource: "podmonitors".into() }),
        ];
        let schema = schema_with(HashMap::new(), gvrs);
        let macros = empty_macros();
        let buf = "MATCH (x:pod";
        let (suggestions, span) = complete(buf, buf.len(), &schema, &macros);
        assert!(!suggestions.is_empty());
        assert_eq!(span, "pod".len());
    }

    #[test]
    fn malformed_buffer_falls_back_to_keyword_slot() {
        let schema = schema_with(HashMap::new(), vec![]);
        let macros = empty_macros();
        let (_, span) = complete(")))(((", 7, &schema, &macros);
        assert_eq!(span, 0);
    }
}
