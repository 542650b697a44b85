//! SyntaxPainter (C4): a pure function from a buffer to a colorized buffer.
//!
//! Implemented as a token classifier rather than regex-on-regex: every rule
//! finds candidate spans against the *original* plain buffer and claims them
//! into a non-overlapping set, in the fixed priority order from the
//! specification (keywords, node patterns, relationship patterns, RETURN
//! clause, property literals). A later rule can never re-color a span an
//! earlier rule already claimed, so rules structurally cannot re-enter each
//! other's output. The final buffer is assembled by walking the claims in
//! position order and copying unclaimed ranges verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ansi::{self, wrap};

const KEYWORDS: &[&str] = &[
    "match", "where", "return", "set", "delete", "create", "as", "sum", "count", "in", "contains",
];

const CLAUSE_STOPS: &[&str] = &["where", "order by", "limit", "set", "delete", "create"];

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    let alts = KEYWORDS.join("|");
    Regex::new(&format!(r"(?i)\b(?:{alts})\b")).unwrap()
});

static NODE_PATTERN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Za-z_][A-Za-z0-9_]*)?(?::([A-Za-z_][A-Za-z0-9_]*))?\)").unwrap());

static RELATIONSHIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[:([A-Za-z_][A-Za-z0-9_]*)([^\]]*)\]").unwrap());

static RETURN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\breturn\b").unwrap());

static ARG_VARIABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static PROPERTY_LITERAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^{}]*\}").unwrap());

static PROPERTY_PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)(\s*:\s*)("[^"]*"|'[^']*'|[A-Za-z0-9_.+-]+)"#).unwrap()
});

struct Claim {
    start: usize,
    end: usize,
    rendered: String,
}

/// Apply syntax highlighting to `buffer`. When `no_color` is true this is the
/// identity function (byte-for-byte), per the no-color transparency
/// invariant (§8).
pub fn paint(buffer: &str, no_color: bool) -> String {
    if no_color {
        return buffer.to_string();
    }
    let mut claims: Vec<Claim> = Vec::new();

    claim_keywords(buffer, &mut claims);
    claim_node_patterns(buffer, &mut claims);
    claim_relationship_patterns(buffer, &mut claims);
    claim_return_clause(buffer, &mut claims);
    claim_property_literals(buffer, &mut claims);

    render(buffer, claims)
}

fn overlaps(claims: &[Claim], start: usize, end: usize) -> bool {
    claims.iter().any(|c| start < c.end && c.start < end)
}

fn try_claim(claims: &mut Vec<Claim>, start: usize, end: usize, rendered: String) {
    if start == end || overlaps(claims, start, end) {
        return;
    }
    claims.push(Claim { start, end, rendered });
}

fn claim_keywords(buffer: &str, claims: &mut Vec<Claim>) {
    for m in KEYWORD_RE.find_iter(buffer) {
        let upper = m.as_str().to_ascii_uppercase();
        try_claim(claims, m.start(), m.end(), wrap(ansi::KEYWORD, &upper));
    }
}

fn claim_node_patterns(buffer: &str, claims: &mut Vec<Claim>) {
    for caps in NODE_PATTERN_RE.captures_iter(buffer) {
        let whole = caps.get(0).unwrap();
        let ident = caps.get(1).map(|m| m.as_str());
        let kind = caps.get(2).map(|m| m.as_str());
        if ident.is_none() && kind.is_none() {
            continue; // bare "()" — nothing to color
        }
        let mut rendered = wrap(ansi::BRACKET, "(");
        if let Some(ident) = ident {
            rendered.push_str(&wrap(ansi::IDENT, ident));
        }
        if let Some(kind) = kind {
            rendered.push(':');
            rendered.push_str(&wrap(ansi::KIND, kind));
        }
        rendered.push_str(&wrap(ansi::BRACKET, ")"));
        try_claim(claims, whole.start(), whole.end(), rendered);
    }
}

fn claim_relationship_patterns(buffer: &str, claims: &mut Vec<Claim>) {
    for caps in RELATIONSHIP_RE.captures_iter(buffer) {
        let whole = caps.get(0).unwrap();
        let etype = caps.get(1).unwrap().as_str();
        let extra = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let mut rendered = wrap(ansi::BRACKET, "[");
        rendered.push(':');
        rendered.push_str(&wrap(ansi::KIND, etype));
        rendered.push_str(extra);
        rendered.push_str(&wrap(ansi::BRACKET, "]"));
        try_claim(claims, whole.start(), whole.end(), rendered);
    }
}

/// Color the RETURN argument list: each comma-separated argument's leading
/// variable portion gets the variable color and its JSONPath `.` separators
/// get the separator color; `AS` itself was already claimed as a keyword in
/// `claim_keywords` so it is left untouched here.
fn claim_return_clause(buffer: &str, claims: &mut Vec<Claim>) {
    let Some(kw) = RETURN_RE.find(buffer) else { return };
    let clause_start = kw.end();
    let rest = &buffer[clause_start..];
    let lower_rest = rest.to_ascii_lowercase();
    let mut clause_end = rest.len();
    for stop in CLAUSE_STOPS {
        if let Some(i) = lower_rest.find(stop) {
            clause_end = clause_end.min(i);
        }
    }
    if let Some(i) = rest.find(';') {
        clause_end = clause_end.min(i);
    }
    let clause = &rest[..clause_end];

    for arg in split_top_level_commas(clause) {
        let (seg_start, seg_text) = arg;
        let abs_start = clause_start + seg_start;

        if let Some(caps) = ARG_VARIABLE_RE.captures(seg_text) {
            let ident = caps.get(2).unwrap();
            try_claim(
                claims,
                abs_start + ident.start(),
                abs_start + ident.end(),
                wrap(ansi::VARIABLE, ident.as_str()),
            );
        }
        for (i, ch) in seg_text.char_indices() {
            if ch == '.' {
                try_claim(claims, abs_start + i, abs_start + i + 1, wrap(ansi::JSONPATH_SEP, "."));
            }
        }
    }
}

/// Split `text` on commas that are not nested inside `()`/`{}`/`[]`, keeping
/// the byte offset of each segment relative to `text`.
fn split_top_level_commas(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut seg_start = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push((seg_start, &text[seg_start..i]));
                seg_start = i + 1;
            }
            _ => {}
        }
    }
    out.push((seg_start, &text[seg_start..]));
    out
}

fn claim_property_literals(buffer: &str, claims: &mut Vec<Claim>) {
    for m in PROPERTY_LITERAL_RE.find_iter(buffer) {
        if overlaps(claims, m.start(), m.end()) {
            continue;
        }
        let inner = &m.as_str()[1..m.as_str().len() - 1];
        let recolored = PROPERTY_PAIR_RE.replace_all(inner, |caps: &regex::Captures| {
            let key = &caps[1];
            let sep = &caps[2];
            let value = &caps[3];
            let value_colored = if value.starts_with('"') || value.starts_with('\'') {
                wrap(ansi::PROP_STRING, value)
            } else {
                value.to_string()
            };
            format!("{}{}{}", wrap(ansi::PROP_KEY, key), sep, value_colored)
        });
        let rendered = format!("{}{}{}", wrap(ansi::BRACKET, "{"), recolored, wrap(ansi::BRACKET, "}"));
        try_claim(claims, m.start(), m.end(), rendered);
    }
}

fn render(buffer: &str, mut claims: Vec<Claim>) -> String {
    claims.sort_by_key(|c| c.start);
    let mut out = String::with_capacity(buffer.len() * 2);
    let mut cursor = 0usize;
    for c in &claims {
        if c.start < cursor {
            continue; // defensive: overlap should already be impossible
        }
        out.push_str(&buffer[cursor..c.start]);
        out.push_str(&c.rendered);
        cursor = c.end;
    }
    out.push_str(&buffer[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_color_is_identity() {
        let buf = "MATCH (p:Pod) RETURN p.metadata.name;";
        assert_eq!(paint(buf, true), buf);
    }

    #[test]
    fn keywords_are_uppercased_and_colored() {
        let out = paint("match (p:Pod) return p", false);
        assert!(out.contains(&wrap(ansi::KEYWORD, "MATCH")));
        assert!(out.contains(&wrap(ansi::KEYWORD, "RETURN")));
        assert_eq!(ansi::strip(&out), "MATCH (p:Pod) RETURN p");
    }

    #[test]
    fn node_pattern_with_ident_and_kind() {
        let out = paint("(pods:Pod)", false);
        assert!(out.contains(&wrap(ansi::IDENT, "pods")));
        assert!(out.contains(&wrap(ansi::KIND, "Pod")));
        assert_eq!(ansi::strip(&out), "(pods:Pod)");
    }

    #[test]
    fn kindless_node_pattern() {
        let out = paint("(:Pod)", false);
        assert!(out.contains(&wrap(ansi::KIND, "Pod")));
        assert_eq!(ansi::strip(&out), "(:Pod)");
    }

    #[test]
    fn anonymous_node_pattern() {
        let out = paint("(p)", false);
        assert!(out.contains(&wrap(ansi::IDENT, "p")));
        assert_eq!(ansi::strip(&out), "(p)");
    }

    #[test]
    fn relationship_pattern_colors_type_only() {
        let out = paint("[:EXPOSE]", false);
        assert!(out.contains(&wrap(ansi::KIND, "EXPOSE")));
        assert_eq!(ansi::strip(&out), "[:EXPOSE]");
    }

    #[test]
    fn return_clause_colors_variable_and_dots() {
        let out = paint("MATCH (pods:Pod) RETURN pods.metadata.name", false);
        assert!(out.contains(&wrap(ansi::VARIABLE, "pods")));
        assert_eq!(ansi::strip(&out), "MATCH (pods:Pod) RETURN pods.metadata.name");
    }

    #[test]
    fn return_clause_with_as_keeps_as_as_a_keyword() {
        let out = paint("RETURN p.metadata.name AS name", false);
        assert!(out.contains(&wrap(ansi::KEYWORD, "AS")));
        assert_eq!(ansi::strip(&out), "RETURN p.metadata.name AS name");
    }

    #[test]
    fn property_literal_colors_keys_and_quoted_values() {
        let out = paint(r#"{name: "x", port: 80}"#, false);
        assert!(out.contains(&wrap(ansi::PROP_KEY, "name")));
        assert!(out.contains(&wrap(ansi::PROP_STRING, "\"x\"")));
        assert_eq!(ansi::strip(&out), r#"{name: "x", port: 80}"#);
    }

    #[test]
    fn rules_do_not_reenter_each_others_output() {
        let buf = "MATCH (p:Pod)-[:EXPOSE]->(s:Service) RETURN p.metadata.name, s.metadata.name AS svc";
        let out = paint(buf, false);
        assert_eq!(ansi::strip(&out), buf);
    }

    #[test]
    fn full_pipeline_preserves_plain_text_under_strip() {
        let buf = "CREATE (d:Deployment {name: \"web\", replicas: 3})";
        let out = paint(buf, false);
        assert_eq!(ansi::strip(&out), buf);
    }
}
