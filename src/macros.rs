//! MacroStore (C2): load, validate, store and expand named templated
//! statements from the embedded default set and a user file.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ShellError, ShellResult};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const DEFAULT_MACROS: &str = include_str!("../assets/default.macros");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub parameters: Vec<String>,
    pub statements: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct MacroStore {
    macros: HashMap<String, Macro>,
}

impl MacroStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-loaded with the embedded defaults. IO errors
    /// loading the optional user file are reported to the caller as a
    /// `ShellError::Io` but never abort construction (§7).
    pub fn bootstrap(user_macros_path: Option<&Path>) -> (Self, Option<ShellError>) {
        let mut store = Self::new();
        // Defaults can't fail to parse: they ship with the crate and are
        // exercised by tests, but guard anyway rather than panicking at
        // startup on a malformed build.
        if let Ok(defaults) = parse_macro_source(DEFAULT_MACROS) {
            for m in defaults {
                store.add(m, true);
            }
        }
        let mut warning = None;
        if let Some(path) = user_macros_path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(text) => match parse_macro_source(&text) {
                        Ok(user_macros) => {
                            for m in user_macros {
                                store.add(m, false);
                            }
                        }
                        Err(e) => warning = Some(ShellError::io(format!("failed to parse {}: {e}", path.display()))),
                    },
                    Err(e) => warning = Some(ShellError::io(format!("failed to read {}: {e}", path.display()))),
                }
            }
        }
        (store, warning)
    }

    /// Add policy (§4.2): a default-source definition always replaces; a
    /// user-source definition only takes effect if the name is not yet
    /// present.
    pub fn add(&mut self, m: Macro, from_default: bool) {
        if from_default || !self.macros.contains_key(&m.name) {
            self.macros.insert(m.name.clone(), m);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn names_sorted(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.macros.keys().map(|s| s.as_str()).collect();
        v.sort();
        v
    }

    pub fn iter_sorted(&self) -> Vec<&Macro> {
        let mut v: Vec<&Macro> = self.macros.values().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    /// Expand a macro invocation into its ordered concrete statements.
    pub fn execute(&self, name: &str, args: &[String]) -> ShellResult<Vec<String>> {
        let m = self
            .macros
            .get(name)
            .ok_or_else(|| ShellError::macro_error(format!("macro not found: {name}")))?;
        if args.len() != m.parameters.len() {
            return Err(ShellError::macro_error(format!(
                "macro {name} expects {} argument(s), got {}",
                m.parameters.len(),
                args.len()
            )));
        }
        let bindings: HashMap<&str, &str> = m
            .parameters
            .iter()
            .map(|p| p.as_str())
            .zip(args.iter().map(|a| a.as_str()))
            .collect();
        let expanded: Vec<String> = m
            .statements
            .iter()
            .map(|tmpl| substitute_single_pass(tmpl, &bindings))
            .collect();
        if expanded.is_empty() {
            return Err(ShellError::macro_error(format!("macro {name} expanded to no statements")));
        }
        Ok(expanded)
    }
}

/// Substitute every `$param` occurrence with its bound argument in a single
/// left-to-right scan of the template, never rescanning already-substituted
/// text (see SPEC_FULL §9 — this is the corrected behavior; a naive loop
/// over parameters calling `str::replace` once per parameter would let an
/// argument containing `$other_param` get substituted again on a later
/// pass).
fn substitute_single_pass(template: &str, bindings: &HashMap<&str, &str>) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            if let Some((name, len)) = match_longest_param(&template[i + 1..], bindings) {
                out.push_str(bindings[name]);
                i += 1 + len;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Find the longest declared parameter name matching at the start of `rest`,
/// bounded so e.g. `$d` doesn't also match a parameter named `$deploy` if
/// both were declared ($deploy would need to appear first in the text to
/// matter, but matching longest-first keeps the intent explicit and
/// unambiguous).
fn match_longest_param<'a>(rest: &str, bindings: &HashMap<&'a str, &str>) -> Option<(&'a str, usize)> {
    bindings
        .keys()
        .filter(|name| rest.starts_with(**name) && !is_ident_continuation(rest.as_bytes().get(name.len()).copied()))
        .max_by_key(|name| name.len())
        .map(|name| (*name, name.len()))
}

fn is_ident_continuation(b: Option<u8>) -> bool {
    matches!(b, Some(c) if c.is_ascii_alphanumeric() || c == b'_')
}

/// Parse the macro-file grammar (§4.2) into a list of validated macros.
pub fn parse_macro_source(text: &str) -> Result<Vec<Macro>, String> {
    let mut out = Vec::new();
    let mut current: Option<(String, Vec<String>, Option<String>)> = None;
    let mut pending_statement = String::new();
    let mut statements: Vec<String> = Vec::new();

    let seal_pending = |pending_statement: &mut String, statements: &mut Vec<String>| {
        let trimmed = pending_statement.trim();
        if !trimmed.is_empty() {
            statements.push(trimmed.to_string());
        }
        pending_statement.clear();
    };

    let finish_macro = |current: &mut Option<(String, Vec<String>, Option<String>)>,
                        statements: &mut Vec<String>,
                        out: &mut Vec<Macro>|
     -> Result<(), String> {
        if let Some((name, parameters, description)) = current.take() {
            if statements.is_empty() {
                return Err(format!("macro '{name}' has no statements"));
            }
            out.push(Macro {
                name,
                parameters,
                statements: std::mem::take(statements),
                description,
            });
        }
        Ok(())
    };

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix(':') {
            seal_pending(&mut pending_statement, &mut statements);
            finish_macro(&mut current, &mut statements, &mut out)?;

            let (header_body, description) = match header.split_once('#') {
                Some((body, desc)) => (body.trim(), Some(desc.trim().to_string())),
                None => (header.trim(), None),
            };
            let mut parts = header_body.split_whitespace();
            let name = parts
                .next()
                .ok_or_else(|| format!("line {}: empty macro header", lineno + 1))?
                .to_string();
            if !NAME_RE.is_match(&name) {
                return Err(format!("line {}: invalid macro name '{name}'", lineno + 1));
            }
            let parameters: Vec<String> = parts.map(|p| p.to_string()).collect();
            current = Some((name, parameters, description));
            continue;
        }

        if current.is_none() {
            return Err(format!("line {}: statement text before any macro header", lineno + 1));
        }

        if !pending_statement.is_empty() {
            pending_statement.push(' ');
        }
        pending_statement.push_str(line);

        if line.ends_with(';') {
            seal_pending(&mut pending_statement, &mut statements);
        }
    }

    seal_pending(&mut pending_statement, &mut statements);
    finish_macro(&mut current, &mut statements, &mut out)?;

    Ok(out)
}
