//! CF-003: Variable scope expansion.
//!
//! Substitutes `$name` and `${name}` placeholders from the shared
//! accumulator; `$$` is a literal `$`. Expansion is best effort: a string
//! that cannot be expanded is logged and yields `None`, and callers skip just
//! that key, line, or part.

use super::freshness::FreshnessCheck;
use super::types::{ActionLine, Env, SnipetDef, UptodateSpec};
use tracing::{debug, warn};

/// Why a single template failed to expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// Placeholder names a variable not in scope
    Missing(String),
    /// Malformed placeholder at byte offset
    Invalid(usize),
}

impl std::fmt::Display for ExpandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing key: {}", key),
            Self::Invalid(pos) => write!(f, "invalid placeholder at position {}", pos),
        }
    }
}

fn is_ident_start(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphabetic()
}

fn is_ident_char(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphanumeric()
}

/// Substitute every placeholder in `template` from `env`.
pub fn substitute(template: &str, env: &Env) -> Result<String, ExpandError> {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        out.push_str(&template[last..i]);
        let start = i;
        let next = bytes.get(i + 1).copied();

        let (key, end) = match next {
            Some(b'$') => {
                out.push('$');
                i += 2;
                last = i;
                continue;
            }
            Some(b'{') => {
                let close = template[i + 2..]
                    .find('}')
                    .ok_or(ExpandError::Invalid(start))?;
                let key = &template[i + 2..i + 2 + close];
                let valid = !key.is_empty()
                    && is_ident_start(key.as_bytes()[0])
                    && key.bytes().all(is_ident_char);
                if !valid {
                    return Err(ExpandError::Invalid(start));
                }
                (key, i + 3 + close)
            }
            Some(c) if is_ident_start(c) => {
                let mut j = i + 1;
                while j < bytes.len() && is_ident_char(bytes[j]) {
                    j += 1;
                }
                (&template[i + 1..j], j)
            }
            _ => return Err(ExpandError::Invalid(start)),
        };

        let value = env
            .get(key)
            .ok_or_else(|| ExpandError::Missing(key.to_string()))?;
        out.push_str(value);
        i = end;
        last = end;
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Expand one string, logging (snipet, template, accumulator) on failure.
pub fn expand_str(snipet: &str, template: &str, env: &Env) -> Option<String> {
    match substitute(template, env) {
        Ok(s) => Some(s),
        Err(e) => {
            let dump = serde_yaml_ng::to_string(env).unwrap_or_default();
            warn!(
                snipet = %snipet,
                template = %template,
                error = %e,
                "cannot expand template; skipping it\n{}",
                dump
            );
            None
        }
    }
}

/// Expand the snipet's environment fragments into `env`, strictly in order.
///
/// Each value sees the keys defined by earlier fragments (and earlier keys of
/// the same fragment) but never later ones. A value that cannot be expanded
/// leaves its key unset.
pub fn expand_environment(snipet: &str, def: &SnipetDef, env: &mut Env) {
    if def.environment.is_empty() {
        return;
    }
    debug!(snipet = %snipet, "expanding environment");
    for fragment in &def.environment {
        for (key, value) in fragment {
            if let Some(expanded) = expand_str(snipet, value, env) {
                env.insert(key.clone(), expanded);
            }
        }
    }
}

/// Expand action lines. A failed literal line is dropped; a failed part of a
/// composite line is dropped from that line only.
pub fn expand_actions(snipet: &str, actions: &[ActionLine], env: &Env) -> Vec<ActionLine> {
    let mut expanded = Vec::with_capacity(actions.len());
    for action in actions {
        match action {
            ActionLine::Literal(line) => {
                if let Some(line) = expand_str(snipet, line, env) {
                    expanded.push(ActionLine::Literal(line));
                }
            }
            ActionLine::Composite(parts) => {
                let parts = parts
                    .iter()
                    .filter_map(|part| expand_str(snipet, part, env))
                    .collect();
                expanded.push(ActionLine::Composite(parts));
            }
        }
    }
    expanded
}

/// Expand a list of plain strings (targets, dependencies).
pub fn expand_list(snipet: &str, items: &[String], env: &Env) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| expand_str(snipet, item, env))
        .collect()
}

/// Expand freshness specs into predicates. Unexpandable specs are dropped.
pub fn expand_uptodates(snipet: &str, specs: &[UptodateSpec], env: &Env) -> Vec<FreshnessCheck> {
    specs
        .iter()
        .filter_map(|spec| match spec {
            UptodateSpec::CheckVersion(tmpl) => {
                expand_str(snipet, tmpl, env).map(FreshnessCheck::version)
            }
            UptodateSpec::FileUnchanged(tmpl) => {
                expand_str(snipet, tmpl, env).map(|path| FreshnessCheck::FileUnchanged { path })
            }
        })
        .collect()
}
