//! Built-in snipets: the standard build-step templates.
//!
//! Each module registers its definitions for the `linux` registry and
//! provides the transforms those definitions need:
//! - `base`: shared build directory layout
//! - `ansi_c`: gcc compile / link / archive
//! - `package`: GitHub download + CMake build
//! - `latex`: diagrams, code chunks, typesetting

pub mod ansi_c;
pub mod base;
pub mod latex;
pub mod package;

use crate::core::registry::SnipetRegistry;
use crate::core::types::{ActionLine, EnvFragment, SnipetDef};
use serde_yaml_ng::Value;

/// Registry platform the built-ins are defined for.
pub const BUILTIN_OS: &str = "linux";

/// Register every built-in snipet.
pub fn register_builtin(registry: &mut SnipetRegistry) {
    base::register(registry);
    ansi_c::register(registry);
    package::register(registry);
    latex::register(registry);
}

/// One single-key fragment per pair, so each value sees all earlier ones.
pub(crate) fn layers(pairs: &[(&str, &str)]) -> Vec<EnvFragment> {
    pairs
        .iter()
        .map(|(k, v)| EnvFragment::from([(k.to_string(), v.to_string())]))
        .collect()
}

/// One multi-key fragment.
pub(crate) fn fragment(pairs: &[(&str, &str)]) -> EnvFragment {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn lines(items: &[&str]) -> Vec<ActionLine> {
    items.iter().map(|s| ActionLine::from(*s)).collect()
}

/// Render a YAML scalar as plain text.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml_ng::to_string(other)
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

/// `def.<section>.<key>` as a list of strings; a scalar counts as one item.
pub(crate) fn section_list(def: &SnipetDef, section: &str, key: &str) -> Vec<String> {
    match def.extra.get(section).and_then(|s| s.get(key)) {
        Some(Value::Sequence(items)) => items.iter().map(scalar_text).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![scalar_text(other)],
    }
}
