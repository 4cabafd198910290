//! CF-005: Snipet registry, a per-platform name → definition table.
//!
//! Filled once at startup by explicit registration calls and read-only
//! afterwards. Lookups hand out shared references; the composer clones a
//! definition before it mutates anything.

use super::types::SnipetDef;
use indexmap::IndexMap;

/// All known snipets, grouped by OS type (e.g. `linux`).
#[derive(Debug, Clone, Default)]
pub struct SnipetRegistry {
    snipets: IndexMap<String, IndexMap<String, SnipetDef>>,
}

impl SnipetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or overwrite) a definition.
    pub fn register(&mut self, platform: &str, name: &str, def: SnipetDef) {
        self.snipets
            .entry(platform.to_string())
            .or_default()
            .insert(name.to_string(), def);
    }

    /// Find a definition, if registered.
    pub fn lookup(&self, platform: &str, name: &str) -> Option<&SnipetDef> {
        self.snipets.get(platform).and_then(|s| s.get(name))
    }

    /// Iterate `(platform, name, def)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &SnipetDef)> {
        self.snipets.iter().flat_map(|(platform, snipets)| {
            snipets
                .iter()
                .map(move |(name, def)| (platform.as_str(), name.as_str(), def))
        })
    }

    pub fn len(&self) -> usize {
        self.snipets.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def_with_tool(tool: &str) -> SnipetDef {
        SnipetDef {
            tools: vec![tool.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_cf005_register_lookup() {
        let mut reg = SnipetRegistry::new();
        reg.register("linux", "gccCompile", def_with_tool("gcc"));
        assert_eq!(reg.lookup("linux", "gccCompile").unwrap().tools, vec!["gcc"]);
        assert!(reg.lookup("linux", "missing").is_none());
        assert!(reg.lookup("darwin", "gccCompile").is_none());
    }

    #[test]
    fn test_cf005_register_overwrites() {
        let mut reg = SnipetRegistry::new();
        reg.register("linux", "cc", def_with_tool("gcc"));
        reg.register("linux", "cc", def_with_tool("clang"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup("linux", "cc").unwrap().tools, vec!["clang"]);
    }

    #[test]
    fn test_cf005_iter_order() {
        let mut reg = SnipetRegistry::new();
        assert!(reg.is_empty());
        reg.register("linux", "b", SnipetDef::default());
        reg.register("linux", "a", SnipetDef::default());
        reg.register("darwin", "c", SnipetDef::default());
        let names: Vec<_> = reg.iter().map(|(p, n, _)| format!("{}/{}", p, n)).collect();
        assert_eq!(names, vec!["linux/b", "linux/a", "darwin/c"]);
    }

    #[test]
    fn test_cf005_cloned_def_does_not_leak() {
        let mut reg = SnipetRegistry::new();
        reg.register("linux", "x", def_with_tool("gcc"));
        let mut copy = reg.lookup("linux", "x").unwrap().clone();
        copy.tools.push("ld".into());
        assert_eq!(reg.lookup("linux", "x").unwrap().tools, vec!["gcc"]);
    }
}
