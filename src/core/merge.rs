//! CF-004: Deep merge of YAML data and snipet definitions.
//!
//! Mappings merge key by key, sequences concatenate, and anything else is
//! overwritten by the incoming value. The operation is associative, so
//! layering descriptions or snipets in any grouping gives the same result.

use super::types::SnipetDef;
use serde_yaml_ng::Value;
use tracing::warn;

/// Deep-merge `incoming` into `base`.
pub fn merge_values(base: &mut Value, incoming: Value) {
    merge_at(base, incoming, ".");
}

fn merge_at(base: &mut Value, incoming: Value, path: &str) {
    match (base, incoming) {
        (Value::Mapping(base_map), Value::Mapping(in_map)) => {
            for (key, value) in in_map {
                match base_map.get_mut(&key) {
                    Some(existing) => {
                        let child = format!("{}.{}", path.trim_end_matches('.'), key_label(&key));
                        merge_at(existing, value, &child);
                    }
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (Value::Sequence(base_seq), Value::Sequence(in_seq)) => {
            base_seq.extend(in_seq);
        }
        (base, incoming) => {
            if (base.is_mapping() || base.is_sequence()) && !incoming.is_null() {
                warn!(path = %path, "incompatible types while merging; incoming value replaces existing");
            }
            *base = incoming;
        }
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

impl SnipetDef {
    /// Merge another definition into this one: lists concatenate (ours
    /// first), scalars present in `other` overwrite, structured extras
    /// deep-merge, and a transform in `other` replaces ours.
    pub fn merge(&mut self, other: &SnipetDef) {
        self.environment.extend(other.environment.iter().cloned());
        self.actions.extend(other.actions.iter().cloned());
        self.snipet_deps.extend(other.snipet_deps.iter().cloned());
        self.tools.extend(other.tools.iter().cloned());
        self.uptodates.extend(other.uptodates.iter().cloned());
        self.targets.extend(other.targets.iter().cloned());
        self.file_dependencies
            .extend(other.file_dependencies.iter().cloned());
        self.task_dependencies
            .extend(other.task_dependencies.iter().cloned());

        if other.platform.is_some() {
            self.platform.clone_from(&other.platform);
        }
        if other.platform_specific.is_some() {
            self.platform_specific = other.platform_specific;
        }
        if other.task_snipet.is_some() {
            self.task_snipet.clone_from(&other.task_snipet);
        }
        if other.estimated_load.is_some() {
            self.estimated_load = other.estimated_load;
        }
        if other.use_worker_task.is_some() {
            self.use_worker_task = other.use_worker_task;
        }
        if other.transform.is_some() {
            self.transform = other.transform;
        }

        for (key, value) in &other.extra {
            match self.extra.get_mut(key) {
                Some(existing) => merge_at(existing, value.clone(), key),
                None => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ActionLine;
    use proptest::prelude::*;

    fn yaml(s: &str) -> Value {
        serde_yaml_ng::from_str(s).unwrap()
    }

    #[test]
    fn test_cf004_merge_maps_recursively() {
        let mut base = yaml("a: {x: 1, y: 2}\nb: keep");
        merge_values(&mut base, yaml("a: {y: 3, z: 4}\nc: new"));
        assert_eq!(base, yaml("a: {x: 1, y: 3, z: 4}\nb: keep\nc: new"));
    }

    #[test]
    fn test_cf004_merge_lists_concatenate() {
        let mut base = yaml("files: [a, b]");
        merge_values(&mut base, yaml("files: [c]"));
        assert_eq!(base, yaml("files: [a, b, c]"));
    }

    #[test]
    fn test_cf004_merge_scalar_overwrites() {
        let mut base = yaml("version: v1");
        merge_values(&mut base, yaml("version: v2"));
        assert_eq!(base, yaml("version: v2"));
    }

    #[test]
    fn test_cf004_merge_incompatible_replaces() {
        let mut base = yaml("deps: [a]");
        merge_values(&mut base, yaml("deps: {files: [b]}"));
        assert_eq!(base, yaml("deps: {files: [b]}"));
    }

    #[test]
    fn test_cf004_snipet_merge() {
        let mut root: SnipetDef = serde_yaml_ng::from_str(
            r#"
taskSnipet: cmakeCompile
environment: {repoVersion: v1}
dependencies: {files: [extra.cmake]}
"#,
        )
        .unwrap();
        let snipet: SnipetDef = serde_yaml_ng::from_str(
            r#"
snipetDeps: [gitHubDownload]
platformSpecific: true
environment: [{doitTaskName: compile-install.$taskName}]
actions: [ninja install]
dependencies: {files: [CMakeLists.txt]}
"#,
        )
        .unwrap();
        root.merge(&snipet);

        assert_eq!(root.environment.len(), 2);
        assert_eq!(root.environment[0]["repoVersion"], "v1");
        assert_eq!(root.snipet_deps, vec!["gitHubDownload"]);
        assert!(root.is_platform_specific());
        assert_eq!(root.actions, vec![ActionLine::from("ninja install")]);
        assert_eq!(
            root.extra["dependencies"],
            yaml("files: [extra.cmake, CMakeLists.txt]")
        );
    }

    #[test]
    fn test_cf004_snipet_merge_keeps_unset_scalars() {
        let mut a = SnipetDef {
            platform: Some("linux-x86_64".into()),
            estimated_load: Some(10.0),
            ..Default::default()
        };
        a.merge(&SnipetDef::default());
        assert_eq!(a.platform.as_deref(), Some("linux-x86_64"));
        assert_eq!(a.estimated_load, Some(10.0));
    }

    fn mapping(pairs: Vec<(&str, Option<Value>)>) -> Value {
        let mut m = serde_yaml_ng::Mapping::new();
        for (k, v) in pairs {
            if let Some(v) = v {
                m.insert(Value::String(k.to_string()), v);
            }
        }
        Value::Mapping(m)
    }

    fn arb_seq() -> impl Strategy<Value = Value> {
        prop::collection::vec("[a-z]{0,4}", 0..3)
            .prop_map(|v| Value::Sequence(v.into_iter().map(Value::String).collect()))
    }

    /// Description-shaped maps: a key always holds the same kind of value.
    fn arb_map() -> impl Strategy<Value = Value> {
        let nested = (
            prop::option::of(arb_seq()),
            prop::option::of("[a-z]{0,4}".prop_map(Value::String)),
        )
            .prop_map(|(x, y)| mapping(vec![("x", x), ("y", y)]));
        (
            prop::option::of(arb_seq()),
            prop::option::of("[a-z]{0,4}".prop_map(Value::String)),
            prop::option::of(nested),
        )
            .prop_map(|(a, b, c)| mapping(vec![("a", a), ("b", b), ("c", c)]))
    }

    fn merged(mut a: Value, b: Value) -> Value {
        merge_values(&mut a, b);
        a
    }

    proptest! {
        #[test]
        fn prop_cf004_merge_associative(a in arb_map(), b in arb_map(), c in arb_map()) {
            let left = merged(merged(a.clone(), b.clone()), c.clone());
            let right = merged(a, merged(b, c));
            prop_assert_eq!(left, right);
        }

        #[test]
        fn prop_cf004_snipet_lists_associative(
            a in prop::collection::vec("[a-z]{1,4}", 0..4),
            b in prop::collection::vec("[a-z]{1,4}", 0..4),
            c in prop::collection::vec("[a-z]{1,4}", 0..4),
        ) {
            let def = |deps: &Vec<String>| SnipetDef { snipet_deps: deps.clone(), ..Default::default() };
            let mut left = def(&a);
            left.merge(&def(&b));
            left.merge(&def(&c));

            let mut bc = def(&b);
            bc.merge(&def(&c));
            let mut right = def(&a);
            right.merge(&bc);

            prop_assert_eq!(left.snipet_deps, right.snipet_deps);
        }
    }
}
