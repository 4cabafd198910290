//! CF-012: Package snipets. Download a GitHub release and build it with
//! CMake + Ninja.
//!
//! A package description names `repoPath` and `repoVersion` and may add:
//!
//! ```yaml
//! dependencies: { packages: [..], pkgLibs: [..], pkgIncludes: [..], files: [..] }
//! created:      { libs: [..], includes: [..] }
//! cmake:        { options: { NAME: value } }
//! ```

use super::{layers, lines, scalar_text, section_list, strings, BUILTIN_OS};
use crate::core::registry::SnipetRegistry;
use crate::core::types::{
    ActionLine, Env, EnvFragment, SnipetDef, TransformCtx, UptodateSpec, PLATFORM_KEY,
};
use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};

pub fn register(registry: &mut SnipetRegistry) {
    registry.register(
        BUILTIN_OS,
        "packageBase",
        SnipetDef {
            snipet_deps: strings(&["buildBase"]),
            environment: layers(&[("pkgDir", "$pkgsDir/$taskName")]),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "gitHubDownload",
        SnipetDef {
            snipet_deps: strings(&["packageBase"]),
            environment: layers(&[
                ("doitTaskName", "download-extract.$taskName"),
                (
                    "url",
                    "https://github.com/${repoPath}/archive/refs/tags/${repoVersion}.tar.gz",
                ),
                ("tarFile", "${taskName}-${repoVersion}.tar.gz"),
                ("dlName", "$dlsDir/$tarFile"),
            ]),
            actions: lines(&[
                "mkdir -p $dlsDir",
                "mkdir -p $pkgDir",
                "curl --location --output $dlName $url",
                "tar xf $dlName --strip-components=1 --directory=$pkgDir",
            ]),
            uptodates: vec![UptodateSpec::CheckVersion("$repoVersion".to_string())],
            targets: strings(&["$dlName", "$pkgDir/CMakeLists.txt"]),
            tools: strings(&["curl", "tar"]),
            use_worker_task: Some(true),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "cmakeCompile",
        SnipetDef {
            snipet_deps: strings(&["gitHubDownload"]),
            platform_specific: Some(true),
            environment: layers(&[("doitTaskName", "compile-install.$taskName")]),
            actions: vec![
                ActionLine::from("mkdir -p $pkgDir/build"),
                ActionLine::from("cd $pkgDir/build"),
                ActionLine::Composite(strings(&[
                    "cmake $cmakeOptions ..",
                    "-D CMAKE_GENERATOR=Ninja",
                    "-D CMAKE_PREFIX_PATH=$installPrefix",
                    "-D CMAKE_INSTALL_PREFIX=$installPrefix",
                ])),
                ActionLine::from("ninja -j $$(nproc) install"),
            ],
            // one at a time per machine
            estimated_load: Some(10.0),
            extra: IndexMap::from([("dependencies".to_string(), file_dependency("CMakeLists.txt"))]),
            task_dependencies: strings(&["download-extract.$taskName.$platform"]),
            tools: strings(&["cmake", "ninja"]),
            use_worker_task: Some(true),
            transform: Some(cmake_compile),
            ..Default::default()
        },
    );
}

/// `{files: [name]}`
fn file_dependency(name: &str) -> Value {
    let mut deps = Mapping::new();
    deps.insert("files".into(), Value::Sequence(vec![name.into()]));
    Value::Mapping(deps)
}

/// Turn `dependencies`, `created` and `cmake.options` into task/file
/// dependencies, targets and the `cmakeOptions` variable.
fn cmake_compile(def: &mut SnipetDef, env: &mut Env, _ctx: &mut TransformCtx) {
    for pkg in section_list(def, "dependencies", "packages") {
        let dep = match env.get(PLATFORM_KEY) {
            Some(platform) => format!("compile-install.{}.{}", pkg, platform),
            None => format!("compile-install.{}", pkg),
        };
        def.task_dependencies.push(dep);
    }

    let mut file_deps = Vec::new();
    for lib in section_list(def, "dependencies", "pkgLibs") {
        file_deps.push(format!("${{pkgLibs}}{}", lib));
    }
    for include in section_list(def, "dependencies", "pkgIncludes") {
        file_deps.push(format!("${{pkgIncludes}}/{}", include));
    }
    for file in section_list(def, "dependencies", "files") {
        file_deps.push(format!("${{pkgDir}}/{}", file));
    }
    def.file_dependencies.extend(file_deps);

    let mut targets = Vec::new();
    for lib in section_list(def, "created", "libs") {
        targets.push(format!("${{pkgLibs}}{}", lib));
    }
    for include in section_list(def, "created", "includes") {
        targets.push(format!("${{pkgIncludes}}/{}", include));
    }
    def.targets.extend(targets);

    let mut options = String::from(" ");
    if let Some(Value::Mapping(map)) = def.extra.get("cmake").and_then(|c| c.get("options")) {
        for (name, value) in map {
            options.push_str(&format!(" -D{}={}", scalar_text(name), scalar_text(value)));
        }
    }
    def.environment
        .push(EnvFragment::from([("cmakeOptions".to_string(), options)]));
}
