//! CF-012: ANSI-C snipets. Compile, link and install with gcc.
//!
//! Roots supply `srcName`/`srcBaseName` (compile), `projName`/`in`
//! (link), or `out`/`in` (static library).

use super::{layers, lines, strings, BUILTIN_OS};
use crate::core::registry::SnipetRegistry;
use crate::core::types::SnipetDef;

pub fn register(registry: &mut SnipetRegistry) {
    registry.register(
        BUILTIN_OS,
        "srcBase",
        SnipetDef {
            snipet_deps: strings(&["buildBase"]),
            environment: layers(&[
                ("srcDir", "."),
                ("installDir", "../local"),
                ("where", "$installDir"),
                ("cc", "gcc"),
            ]),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "gccCompile",
        SnipetDef {
            snipet_deps: strings(&["srcBase"]),
            environment: layers(&[
                ("doitTaskName", "compile-$taskName"),
                ("in", "$srcName"),
                ("out", "${srcBaseName}.o"),
            ]),
            actions: lines(&["$cc $CFLAGS $INCLUDES -c -o $out $in"]),
            targets: strings(&["$out"]),
            tools: strings(&["gcc"]),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "gccInstallCommand",
        SnipetDef {
            snipet_deps: strings(&["srcBase"]),
            environment: layers(&[
                ("doitTaskName", "link-$taskName"),
                ("out", "$projName"),
                ("LINKFLAGS", ""),
            ]),
            actions: lines(&["$cc -o $out $in $LINKFLAGS $LIBS", "install $out $where"]),
            tools: strings(&["gcc", "install"]),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "gccInstallStaticLibrary",
        SnipetDef {
            snipet_deps: strings(&["srcBase"]),
            environment: layers(&[("doitTaskName", "library-$taskName"), ("ar", "ar")]),
            actions: lines(&["$ar rcs $out $in", "install $out $where"]),
            tools: strings(&["ar", "install"]),
            ..Default::default()
        },
    );
}
