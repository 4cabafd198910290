//! CF-012: `buildBase`, the directory layout shared by every build.

use super::{layers, BUILTIN_OS};
use crate::core::registry::SnipetRegistry;
use crate::core::types::{Env, SnipetDef, TransformCtx, PLATFORM_KEY};

pub fn register(registry: &mut SnipetRegistry) {
    registry.register(
        BUILTIN_OS,
        "buildBase",
        SnipetDef {
            environment: layers(&[
                ("pkgsDir", "$buildDir/packages"),
                ("dlsDir", "$pkgsDir/downloads"),
                ("installPrefix", "../../local"),
                ("localDir", "$pkgsDir/local"),
                ("pkgIncludes", "$localDir/include"),
                ("pkgLibs", "$localDir/lib/lib"),
                ("systemLibs", "-l"),
            ]),
            transform: Some(build_dir),
            ..Default::default()
        },
    );
}

/// `buildDir` is the configured build directory, per platform when one is
/// active.
fn build_dir(_def: &mut SnipetDef, env: &mut Env, ctx: &mut TransformCtx) {
    let dir = match env.get(PLATFORM_KEY) {
        Some(platform) => format!("{}/{}", ctx.settings.build_dir, platform),
        None => ctx.settings.build_dir.clone(),
    };
    env.insert("buildDir".to_string(), dir);
}
