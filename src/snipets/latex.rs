//! CF-012: LaTeX snipets.
//!
//! `typesetLatex` lists its diagrams and code chunks under `dependencies`;
//! each one becomes its own root task on the same platform.

use super::{fragment, layers, lines, section_list, strings, BUILTIN_OS};
use crate::core::registry::SnipetRegistry;
use crate::core::types::{Env, SnipetDef, TransformCtx, PLATFORM_KEY};

pub fn register(registry: &mut SnipetRegistry) {
    registry.register(
        BUILTIN_OS,
        "latexBase",
        SnipetDef {
            snipet_deps: strings(&["buildBase"]),
            environment: layers(&[("latexDir", "$buildDir/latex")]),
            use_worker_task: Some(true),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "drawDiagram",
        SnipetDef {
            snipet_deps: strings(&["latexBase"]),
            platform_specific: Some(true),
            environment: vec![fragment(&[
                ("doitTaskName", "latex-diagram-$taskName"),
                ("in", "${taskName}.tex"),
            ])],
            actions: lines(&["lpilMagicRunner $in $latexDir"]),
            tools: strings(&["lpilMagicRunner", "context"]),
            use_worker_task: Some(true),
            transform: Some(draw_diagram),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "pygmentizeCodeChunk",
        SnipetDef {
            snipet_deps: strings(&["latexBase"]),
            platform_specific: Some(true),
            environment: vec![fragment(&[
                ("doitTaskName", "latex-pygment-$taskName"),
                ("in", "$taskName"),
            ])],
            actions: lines(&["cd $latexDir", "pygmentize -f latex -l cpp -o $out $in"]),
            tools: strings(&["pygmentize"]),
            use_worker_task: Some(true),
            transform: Some(pygmentize_code_chunk),
            ..Default::default()
        },
    );

    registry.register(
        BUILTIN_OS,
        "typesetLatex",
        SnipetDef {
            snipet_deps: strings(&["latexBase"]),
            platform_specific: Some(true),
            environment: vec![fragment(&[
                ("doitTaskName", "latex-typeset-$taskName"),
                ("in", "$taskName"),
            ])],
            actions: lines(&["lpilMagicRunner $in $latexDir"]),
            tools: strings(&["lpilMagicRunner", "lualatex"]),
            use_worker_task: Some(true),
            transform: Some(typeset_latex),
            ..Default::default()
        },
    );
}

fn pygmented_name(chunk: &str) -> String {
    format!("{}.pygmented.tex", chunk.strip_suffix(".chunk").unwrap_or(chunk))
}

fn draw_diagram(def: &mut SnipetDef, _env: &mut Env, _ctx: &mut TransformCtx) {
    def.file_dependencies.push("${taskName}.tex".to_string());
    def.targets.push("$latexDir/${taskName}_v1_5.pdf".to_string());
}

fn pygmentize_code_chunk(def: &mut SnipetDef, env: &mut Env, _ctx: &mut TransformCtx) {
    if let Some(out) = env.get("taskName").map(|chunk| pygmented_name(chunk)) {
        env.insert("out".to_string(), out);
    }
    def.file_dependencies.push("$latexDir/$taskName".to_string());
    def.targets.push("$latexDir/$out".to_string());
}

fn typeset_latex(def: &mut SnipetDef, env: &mut Env, ctx: &mut TransformCtx) {
    if env.contains_key(PLATFORM_KEY) {
        for diagram in section_list(def, "dependencies", "diagrams") {
            def.file_dependencies
                .push(format!("$latexDir/{}_v1_5.pdf", diagram));
            ctx.spawn_root(&diagram, task_snipet("drawDiagram"));
        }
        for chunk in section_list(def, "dependencies", "pygments") {
            def.file_dependencies
                .push(format!("$latexDir/{}", pygmented_name(&chunk)));
            ctx.spawn_root(&chunk, task_snipet("pygmentizeCodeChunk"));
        }
    }

    def.file_dependencies.push("$taskName".to_string());
    if let Some(doc) = env.get("taskName") {
        let stem = doc.strip_suffix(".tex").unwrap_or(doc);
        def.targets.push(format!("$latexDir/{}.pdf", stem));
    }
}

fn task_snipet(name: &str) -> SnipetDef {
    SnipetDef {
        task_snipet: Some(name.to_string()),
        ..Default::default()
    }
}
