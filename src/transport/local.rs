//! CF-014: Local execution through a generated `/bin/sh` script.
//!
//! The script exports the task environment, then runs each action line. It
//! lives in a uniquely named temp file that is removed when the run ends,
//! whatever the outcome.

use super::ExecOutput;
use crate::core::types::Env;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Build the script text: shebang, `export` lines, action lines.
pub fn compile_action_script(env: &Env, actions: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    for (key, value) in env {
        if !is_shell_name(key) {
            debug!(key = %key, "not a shell variable name; not exported");
            continue;
        }
        script.push_str(&format!("export {}=\"{}\"\n", key, quote_value(value)));
    }
    for line in actions {
        script.push_str(line);
        script.push('\n');
    }
    script
}

fn is_shell_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Escape for the inside of a double-quoted shell word.
fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Run a script from a temp file in the system temp directory.
pub fn exec_script(script: &str) -> Result<ExecOutput, String> {
    exec_script_in(&std::env::temp_dir(), script)
}

/// Run a script from a temp file created in `dir`.
pub fn exec_script_in(dir: &Path, script: &str) -> Result<ExecOutput, String> {
    let mut file = tempfile::Builder::new()
        .prefix("cfbuild-local-")
        .suffix(".sh")
        .tempfile_in(dir)
        .map_err(|e| format!("cannot create script in {}: {}", dir.display(), e))?;
    file.write_all(script.as_bytes())
        .map_err(|e| format!("script write error: {}", e))?;
    // Close the handle; the path is still removed on drop.
    let path = file.into_temp_path();
    make_executable(&path)?;

    debug!(script = %path.display(), "running local script");
    let output = Command::new("sh")
        .arg(&path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to spawn sh: {}", e))?;

    path.close()
        .map_err(|e| format!("cannot remove script: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| format!("cannot chmod {}: {}", path.display(), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), String> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Env {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cf014_script_layout() {
        let script = compile_action_script(
            &env(&[("cc", "gcc"), ("out", "build/a.o")]),
            &["mkdir -p build".to_string(), "$cc -c -o $out a.c".to_string()],
        );
        assert_eq!(
            script,
            "#!/bin/sh\nexport cc=\"gcc\"\nexport out=\"build/a.o\"\nmkdir -p build\n$cc -c -o $out a.c\n"
        );
    }

    #[test]
    fn test_cf014_script_quoting() {
        let script = compile_action_script(&env(&[("msg", r#"say "hi" $HOME `x` \n"#)]), &[]);
        assert!(script.contains(r#"export msg="say \"hi\" \$HOME \`x\` \\n""#));
    }

    #[test]
    fn test_cf014_skips_non_shell_names() {
        let script = compile_action_script(&env(&[("file-hash", "x"), ("_ok1", "y"), ("1bad", "z")]), &[]);
        assert!(!script.contains("file-hash"));
        assert!(!script.contains("1bad"));
        assert!(script.contains("export _ok1=\"y\""));
    }

    #[test]
    fn test_cf014_exec_exports_env() {
        let script = compile_action_script(
            &env(&[("GREETING", "hello $USER")]),
            &["echo \"$GREETING\"".to_string()],
        );
        let out = exec_script(&script).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello $USER");
    }

    #[test]
    fn test_cf014_exit_code_surfaced() {
        let out = exec_script("#!/bin/sh\necho oops >&2\nexit 42\n").unwrap();
        assert_eq!(out.exit_code, 42);
        assert!(out.stderr.contains("oops"));
    }

    #[test]
    fn test_cf014_temp_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let ok = exec_script_in(dir.path(), "#!/bin/sh\ntrue\n").unwrap();
        assert!(ok.success());
        let failed = exec_script_in(dir.path(), "#!/bin/sh\nfalse\n").unwrap();
        assert!(!failed.success());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_cf014_script_is_executable() {
        let dir = tempfile::tempdir().unwrap();
        let out = exec_script_in(
            dir.path(),
            "#!/bin/sh\nstat -c %a \"$0\" 2>/dev/null || stat -f %Lp \"$0\"\n",
        )
        .unwrap();
        assert_eq!(out.stdout.trim(), "755");
    }
}
