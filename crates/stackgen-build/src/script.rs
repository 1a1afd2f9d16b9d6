use std::fmt;

use stackgen_core::ScriptFragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Prebuild,
    Postbuild,
}

impl ScriptPhase {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Prebuild => "prebuild.sh",
            Self::Postbuild => "postbuild.sh",
        }
    }
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prebuild => f.write_str("prebuild"),
            Self::Postbuild => f.write_str("postbuild"),
        }
    }
}

/// Renders queued fragments into one POSIX `sh` script.
///
/// Fragments keep their order. Each one runs in its own subshell, so a
/// `cd` or variable in one service's block never leaks into the next.
pub struct ScriptRenderer<'a> {
    phase: ScriptPhase,
    stack_name: &'a str,
    fragments: &'a [ScriptFragment],
}

impl<'a> ScriptRenderer<'a> {
    pub fn new(phase: ScriptPhase, stack_name: &'a str, fragments: &'a [ScriptFragment]) -> Self {
        Self {
            phase,
            stack_name,
            fragments,
        }
    }

    pub fn render(&self) -> String {
        let blocks = if self.fragments.is_empty() {
            format!("\n: # no {} steps\n", self.phase)
        } else {
            self.fragments.iter().map(render_block).collect::<String>()
        };

        format!(
            r#"#!/bin/sh
# === stackgen {phase}: {stack} ===
# Generated file. Each block runs in its own subshell.
{blocks}"#,
            phase = self.phase,
            stack = self.stack_name,
            blocks = blocks,
        )
    }
}

fn render_block(fragment: &ScriptFragment) -> String {
    let mut block = format!("\n# --- {}: {} ---\n", fragment.service_name, fragment.comment);
    if let Some(multiline) = &fragment.multiline_comment {
        for line in multiline.lines() {
            if line.is_empty() {
                block.push_str("#\n");
            } else {
                block.push_str("# ");
                block.push_str(line);
                block.push('\n');
            }
        }
    }
    block.push_str("(\n");
    let code = fragment.code.trim_matches('\n');
    if !code.is_empty() {
        block.push_str(code);
        block.push('\n');
    }
    block.push_str(")\n");
    block
}

/// Single-quote a word for `sh`.
pub fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// `mkdir -p` every directory a service mounts under `./volumes/<service>/`.
pub fn create_volume_dirs(service_name: &str, dirs: &[String]) -> String {
    if dirs.is_empty() {
        return ": # no volume directories\n".to_owned();
    }
    dirs.iter()
        .map(|dir| {
            format!(
                "mkdir -p {}\n",
                shell_quote(&format!("./volumes/{service_name}/{dir}"))
            )
        })
        .collect()
}

/// Warn about missing volume directories and pause so the message is seen.
pub fn check_volume_dirs(display_name: &str, service_name: &str, dirs: &[String]) -> String {
    if dirs.is_empty() {
        return ": # no volume directories\n".to_owned();
    }
    let mut code = String::from("HAS_ERROR=\"false\"\n");
    for dir in dirs {
        let path = shell_quote(&format!("./volumes/{service_name}/{dir}"));
        let message = shell_quote(&format!("{display_name} {dir} directory is missing!"));
        code.push_str(&format!(
            r#"
if [ ! -d {path} ]; then
  echo {message}
  HAS_ERROR="true"
fi
"#
        ));
    }
    code.push_str(
        r#"
if [ "$HAS_ERROR" = "true" ]; then
  sleep 1
fi
"#,
    );
    code
}
