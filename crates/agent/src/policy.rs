//! Write confinement for script files.
//!
//! Pure and synchronous: decisions depend only on the tool name and its
//! arguments, and the filesystem is never consulted.

use std::path::{Component, Path, PathBuf};

use proto::PolicyDecision;
use serde_json::Value;

/// Tools that create or modify files.
const MUTATING_TOOLS: &[&str] = &["file.write", "file.edit"];
const PATH_ARG: &str = "file_path";
/// Extensions treated as executable script content.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "ts"];

/// Allows script writes only inside the scripts directory.
#[derive(Debug, Clone)]
pub struct PolicyGate {
    root: PathBuf,
    scripts_dir: PathBuf,
}

impl PolicyGate {
    /// `root` resolves relative tool paths; `scripts_dir` is the only
    /// allowed destination for script files. Both are taken as given, so
    /// pass absolute paths when the working root is not the process cwd.
    pub fn new(root: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
            scripts_dir: normalize(&scripts_dir.into()),
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Decides whether `tool_name` may run with `args`.
    pub fn check(&self, tool_name: &str, args: &Value) -> PolicyDecision {
        if !MUTATING_TOOLS.contains(&tool_name) {
            return PolicyDecision::Allow;
        }
        let raw = args.get(PATH_ARG).and_then(Value::as_str).unwrap_or("");
        let path = Path::new(raw);
        if !is_script(path) {
            return PolicyDecision::Allow;
        }
        if !raw.is_empty() && resolve(&self.root, path).starts_with(&self.scripts_dir) {
            return PolicyDecision::Allow;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        PolicyDecision::block(format!(
            "Script files (.js and .ts) must be written to the scripts directory. \
             Please use the path: {}/{file_name}",
            self.scripts_dir.display()
        ))
    }
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SCRIPT_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    }
}

/// Folds `.` and `..` lexically without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn gate() -> PolicyGate {
        PolicyGate::new("/work/agent", "/work/agent/custom_scripts")
    }

    fn reason(decision: PolicyDecision) -> String {
        match decision {
            PolicyDecision::Block { reason } => reason,
            PolicyDecision::Allow => panic!("expected block"),
        }
    }

    #[test]
    fn non_mutating_tools_are_always_allowed() {
        let g = gate();
        assert!(g.check("file.read", &json!({"file_path": "/etc/x.js"})).is_allowed());
        assert!(g.check("browser.navigate", &json!({"url": "https://a.b"})).is_allowed());
    }

    #[test]
    fn non_script_writes_are_allowed_anywhere() {
        let g = gate();
        for path in ["/tmp/notes.md", "data/out.json", "../outside.txt", "script.jsx", "Makefile"] {
            assert!(
                g.check("file.write", &json!({"file_path": path})).is_allowed(),
                "{path} should be allowed"
            );
        }
    }

    #[test]
    fn scripts_inside_scripts_dir_are_allowed() {
        let g = gate();
        assert!(g.check("file.write", &json!({"file_path": "/work/agent/custom_scripts/a.js"})).is_allowed());
        assert!(g.check("file.edit", &json!({"file_path": "custom_scripts/nested/b.TS"})).is_allowed());
        assert!(g.check("file.write", &json!({"file_path": "./custom_scripts/./c.ts"})).is_allowed());
    }

    #[test]
    fn scripts_outside_are_blocked_with_required_prefix() {
        let g = gate();
        let decision = g.check("file.write", &json!({"file_path": "/work/agent/scrape.js"}));
        let reason = reason(decision);
        assert!(reason.contains("/work/agent/custom_scripts/scrape.js"));
        assert!(reason.contains("scripts directory"));
    }

    #[test]
    fn parent_dir_escapes_are_blocked() {
        let g = gate();
        let decision = g.check(
            "file.edit",
            &json!({"file_path": "custom_scripts/../../evil.js"}),
        );
        assert!(!decision.is_allowed());
    }

    #[test]
    fn sibling_prefix_directory_is_not_inside() {
        let g = gate();
        let decision = g.check(
            "file.write",
            &json!({"file_path": "/work/agent/custom_scripts_old/x.js"}),
        );
        assert!(!decision.is_allowed());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let g = gate();
        assert!(!g.check("file.write", &json!({"file_path": "/tmp/A.JS"})).is_allowed());
    }

    #[test]
    fn missing_path_is_allowed() {
        let g = gate();
        assert!(g.check("file.write", &json!({"content": "x"})).is_allowed());
        assert!(g.check("file.write", &json!({"file_path": ""})).is_allowed());
    }

    #[test]
    fn script_under_dotted_directory_is_blocked() {
        let g = gate();
        assert!(!g.check("file.write", &json!({"file_path": "/.js/x.ts"})).is_allowed());
    }

    #[test]
    fn relative_root_is_normalized() {
        let g = PolicyGate::new("agent", "agent/custom_scripts");
        assert_eq!(g.scripts_dir(), Path::new("agent/custom_scripts"));
        assert!(g.check("file.write", &json!({"file_path": "custom_scripts/x.js"})).is_allowed());
        assert!(!g.check("file.write", &json!({"file_path": "x.js"})).is_allowed());
    }
}
