//! Path-safety helpers shared by every file read/write in this backend.
//! Every relative path is checked component-by-component before it reaches
//! `cap_std`, which independently refuses to resolve outside its rooted
//! directory — belt and suspenders, since the testable property ("any `rel`
//! starting with `/` or containing `..` segments ... rejects with
//! `path_traversal`") is phrased at the path-computation layer, not just at
//! the syscall layer.

use std::path::{Component, Path};
use wfo_core::errors::CoreError;

pub fn ensure_relative_and_contained(rel: &str) -> Result<(), CoreError> {
    if rel.starts_with('/') {
        return Err(CoreError::PathTraversal(format!("absolute path not allowed: {rel}")));
    }
    let path = Path::new(rel);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            other => {
                return Err(CoreError::PathTraversal(format!(
                    "path component {other:?} escapes the configured root in {rel:?}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_paths() {
        assert!(matches!(ensure_relative_and_contained("/etc/passwd"), Err(CoreError::PathTraversal(_))));
    }

    #[test]
    fn rejects_parent_segments() {
        assert!(matches!(ensure_relative_and_contained("../secrets.json"), Err(CoreError::PathTraversal(_))));
        assert!(matches!(ensure_relative_and_contained("runs/../../etc/passwd"), Err(CoreError::PathTraversal(_))));
    }

    #[test]
    fn accepts_plain_relative_paths() {
        assert!(ensure_relative_and_contained("runs/abc/run.json").is_ok());
    }
}
