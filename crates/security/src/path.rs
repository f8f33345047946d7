//! Path validation for the file tools.
//!
//! File tools operate inside a single workspace directory. A requested
//! path is resolved against that directory and refused if it escapes it,
//! climbs with `..`, or lands under a forbidden prefix.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Empty path")]
    Empty,

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `requested` inside `workspace`.
///
/// Relative paths are joined onto the workspace; absolute paths must
/// already point inside it. Symlinks are resolved for the existing part of
/// the path so a link cannot lead out of the workspace. The file itself
/// need not exist (writes create it).
pub fn resolve_in_workspace(
    workspace: &Path,
    requested: &str,
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(PathValidationError::Empty);
    }

    let raw = Path::new(trimmed);
    if raw.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathValidationError::PathTraversal {
            path: requested.into(),
        });
    }

    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        workspace.join(raw)
    };

    let root = canonicalize_existing(workspace, requested)?;
    let resolved = canonicalize_existing(&joined, requested)?;

    for pattern in forbidden_paths {
        let prefix = PathBuf::from(expand_tilde(pattern));
        if resolved.starts_with(&prefix) && !root.starts_with(&prefix) {
            return Err(PathValidationError::ForbiddenPath {
                path: requested.into(),
                pattern: pattern.clone(),
            });
        }
    }

    if !resolved.starts_with(&root) {
        return Err(PathValidationError::OutsideWorkspace {
            path: requested.into(),
        });
    }

    Ok(resolved)
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// remaining components.
fn canonicalize_existing(path: &Path, requested: &str) -> Result<PathBuf, PathValidationError> {
    let mut existing = path;
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            // Nothing on disk at all; compare lexically.
            _ => return Ok(path.to_path_buf()),
        }
    }

    let mut resolved =
        existing
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: requested.into(),
                reason: e.to_string(),
            })?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_lands_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_in_workspace(dir.path(), "notes/todo.md", &[]).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(resolved, root.join("notes").join("todo.md"));
    }

    #[test]
    fn traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_in_workspace(dir.path(), "../../etc/passwd", &[]).unwrap_err();
        assert!(matches!(err, PathValidationError::PathTraversal { .. }));
        let err = resolve_in_workspace(dir.path(), "a/../../b", &[]).unwrap_err();
        assert!(matches!(err, PathValidationError::PathTraversal { .. }));
    }

    #[test]
    fn absolute_path_outside_workspace_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let outside = other.path().join("x.txt");
        let err =
            resolve_in_workspace(dir.path(), &outside.to_string_lossy(), &[]).unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideWorkspace { .. }));
    }

    #[test]
    fn absolute_path_inside_workspace_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("a.txt");
        assert!(resolve_in_workspace(dir.path(), &inside.to_string_lossy(), &[]).is_ok());
    }

    #[test]
    fn forbidden_prefix_inside_workspace_blocked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("secrets")).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let forbidden = vec![root.join("secrets").to_string_lossy().into_owned()];
        let err = resolve_in_workspace(dir.path(), "secrets/key.pem", &forbidden).unwrap_err();
        match err {
            PathValidationError::ForbiddenPath { pattern, .. } => assert_eq!(pattern, forbidden[0]),
            other => panic!("Expected ForbiddenPath, got: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(other.path(), dir.path().join("link")).unwrap();
        let err = resolve_in_workspace(dir.path(), "link/file.txt", &[]).unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideWorkspace { .. }));
    }

    #[test]
    fn empty_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_in_workspace(dir.path(), "   ", &[]).unwrap_err(),
            PathValidationError::Empty
        );
    }
}
