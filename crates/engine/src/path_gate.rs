//! Containment policy for client-supplied paths.
//!
//! Every target a client names is resolved against the shared root before
//! any filesystem call: relative targets are joined onto the root, the
//! result is collapsed lexically (no filesystem access), and the collapsed
//! form must still carry the root as a prefix. Callers that go on to touch
//! an existing path additionally canonicalise it and re-check the prefix so
//! a symbolic link cannot smuggle an operation outside the root.
//!
//! Rejections are deliberately indistinguishable from missing files on the
//! client side; nothing about the world outside the root is disclosed.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Error returned when a target resolves outside the shared root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("target {target:?} resolves outside the shared root")]
pub struct PathEscape {
    /// The raw target as the client supplied it.
    pub target: String,
}

/// Resolves `target` against `root` and enforces containment.
///
/// `root` must be absolute and canonical; the configuration layer
/// establishes that once at startup.
pub fn resolve(root: &Path, target: &str) -> Result<PathBuf, PathEscape> {
    let raw = Path::new(target);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        root.join(raw)
    };
    let resolved = normalize(&joined);
    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(PathEscape {
            target: target.to_string(),
        })
    }
}

/// Strips the shared root from `path` for client-visible error text.
#[must_use]
pub fn client_name(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => path.display().to_string(),
    }
}

/// Collapses `.` and `..` components and repeated separators without
/// touching the filesystem. A `..` at the root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => {
                resolved.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => resolved.push(part),
        }
    }
    resolved
}
