//! Execution context handed to every tool call
//!
//! Path safety is a security boundary. A path is accepted only if, after
//! lexical `..` resolution and after resolving symlinks of its nearest
//! existing ancestor, it is still inside the working directory.

use std::path::{Component, Path, PathBuf};

use super::error::ToolError;

/// Credentials resolved when the context is built
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Search API key for the web tools
    pub tavily_api_key: Option<String>,
}

/// Per-call context: working directory and credentials
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cwd: PathBuf,
    credentials: Credentials,
}

impl ExecutionContext {
    /// Context confined to `cwd`
    pub fn new(cwd: impl Into<PathBuf>, credentials: Credentials) -> Self {
        Self {
            cwd: normalize(&cwd.into()),
            credentials,
        }
    }

    /// Working directory of the session
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Credentials for this call
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether `path` stays inside the working directory
    pub async fn is_path_safe(&self, path: &str) -> bool {
        self.resolve_path(path).await.is_ok()
    }

    /// Resolve `path` against the working directory, refusing escapes
    ///
    /// Relative paths are joined to the working directory. The returned path
    /// has symlinks of its existing prefix resolved, dangling ones included.
    /// Filesystem lookups run on the blocking pool.
    pub async fn resolve_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        let raw = Path::new(path);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.cwd.join(raw)
        };
        let lexical = normalize(&joined);
        let cwd = self.cwd.clone();
        let confined = tokio::task::spawn_blocking(move || confine(&cwd, lexical))
            .await
            .map_err(|e| ToolError::failed(format!("Path resolution failed: {e}")))?;
        confined.map_err(|rejected| self.deny(path, &rejected))
    }

    fn deny(&self, original: &str, resolved: &Path) -> ToolError {
        log::warn!(
            "Path access denied, outside {}: {original} (resolved: {})",
            self.cwd.display(),
            resolved.display()
        );
        ToolError::AccessDenied {
            cwd: self.cwd.display().to_string(),
        }
    }
}

/// Symlinks followed by hand before a path is refused
const MAX_SYMLINK_HOPS: usize = 40;

/// Check `lexical` against `cwd` on disk
///
/// Blocking. Returns the resolved path, or the offending path on refusal.
fn confine(cwd: &Path, lexical: PathBuf) -> Result<PathBuf, PathBuf> {
    let root = std::fs::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf());
    if !lexical.starts_with(cwd) && !lexical.starts_with(&root) {
        return Err(lexical);
    }
    match resolve_existing_prefix(&lexical, 0) {
        Some(resolved) if resolved.starts_with(&root) => Ok(resolved),
        Some(resolved) => Err(resolved),
        None => Err(lexical),
    }
}

/// Resolve `.` and `..` without touching the filesystem
///
/// `..` at the root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the nearest existing ancestor and re-attach the rest
///
/// A dangling symlink on the way is followed through its target, so a
/// file created through it is checked where it would actually land.
/// `None` when links nest deeper than [`MAX_SYMLINK_HOPS`].
fn resolve_existing_prefix(path: &Path, hops: usize) -> Option<PathBuf> {
    let mut current = path.to_path_buf();
    let mut suffix = Vec::new();
    let base = loop {
        if let Ok(canonical) = std::fs::canonicalize(&current) {
            break canonical;
        }
        if is_symlink(&current) {
            if hops == MAX_SYMLINK_HOPS {
                return None;
            }
            let target = std::fs::read_link(&current).ok()?;
            let parent = std::fs::canonicalize(current.parent()?).ok()?;
            break resolve_existing_prefix(&normalize(&parent.join(target)), hops + 1)?;
        }
        match current.file_name() {
            Some(name) => suffix.push(name.to_os_string()),
            None => return Some(path.to_path_buf()),
        }
        if !current.pop() {
            return Some(path.to_path_buf());
        }
    };
    Some(
        suffix
            .into_iter()
            .rev()
            .fold(base, |acc: PathBuf, part: std::ffi::OsString| acc.join(part)),
    )
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}
