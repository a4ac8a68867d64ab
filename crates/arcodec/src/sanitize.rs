//! Zip-slip safe mapping of archive entry names onto an extraction root.
//!
//! Works purely lexically: nothing here touches the filesystem, so the root
//! need not exist yet.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// An entry name mapped onto the extraction root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Name as stored in the archive.
    pub entry: String,
    /// Normalized path relative to the root, after stripping.
    pub relative: PathBuf,
    /// Absolute destination; always `root` or a descendant of it.
    pub resolved: PathBuf,
}

/// Map `entry` onto `root`, rejecting anything that lands outside it.
///
/// Traversal (`../x`), absolute names (`/etc/passwd`, `C:\x`) and names
/// that climb out after descending (`a/../../b`) all fail with
/// [`Error::PathEscape`]. A NUL byte fails with [`Error::InvalidPath`].
pub fn resolve_entry_path(root: impl AsRef<Path>, entry: &str) -> Result<ResolvedPath> {
    resolve_entry_path_with(root, entry, 0)
}

/// Like [`resolve_entry_path`], dropping `strip_components` leading
/// components first (`tar --strip-components`).
pub fn resolve_entry_path_with(
    root: impl AsRef<Path>,
    entry: &str,
    strip_components: usize,
) -> Result<ResolvedPath> {
    let root = normalize_root(root.as_ref())?;
    let entry_path = entry_to_path(entry)?;

    if is_rooted(&entry_path) {
        return Err(Error::PathEscape {
            entry: entry.to_owned(),
            resolved: normalize_path(&entry_path),
        });
    }

    let relative = if strip_components > 0 {
        strip_components_of(&entry_path, strip_components)?
    } else {
        entry_path
    };

    let resolved = normalize_path(&root.join(&relative));
    if !resolved.starts_with(&root) {
        return Err(Error::PathEscape {
            entry: entry.to_owned(),
            resolved,
        });
    }

    let relative = resolved
        .strip_prefix(&root)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok(ResolvedPath {
        entry: entry.to_owned(),
        relative,
        resolved,
    })
}

/// Check that a symlink stored at `link` (already resolved under `root`)
/// pointing at `target` stays inside `root`.
///
/// Returns the absolute path the link would point to.
pub fn resolve_symlink_target(
    root: impl AsRef<Path>,
    link: impl AsRef<Path>,
    target: &str,
) -> Result<PathBuf> {
    let root = normalize_root(root.as_ref())?;
    let target_path = entry_to_path(target)?;

    if is_rooted(&target_path) {
        return Err(Error::SymlinkEscape {
            target: target_path.clone(),
            resolved: normalize_path(&target_path),
        });
    }

    let base = link.as_ref().parent().unwrap_or(&root);
    let resolved = normalize_path(&base.join(&target_path));
    if !resolved.starts_with(&root) {
        return Err(Error::SymlinkEscape {
            target: target_path,
            resolved,
        });
    }
    Ok(resolved)
}

/// Drop the first `count` components.
pub fn strip_components(path: impl AsRef<Path>, count: usize) -> Result<PathBuf> {
    strip_components_of(path.as_ref(), count)
}

fn strip_components_of(path: &Path, count: usize) -> Result<PathBuf> {
    let components: Vec<_> = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    if components.len() <= count {
        return Err(Error::NoComponentsRemaining {
            original: path.to_path_buf(),
            count,
        });
    }
    Ok(components[count..].iter().collect())
}

/// Resolve `.` and `..` lexically. `..` at the top of a rooted path is
/// dropped, as the OS would.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(component.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }
    result
}

fn normalize_root(root: &Path) -> Result<PathBuf> {
    Ok(normalize_path(std::path::absolute(root)?))
}

/// Archives written on Windows use `\`; treat it as a separator everywhere.
fn entry_to_path(entry: &str) -> Result<PathBuf> {
    if entry.contains('\0') {
        return Err(Error::InvalidPath);
    }
    Ok(PathBuf::from(entry.replace('\\', "/")))
}

fn is_rooted(path: &Path) -> bool {
    path.has_root()
        || path
            .components()
            .any(|component| matches!(component, Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn test_root() -> &'static Path {
        if cfg!(windows) {
            Path::new("C:/opt/myapp")
        } else {
            Path::new("/opt/myapp")
        }
    }

    #[test]
    fn plain_entry_stays_below_root() {
        let resolved = resolve_entry_path(test_root(), "a/b/c").unwrap();
        assert_eq!(resolved.resolved, test_root().join("a").join("b").join("c"));
        assert_eq!(resolved.relative, Path::new("a/b/c"));
        assert_ne!(resolved.resolved, test_root());
    }

    #[test]
    fn traversal_is_rejected() {
        for entry in ["../x", "a/../../b", "a/b/../../../c", "..\\evil.txt"] {
            let err = resolve_entry_path(test_root(), entry).unwrap_err();
            assert!(matches!(err, Error::PathEscape { .. }), "{entry}: {err}");
        }
    }

    #[test]
    fn absolute_entry_is_rejected() {
        let malicious = if cfg!(windows) { "C:\\etc\\passwd" } else { "/etc/passwd" };
        let err = resolve_entry_path(test_root(), malicious).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathEscape);
        assert!(resolve_entry_path(test_root(), "/opt/myapp/inside").is_err());
    }

    #[test]
    fn sibling_with_common_prefix_escapes() {
        // "/opt/myapp-evil" shares a string prefix, not a path prefix
        let err = resolve_entry_path(test_root(), "../myapp-evil/x").unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }));
    }

    #[test]
    fn inner_dot_dot_is_normalized() {
        let resolved = resolve_entry_path(test_root(), "a/./b/../c").unwrap();
        assert_eq!(resolved.relative, Path::new("a/c"));
    }

    #[test]
    fn root_itself_is_allowed() {
        let resolved = resolve_entry_path(test_root(), "a/..").unwrap();
        assert_eq!(resolved.resolved, test_root());
        assert_eq!(resolved.relative, PathBuf::new());
    }

    #[test]
    fn nul_byte_is_invalid() {
        let err = resolve_entry_path(test_root(), "a\0b").unwrap_err();
        assert!(matches!(err, Error::InvalidPath));
    }

    #[test]
    fn strip_then_resolve() {
        let resolved = resolve_entry_path_with(test_root(), "tool-1.0/bin/tool", 1).unwrap();
        assert_eq!(resolved.relative, Path::new("bin/tool"));
        let err = resolve_entry_path_with(test_root(), "tool-1.0/", 1).unwrap_err();
        assert!(matches!(err, Error::NoComponentsRemaining { count: 1, .. }));
    }

    #[test]
    fn strip_does_not_hide_traversal() {
        let err = resolve_entry_path_with(test_root(), "pkg/../../etc", 1).unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }));
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let resolved = resolve_entry_path("out", "file.txt").unwrap();
        assert!(resolved.resolved.is_absolute());
        assert!(resolved.resolved.ends_with("out/file.txt"));
    }

    #[test]
    fn symlink_inside_root() {
        let link = test_root().join("bin/mylink");
        let resolved = resolve_symlink_target(test_root(), &link, "../lib/libfoo.so").unwrap();
        assert_eq!(resolved, test_root().join("lib").join("libfoo.so"));
    }

    #[test]
    fn symlink_escapes() {
        let link = test_root().join("bin/mylink");
        let err = resolve_symlink_target(test_root(), &link, "../../../etc/passwd").unwrap_err();
        assert!(matches!(err, Error::SymlinkEscape { .. }));
        let absolute = if cfg!(windows) { "C:\\etc\\passwd" } else { "/etc/passwd" };
        let err = resolve_symlink_target(test_root(), &link, absolute).unwrap_err();
        assert!(matches!(err, Error::SymlinkEscape { .. }));
    }

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path("foo//bar/./baz/../qux"), Path::new("foo/bar/qux"));
        assert_eq!(normalize_path("../a"), Path::new("../a"));
        assert_eq!(normalize_path("../../a"), Path::new("../../a"));
        assert_eq!(normalize_path("/../a"), Path::new("/a"));
    }

    #[test]
    fn component_stripping() {
        assert_eq!(strip_components("a/b/c/d", 2).unwrap(), Path::new("c/d"));
        assert_eq!(strip_components("./a/b", 1).unwrap(), Path::new("b"));
        assert!(strip_components("a/b", 2).is_err());
    }
}
