use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolves `.` and `..` segments textually, without touching symlinks, so a
/// symlinked home directory keeps one stable identity across comparisons.
pub(crate) fn lexical_canonicalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
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

/// First executable named `name` on the search path whose canonical form
/// differs from `skip` — i.e. the system binary a wrapper would shadow.
#[allow(dead_code)]
pub(crate) fn find_on_path(name: &str, skip: &Path) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    let skip = lexical_canonicalize(skip);
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if !is_executable_file(&candidate) {
            continue;
        }
        if lexical_canonicalize(&candidate) != skip {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
#[allow(dead_code)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
#[allow(dead_code)]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
