use std::{
    collections::HashSet,
    env,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use crate::DESKTOP_EXTRA_PATH_ENV;

// Keys are component-normalized so `/a/./b` style duplicates collapse.
// Windows PATH lookups are case-insensitive, hence the ASCII folding there.
fn path_key(path: &Path) -> Option<OsString> {
    if path.as_os_str().is_empty() {
        return None;
    }
    let normalized: PathBuf = path.components().collect();
    #[cfg(target_os = "windows")]
    {
        Some(OsString::from(
            normalized.to_string_lossy().to_ascii_lowercase(),
        ))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Some(normalized.into_os_string())
    }
}

fn add_path_candidate(
    candidate: PathBuf,
    seen_keys: &mut HashSet<OsString>,
    prepend_entries: &mut Vec<PathBuf>,
) {
    if !candidate.is_dir() {
        return;
    }
    if let Some(key) = path_key(&candidate) {
        if seen_keys.insert(key) {
            prepend_entries.push(candidate);
        }
    }
}

/// Interpreter locations a GUI-launched process usually misses from PATH.
fn platform_extra_paths() -> Vec<PathBuf> {
    let mut result = Vec::new();

    if let Some(home_dir) = home::home_dir() {
        result.push(home_dir.join(".local").join("bin"));
        result.push(home_dir.join(".pyenv").join("shims"));
    }

    #[cfg(target_os = "macos")]
    {
        for raw in ["/opt/homebrew/bin", "/usr/local/bin"] {
            result.push(PathBuf::from(raw));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local_app_data) = env::var_os("LOCALAPPDATA") {
            result.push(
                PathBuf::from(local_app_data)
                    .join("Microsoft")
                    .join("WindowsApps"),
            );
        }
    }

    result
}

pub fn build_backend_path_override<F>(mut log: F) -> Option<OsString>
where
    F: FnMut(String),
{
    let existing_path = env::var_os("PATH").unwrap_or_default();
    let existing_entries: Vec<PathBuf> = env::split_paths(&existing_path).collect();
    let mut seen_keys: HashSet<OsString> = existing_entries
        .iter()
        .filter_map(|path| path_key(path))
        .collect();
    let mut prepend_entries: Vec<PathBuf> = Vec::new();

    if let Some(extra_path_raw) = env::var_os(DESKTOP_EXTRA_PATH_ENV) {
        for path in env::split_paths(&extra_path_raw) {
            add_path_candidate(path, &mut seen_keys, &mut prepend_entries);
        }
    }

    for path in platform_extra_paths() {
        add_path_candidate(path, &mut seen_keys, &mut prepend_entries);
    }

    if prepend_entries.is_empty() {
        return None;
    }

    match env::join_paths(prepend_entries.iter().chain(existing_entries.iter())) {
        Ok(path_override) => {
            let preview = prepend_entries
                .iter()
                .map(|entry| entry.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            log(format!(
                "backend PATH augmented with {} prepended directories: {preview}",
                prepend_entries.len()
            ));
            Some(path_override)
        }
        Err(error) => {
            log(format!("failed to build backend PATH override: {error}"));
            None
        }
    }
}

/// Locates `program` the way the OS would when spawning it.
///
/// A program containing a path separator is checked as-is (relative to
/// `cwd`); a bare name is searched in `search_path`.
pub fn resolve_executable(
    program: &str,
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Option<PathBuf> {
    let program_path = Path::new(program);
    if program_path.components().count() > 1 || program_path.is_absolute() {
        let candidate = if program_path.is_absolute() {
            program_path.to_path_buf()
        } else {
            cwd.join(program_path)
        };
        return executable_candidates(&candidate)
            .into_iter()
            .find(|path| is_executable_file(path));
    }

    let search_path = search_path?;
    env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| executable_candidates(&dir.join(program)))
        .find(|path| is_executable_file(path))
}

#[cfg(target_os = "windows")]
fn executable_candidates(base: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![base.to_path_buf()];
    if base.extension().is_none() {
        let pathext = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
        for ext in pathext.split(';').filter(|ext| !ext.is_empty()) {
            let mut with_ext = base.as_os_str().to_os_string();
            with_ext.push(ext);
            candidates.push(PathBuf::from(with_ext));
        }
    }
    candidates
}

#[cfg(not(target_os = "windows"))]
fn executable_candidates(base: &Path) -> Vec<PathBuf> {
    vec![base.to_path_buf()]
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
