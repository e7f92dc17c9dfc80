//! Search-path construction and program resolution for spawned processes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Builds the PATH value handed to spawned processes.
///
/// # Priority Order
/// 1. Workspace-specific tool directories (node_modules/.bin, .venv/bin, bin)
/// 2. Configured extra paths
/// 3. The inherited PATH
/// 4. Common binary locations and `~/.local/bin`, when not already present
///
/// Desktop launchers often start with a minimal PATH, which is why the common
/// locations are appended. Duplicates are dropped, first occurrence wins.
///
/// # Arguments
/// * `working_dir` - Session working directory
/// * `extra_paths` - User-configured directories
/// * `inherited` - The PATH of the current process, if any
pub fn build_search_path(
    working_dir: &Path,
    extra_paths: &[PathBuf],
    inherited: Option<&str>,
) -> OsString {
    let mut components: Vec<PathBuf> = Vec::new();
    let mut push = |dir: PathBuf| {
        if !dir.as_os_str().is_empty() && !components.contains(&dir) {
            components.push(dir);
        }
    };

    for dir in ["node_modules/.bin", ".venv/bin", "bin"] {
        let candidate = working_dir.join(dir);
        if candidate.is_dir() {
            push(candidate);
        }
    }

    for dir in extra_paths {
        push(dir.clone());
    }

    if let Some(inherited) = inherited {
        for dir in std::env::split_paths(inherited) {
            push(dir);
        }
    }

    #[cfg(unix)]
    for dir in [
        "/usr/local/bin",
        "/opt/homebrew/bin",
        "/usr/bin",
        "/bin",
    ] {
        push(PathBuf::from(dir));
    }

    if let Some(home) = dirs::home_dir() {
        push(home.join(".local/bin"));
    }

    std::env::join_paths(components).unwrap_or_default()
}

/// Finds `program` on `search_path`.
///
/// Programs given with a directory component are checked as-is.
pub fn resolve_program(program: &str, search_path: &OsString) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    std::env::split_paths(search_path).find_map(|dir| {
        executable_names(program)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| is_executable(path))
    })
}

fn executable_names(program: &str) -> Vec<String> {
    #[cfg(windows)]
    {
        vec![
            program.to_string(),
            format!("{program}.exe"),
            format!("{program}.cmd"),
        ]
    }
    #[cfg(not(windows))]
    {
        vec![program.to_string()]
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_path_keeps_inherited_entries_and_order() {
        let path = build_search_path(
            Path::new("/nonexistent/workspace"),
            &[PathBuf::from("/custom/tool/bin")],
            Some("/custom/bin:/another/path"),
        );
        let parts: Vec<_> = std::env::split_paths(&path).collect();
        assert_eq!(parts[0], PathBuf::from("/custom/tool/bin"));
        assert!(parts.contains(&PathBuf::from("/custom/bin")));
        assert!(parts.contains(&PathBuf::from("/another/path")));
    }

    #[test]
    fn test_search_path_has_no_duplicates() {
        let path = build_search_path(
            Path::new("/nonexistent"),
            &[PathBuf::from("/usr/bin")],
            Some("/usr/bin:/usr/bin"),
        );
        let parts: Vec<_> = std::env::split_paths(&path).collect();
        let usr_bin = parts
            .iter()
            .filter(|p| *p == &PathBuf::from("/usr/bin"))
            .count();
        assert_eq!(usr_bin, 1);
    }

    #[test]
    fn test_workspace_tool_dirs_come_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/.bin")).unwrap();
        let path = build_search_path(dir.path(), &[], Some("/usr/bin"));
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, dir.path().join("node_modules/.bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-assistant");
        std::fs::write(&tool, "#!/bin/sh\necho hi\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let plain = dir.path().join("not-executable");
        std::fs::write(&plain, "data").unwrap();

        let search = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(resolve_program("fake-assistant", &search), Some(tool.clone()));
        assert_eq!(resolve_program("not-executable", &search), None);
        assert_eq!(resolve_program("missing", &search), None);
        assert_eq!(
            resolve_program(tool.to_str().unwrap(), &OsString::new()),
            Some(tool)
        );
    }
}
