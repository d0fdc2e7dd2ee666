//! Configuration utility functions.

use std::path::{Component, Path, PathBuf};

/// Find the config file by searching upward from `start`.
///
/// ```text
/// /home/user/site/src/styles/  ← start
/// /home/user/site/kiln.toml    ← found
/// ```
pub fn find_config_file(config_name: &Path, start: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.exists() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

/// Lexically normalize `path` (no filesystem access): drop `.`, fold `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("src/styles");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("kiln.toml"), "").unwrap();

        let found = find_config_file(Path::new("kiln.toml"), &nested).unwrap();
        assert_eq!(found, dir.path().join("kiln.toml"));
        assert!(find_config_file(Path::new("missing.toml"), &nested).is_none());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/site/./src/../dist")),
            PathBuf::from("/site/dist")
        );
        assert_eq!(normalize_path(Path::new("a/./b")), PathBuf::from("a/b"));
    }
}
