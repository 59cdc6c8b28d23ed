//! Confinement of client-supplied video paths to the configured video root

use crate::error::MonitorError;
use std::path::{Path, PathBuf};

const MAX_PATH_LENGTH: usize = 4096;

/// Resolve `requested` to a regular file inside `root`.
///
/// Relative paths are taken from `root`; absolute ones must already point
/// inside it. `..` components and symlinks are resolved before the check, so
/// neither can be used to leave the root. URLs are never accepted.
pub fn resolve_video_path(root: &Path, requested: &str) -> Result<PathBuf, MonitorError> {
    let requested = requested.trim();
    if requested.is_empty() {
        return Err(MonitorError::InvalidRequest(
            "path must not be empty".to_string(),
        ));
    }
    if requested.len() > MAX_PATH_LENGTH {
        return Err(MonitorError::InvalidRequest(format!(
            "path exceeds {} bytes",
            MAX_PATH_LENGTH
        )));
    }
    if requested.contains("://") {
        return Err(MonitorError::Forbidden(
            "only files under the video root can be analysed".to_string(),
        ));
    }

    let canonical_root = root.canonicalize().map_err(|e| {
        MonitorError::Internal(anyhow::anyhow!(
            "video root {:?} is inaccessible: {}",
            root,
            e
        ))
    })?;

    let canonical = root.join(requested).canonicalize().map_err(|_| {
        MonitorError::InvalidRequest(format!("video '{}' does not exist", requested))
    })?;

    if !canonical.starts_with(&canonical_root) {
        tracing::warn!(requested, "rejected video path outside the video root");
        return Err(MonitorError::Forbidden(format!(
            "video '{}' is outside the video root",
            requested
        )));
    }
    if !canonical.is_file() {
        return Err(MonitorError::InvalidRequest(format!(
            "video '{}' is not a file",
            requested
        )));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn video_root() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("videos");
        fs::create_dir_all(root.join("gates")).unwrap();
        fs::write(root.join("gates/north.mp4"), b"not really a video").unwrap();
        fs::write(dir.path().join("secret.txt"), b"keep out").unwrap();
        (dir, root)
    }

    #[test]
    fn test_relative_path_resolves_inside_root() {
        let (_dir, root) = video_root();
        let resolved = resolve_video_path(&root, "gates/north.mp4").unwrap();
        assert_eq!(
            resolved,
            root.canonicalize().unwrap().join("gates/north.mp4")
        );
    }

    #[test]
    fn test_absolute_path_inside_root_allowed() {
        let (_dir, root) = video_root();
        let absolute = root.join("gates/north.mp4");
        assert!(resolve_video_path(&root, absolute.to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_traversal_outside_root_forbidden() {
        let (dir, root) = video_root();
        let result = resolve_video_path(&root, "../secret.txt");
        assert!(matches!(result, Err(MonitorError::Forbidden(_))));

        let absolute = dir.path().join("secret.txt");
        let result = resolve_video_path(&root, absolute.to_str().unwrap());
        assert!(matches!(result, Err(MonitorError::Forbidden(_))));

        assert!(matches!(
            resolve_video_path(&root, "/etc/passwd"),
            Err(MonitorError::Forbidden(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_forbidden() {
        let (dir, root) = video_root();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.mp4")).unwrap();

        let result = resolve_video_path(&root, "link.mp4");
        assert!(matches!(result, Err(MonitorError::Forbidden(_))));
    }

    #[test]
    fn test_urls_forbidden() {
        let (_dir, root) = video_root();
        for url in [
            "http://169.254.169.254/latest/meta-data",
            "rtsp://camera.local/stream",
            "file:///etc/passwd",
        ] {
            assert!(
                matches!(resolve_video_path(&root, url), Err(MonitorError::Forbidden(_))),
                "{} was accepted",
                url
            );
        }
    }

    #[test]
    fn test_missing_or_invalid_paths_rejected() {
        let (_dir, root) = video_root();
        assert!(matches!(
            resolve_video_path(&root, "   "),
            Err(MonitorError::InvalidRequest(_))
        ));
        assert!(matches!(
            resolve_video_path(&root, "gates/south.mp4"),
            Err(MonitorError::InvalidRequest(_))
        ));
        assert!(matches!(
            resolve_video_path(&root, "gates"),
            Err(MonitorError::InvalidRequest(_))
        ));
    }
}
