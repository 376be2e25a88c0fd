// Saved screenshots directory: listing by recency, saving captured images, reading for tool replies

use anyhow::{Context, Result};
use base64::Engine;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A saved `*.png` file in the screenshot directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub path: PathBuf,
    pub filename: String,
    pub modified: SystemTime,
}

impl Screenshot {
    /// Path rendered the way it is stored in the task log
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All PNG screenshots, most recently modified first
    ///
    /// A missing directory is an empty listing.
    pub fn list(&self) -> Vec<Screenshot> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to read {}: {}", self.dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut screenshots: Vec<Screenshot> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("png") {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                Some(Screenshot {
                    filename: entry.file_name().to_string_lossy().to_string(),
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    path,
                })
            })
            .collect();

        screenshots.sort_by(|a, b| b.modified.cmp(&a.modified));
        screenshots
    }

    /// The most recently modified screenshot
    pub fn last(&self) -> Option<Screenshot> {
        self.list().into_iter().next()
    }

    /// Move a captured temp image into the directory as `screenshot_<timestamp>.png`
    pub fn save(&self, temp_image: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;

        let stem = format!("screenshot_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let target = self.unused_path(&stem);

        move_file(temp_image, &target)?;
        Ok(target)
    }

    /// First free `<stem>.png`, then `<stem>_1.png`, `<stem>_2.png`, ...
    fn unused_path(&self, stem: &str) -> PathBuf {
        let first = self.dir.join(format!("{stem}.png"));
        if !first.exists() {
            return first;
        }

        (1..)
            .map(|n| self.dir.join(format!("{stem}_{n}.png")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }
}

/// Rename, falling back to copy + delete when the rename crosses filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    if let Err(e) = fs::remove_file(from) {
        log::warn!("Failed to remove {} after copy: {}", from.display(), e);
    }
    Ok(())
}

/// Base64 (standard alphabet) of a file's bytes
pub fn read_base64(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Best-effort removal of a discarded temp image
pub fn cleanup_temp(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed temp image {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove temp image {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn write_with_mtime(dir: &Path, name: &str, unix_secs: i64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
        path
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScreenshotStore::new(temp_dir.path().join("absent"));

        assert!(store.list().is_empty());
        assert!(store.last().is_none());
    }

    #[test]
    fn test_list_sorted_by_mtime_descending() {
        let temp_dir = TempDir::new().unwrap();
        write_with_mtime(temp_dir.path(), "old.png", 1_000);
        write_with_mtime(temp_dir.path(), "newest.png", 3_000);
        write_with_mtime(temp_dir.path(), "middle.png", 2_000);
        let store = ScreenshotStore::new(temp_dir.path());

        let names: Vec<_> = store.list().into_iter().map(|s| s.filename).collect();

        assert_eq!(names, vec!["newest.png", "middle.png", "old.png"]);
        assert_eq!(store.last().unwrap().filename, "newest.png");
    }

    #[test]
    fn test_list_ignores_non_png() {
        let temp_dir = TempDir::new().unwrap();
        write_with_mtime(temp_dir.path(), "shot.png", 1_000);
        write_with_mtime(temp_dir.path(), "notes.txt", 5_000);
        write_with_mtime(temp_dir.path(), "photo.jpg", 5_000);
        fs::create_dir(temp_dir.path().join("folder.png")).unwrap();
        let store = ScreenshotStore::new(temp_dir.path());

        let names: Vec<_> = store.list().into_iter().map(|s| s.filename).collect();
        assert_eq!(names, vec!["shot.png"]);
    }

    #[test]
    fn test_save_moves_temp_image() {
        let temp_dir = TempDir::new().unwrap();
        let incoming = temp_dir.path().join("clipboard_1.png");
        fs::write(&incoming, b"png bytes").unwrap();
        let store = ScreenshotStore::new(temp_dir.path().join("shots"));

        let saved = store.save(&incoming).unwrap();

        assert!(!incoming.exists());
        assert_eq!(fs::read(&saved).unwrap(), b"png bytes");
        let name = saved.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("screenshot_"));
        assert!(name.ends_with(".png"));
        assert_eq!(saved.parent().unwrap(), store.dir());
    }

    #[test]
    fn test_save_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScreenshotStore::new(temp_dir.path().join("shots"));

        let mut saved = Vec::new();
        for i in 0..3 {
            let incoming = temp_dir.path().join(format!("in_{i}.png"));
            fs::write(&incoming, format!("image {i}")).unwrap();
            saved.push(store.save(&incoming).unwrap());
        }

        // Same-second saves get distinct names and keep their own bytes
        saved.sort();
        saved.dedup();
        assert_eq!(saved.len(), 3);
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn test_unused_path_suffixes() {
        let temp_dir = TempDir::new().unwrap();
        let store = ScreenshotStore::new(temp_dir.path());
        fs::write(temp_dir.path().join("screenshot_x.png"), b"").unwrap();
        fs::write(temp_dir.path().join("screenshot_x_1.png"), b"").unwrap();

        assert_eq!(
            store.unused_path("screenshot_x"),
            temp_dir.path().join("screenshot_x_2.png")
        );
        assert_eq!(
            store.unused_path("screenshot_y"),
            temp_dir.path().join("screenshot_y.png")
        );
    }

    #[test]
    fn test_read_base64() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.png");
        fs::write(&path, b"hello").unwrap();

        assert_eq!(read_base64(&path).unwrap(), "aGVsbG8=");
        assert!(read_base64(&temp_dir.path().join("missing.png")).is_err());
    }

    #[test]
    fn test_cleanup_temp_tolerates_absence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("temp.png");
        fs::write(&path, b"x").unwrap();

        cleanup_temp(&path);
        assert!(!path.exists());
        cleanup_temp(&path);
    }
}
