use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Durable key/value storage for cache artifacts.
///
/// There is no locking: concurrent writers to the same name race and the
/// last write wins.
pub trait CacheStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    /// Read an entry. `Ok(None)` when nothing is stored under `name`.
    fn read(&self, name: &str) -> io::Result<Option<String>>;

    /// Store `content` under `name`, replacing what was there. Readers see
    /// either the old or the new content, never a partial write.
    fn write(&self, name: &str, content: &str) -> io::Result<()>;

    /// When the entry was last written, if the store tracks it.
    fn modified(&self, _name: &str) -> Option<DateTime<Utc>> {
        None
    }
}

/// Cache store backed by one file per entry in a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Sibling file a write goes to before it is renamed into place.
    fn staging_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!(".{}.tmp", name))
    }
}

impl CacheStore for FileCache {
    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn read(&self, name: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, name: &str, content: &str) -> io::Result<()> {
        let staging = self.staging_path(name);
        std::fs::write(&staging, content)?;
        if let Err(e) = std::fs::rename(&staging, self.path(name)) {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
        Ok(())
    }

    fn modified(&self, name: &str) -> Option<DateTime<Utc>> {
        let meta = std::fs::metadata(self.path(name)).ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf()).unwrap();

        assert!(!cache.exists("calendar.json"));
        assert_eq!(cache.read("calendar.json").unwrap(), None);
    }

    #[test]
    fn test_write_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf()).unwrap();

        cache.write("calendar.md5", "first").unwrap();
        cache.write("calendar.md5", "second").unwrap();

        assert!(cache.exists("calendar.md5"));
        assert_eq!(cache.read("calendar.md5").unwrap().as_deref(), Some("second"));
        assert!(cache.modified("calendar.md5").is_some());
    }

    #[test]
    fn test_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf()).unwrap();

        cache.write("vertretungsplan.json", "{}").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["vertretungsplan.json".to_string()]);
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf()).unwrap();
        cache.write("calendar.json", "old").unwrap();

        // A directory in the staging spot makes the write fail
        std::fs::create_dir(dir.path().join(".calendar.json.tmp")).unwrap();
        assert!(cache.write("calendar.json", "new").is_err());

        assert_eq!(cache.read("calendar.json").unwrap().as_deref(), Some("old"));
    }

    #[test]
    fn test_new_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = FileCache::new(nested.clone()).unwrap();
        assert!(nested.is_dir());
        assert_eq!(cache.dir(), nested.as_path());
    }
}
