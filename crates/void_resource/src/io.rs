//! Filesystem contract
//!
//! The subsystem never touches `std::fs` directly. Loaders and savers read and
//! write through a [`FileSystem`], which maps `res://` and `user://` paths onto
//! real storage. [`MemoryFileSystem`] backs tests and tools.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::error::{ResourceError, ResourceResult};
use crate::path::{PathOrigin, ResourcePath};

/// Random-access byte stream
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Byte-oriented file access used by the whole subsystem
pub trait FileSystem: Send + Sync {
    /// Open a file for random-access reading
    fn open_read(&self, path: &ResourcePath) -> ResourceResult<Box<dyn ReadSeek>>;

    /// Replace the contents of a file, creating parent directories
    fn write_all(&self, path: &ResourcePath, data: &[u8]) -> ResourceResult<()>;

    /// Check if a file exists
    fn exists(&self, path: &ResourcePath) -> bool;

    /// File size in bytes
    fn size(&self, path: &ResourcePath) -> ResourceResult<u64>;

    /// Modification time in seconds since the epoch
    fn modified_time(&self, path: &ResourcePath) -> ResourceResult<u64>;

    /// Entries directly inside `dir`; directories carry a trailing `/`
    fn list_dir(&self, dir: &ResourcePath) -> ResourceResult<Vec<String>>;

    /// Read a whole file
    fn read_all(&self, path: &ResourcePath) -> ResourceResult<Vec<u8>> {
        let mut file = self.open_read(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| ResourceError::from_io(path.as_str(), e))?;
        Ok(data)
    }

    /// Read a whole file as UTF-8
    fn read_string(&self, path: &ResourcePath) -> ResourceResult<String> {
        let data = self.read_all(path)?;
        String::from_utf8(data).map_err(|e| ResourceError::parse(path.as_str(), format!("Invalid UTF-8: {}", e)))
    }

    /// Every file below `dir`, recursively, as full paths
    fn walk(&self, dir: &ResourcePath) -> ResourceResult<Vec<ResourcePath>> {
        let mut out = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            for entry in self.list_dir(&current)? {
                if let Some(sub) = entry.strip_suffix('/') {
                    pending.push(current.join(sub));
                } else {
                    out.push(current.join(&entry));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Filesystem backed by the OS, rooted at a project and a user directory
#[derive(Debug, Clone)]
pub struct OsFileSystem {
    project_root: PathBuf,
    user_root: PathBuf,
}

impl OsFileSystem {
    /// Create a filesystem; `res://` maps to `project_root`, `user://` to
    /// `user_root`
    pub fn new(project_root: impl Into<PathBuf>, user_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            user_root: user_root.into(),
        }
    }

    /// Map a resource path to an OS path
    pub fn os_path(&self, path: &ResourcePath) -> PathBuf {
        match path.origin() {
            PathOrigin::Project => self.project_root.join(path.relative()),
            PathOrigin::User => self.user_root.join(path.relative()),
            PathOrigin::Absolute => PathBuf::from(path.as_str()),
        }
    }

    /// Map an OS path under the project root back to a `res://` path
    pub fn resource_path(&self, os_path: &std::path::Path) -> Option<ResourcePath> {
        let rel = os_path.strip_prefix(&self.project_root).ok()?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        Some(ResourcePath::new(format!("res://{}", rel)))
    }

    /// Project root directory
    pub fn project_root(&self) -> &std::path::Path {
        &self.project_root
    }
}

impl FileSystem for OsFileSystem {
    fn open_read(&self, path: &ResourcePath) -> ResourceResult<Box<dyn ReadSeek>> {
        let file = std::fs::File::open(self.os_path(path))
            .map_err(|e| ResourceError::from_io(path.as_str(), e))?;
        Ok(Box::new(std::io::BufReader::new(file)))
    }

    fn write_all(&self, path: &ResourcePath, data: &[u8]) -> ResourceResult<()> {
        let os_path = self.os_path(path);
        if let Some(parent) = os_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResourceError::from_io(path.as_str(), e))?;
        }
        std::fs::write(&os_path, data).map_err(|e| ResourceError::from_io(path.as_str(), e))
    }

    fn exists(&self, path: &ResourcePath) -> bool {
        self.os_path(path).is_file()
    }

    fn size(&self, path: &ResourcePath) -> ResourceResult<u64> {
        std::fs::metadata(self.os_path(path))
            .map(|m| m.len())
            .map_err(|e| ResourceError::from_io(path.as_str(), e))
    }

    fn modified_time(&self, path: &ResourcePath) -> ResourceResult<u64> {
        let modified = std::fs::metadata(self.os_path(path))
            .and_then(|m| m.modified())
            .map_err(|e| ResourceError::from_io(path.as_str(), e))?;
        Ok(modified.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0))
    }

    fn list_dir(&self, dir: &ResourcePath) -> ResourceResult<Vec<String>> {
        let mut entries = Vec::new();
        let read = std::fs::read_dir(self.os_path(dir)).map_err(|e| ResourceError::from_io(dir.as_str(), e))?;
        for entry in read {
            let entry = entry.map_err(|e| ResourceError::from_io(dir.as_str(), e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() {
                entries.push(format!("{}/", name));
            } else {
                entries.push(name);
            }
        }
        entries.sort();
        Ok(entries)
    }
}

struct MemoryFile {
    data: Vec<u8>,
    modified: u64,
}

/// In-memory filesystem
#[derive(Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<ResourcePath, MemoryFile>>,
}

impl MemoryFileSystem {
    /// Create an empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file, stamping it with the current time
    pub fn insert(&self, path: impl Into<ResourcePath>, data: impl Into<Vec<u8>>) {
        let modified = now_secs();
        self.insert_with_time(path, data, modified);
    }

    /// Insert or replace a file with an explicit timestamp
    pub fn insert_with_time(&self, path: impl Into<ResourcePath>, data: impl Into<Vec<u8>>, modified: u64) {
        self.files.write().insert(
            path.into(),
            MemoryFile {
                data: data.into(),
                modified,
            },
        );
    }

    /// Remove a file
    pub fn remove(&self, path: &ResourcePath) -> bool {
        self.files.write().remove(path).is_some()
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl FileSystem for MemoryFileSystem {
    fn open_read(&self, path: &ResourcePath) -> ResourceResult<Box<dyn ReadSeek>> {
        let files = self.files.read();
        let file = files
            .get(path)
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(file.data.clone())))
    }

    fn write_all(&self, path: &ResourcePath, data: &[u8]) -> ResourceResult<()> {
        self.insert(path.clone(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &ResourcePath) -> bool {
        self.files.read().contains_key(path)
    }

    fn size(&self, path: &ResourcePath) -> ResourceResult<u64> {
        self.files
            .read()
            .get(path)
            .map(|f| f.data.len() as u64)
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))
    }

    fn modified_time(&self, path: &ResourcePath) -> ResourceResult<u64> {
        self.files
            .read()
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))
    }

    fn list_dir(&self, dir: &ResourcePath) -> ResourceResult<Vec<String>> {
        let prefix = if dir.as_str().ends_with('/') {
            dir.as_str().to_string()
        } else {
            format!("{}/", dir.as_str())
        };
        let mut entries: Vec<String> = Vec::new();
        for path in self.files.read().keys() {
            if let Some(rest) = path.as_str().strip_prefix(&prefix) {
                let entry = match rest.find('/') {
                    Some(idx) => format!("{}/", &rest[..idx]),
                    None => rest.to_string(),
                };
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fs_roundtrip() {
        let fs = MemoryFileSystem::new();
        let path = ResourcePath::new("res://a/b.txt");
        fs.insert_with_time(path.clone(), b"hello".to_vec(), 42);

        assert!(fs.exists(&path));
        assert_eq!(fs.read_all(&path).unwrap(), b"hello");
        assert_eq!(fs.size(&path).unwrap(), 5);
        assert_eq!(fs.modified_time(&path).unwrap(), 42);
        assert_eq!(
            fs.read_all(&ResourcePath::new("res://missing")),
            Err(ResourceError::NotFound("res://missing".into()))
        );
    }

    #[test]
    fn test_memory_fs_listing() {
        let fs = MemoryFileSystem::new();
        fs.insert("res://a/one.txt", b"1".to_vec());
        fs.insert("res://a/sub/two.txt", b"2".to_vec());
        fs.insert("res://b.txt", b"3".to_vec());

        let listing = fs.list_dir(&ResourcePath::new("res://a")).unwrap();
        assert_eq!(listing, vec!["one.txt".to_string(), "sub/".to_string()]);

        let all = fs.walk(&ResourcePath::new("res://")).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&ResourcePath::new("res://a/sub/two.txt")));
    }

    #[test]
    fn test_os_fs() {
        let project = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        let fs = OsFileSystem::new(project.path(), user.path());

        let path = ResourcePath::new("res://dir/file.bin");
        fs.write_all(&path, &[1, 2, 3]).unwrap();
        assert!(fs.exists(&path));
        assert_eq!(fs.read_all(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(fs.size(&path).unwrap(), 3);
        assert!(fs.modified_time(&path).unwrap() > 0);
        assert_eq!(fs.list_dir(&ResourcePath::new("res://dir")).unwrap(), vec!["file.bin".to_string()]);

        let os_path = fs.os_path(&path);
        assert_eq!(fs.resource_path(&os_path), Some(path));

        let save = ResourcePath::new("user://slot.sav");
        fs.write_all(&save, b"x").unwrap();
        assert!(user.path().join("slot.sav").is_file());
    }
}
