use crate::IndexSnapshot;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Storage capability for index snapshots.
pub trait IndexStore: Send + Sync {
    fn save(&self, snapshot: &IndexSnapshot) -> Result<()>;
    /// Absent or unreadable data loads as an empty snapshot.
    fn load(&self) -> Result<IndexSnapshot>;
}

/// `{ term: [[docId, freq], ...] }` JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl IndexStore for JsonFileStore {
    fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock();
        write_json_atomic(&self.path, snapshot)
    }

    fn load(&self) -> Result<IndexSnapshot> {
        let _guard = self.write_lock.lock();
        Ok(read_json_or_default(&self.path))
    }
}

/// Serialize to `<path>.tmp`, fsync, then rename over `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = tmp_path(path);
    let written = (|| -> Result<()> {
        let mut out = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut out, value)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(())
    })();
    if let Err(e) = written {
        fs::remove_file(&tmp).ok();
        return Err(e.context(format!("writing {}", tmp.display())));
    }
    fs::rename(&tmp, path).with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Missing or corrupt files yield `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable file, starting empty");
            return T::default();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt file, starting empty");
            T::default()
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Posting;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(JsonFileStore::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn writes_term_to_pair_arrays() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/index.json");
        let store = JsonFileStore::new(&path);
        let mut snap = IndexSnapshot::new();
        snap.insert("python".into(), vec![Posting::new("d1", 2), Posting::new("d2", 1)]);
        store.save(&snap).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "python": [["d1", 2], ["d2", 1]] }));
        assert!(!tmp_path(&path).exists());
        assert_eq!(store.load().unwrap(), snap);
    }
}
