use crate::{fsync_dir, StateError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Current on-disk checkpoint format. Incremented on incompatible changes.
pub const STATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    format_version: u32,
    saved_at: String,
    data: BTreeMap<String, Value>,
    /// blake3 over the compact JSON of `data`. Required on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

fn data_checksum(data: &BTreeMap<String, Value>) -> Result<String, StateError> {
    let json = serde_json::to_string(data)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

#[derive(Default)]
struct StateData {
    entries: BTreeMap<String, Value>,
    modified: bool,
}

/// Key/value document store shared by every manager.
///
/// Values are stored as JSON so managers can persist their own types without
/// the store knowing about them. All access goes through [`StateStore::lock`].
pub struct StateStore {
    path: Option<PathBuf>,
    data: Mutex<StateData>,
}

impl StateStore {
    /// A store that lives only in memory; `checkpoint` never writes anything.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(StateData::default()),
        }
    }

    /// Open the store backed by `path`, loading the last checkpoint if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path: PathBuf = path.into();
        let entries = if path.exists() {
            let entries = load_checkpoint(&path)?;
            info!(
                "loaded state from {} ({} entries)",
                path.display(),
                entries.len()
            );
            entries
        } else {
            debug!("no state at {}; starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            data: Mutex::new(StateData {
                entries,
                modified: false,
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exclusive access to the documents. Hold the guard only briefly.
    pub fn lock(&self) -> StateGuard<'_> {
        StateGuard {
            data: self.data.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn is_modified(&self) -> bool {
        self.lock().is_modified()
    }

    /// Persist the documents if they changed since the last checkpoint.
    ///
    /// Returns `true` when a file was written. The store lock is held for the
    /// whole write so the checkpoint reflects a single consistent view.
    pub fn checkpoint(&self) -> Result<bool, StateError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };
        let mut guard = self.lock();
        if !guard.data.modified {
            return Ok(false);
        }

        let checkpoint = Checkpoint {
            format_version: STATE_FORMAT_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            checksum: Some(data_checksum(&guard.data.entries)?),
            data: guard.data.entries.clone(),
        };
        write_checkpoint(path, &checkpoint)?;
        guard.data.modified = false;
        debug!(
            "checkpointed {} state entries to {}",
            checkpoint.data.len(),
            path.display()
        );
        Ok(true)
    }
}

fn load_checkpoint(path: &Path) -> Result<BTreeMap<String, Value>, StateError> {
    let content = fs::read_to_string(path)?;
    let checkpoint: Checkpoint = serde_json::from_str(&content)?;

    if checkpoint.format_version != STATE_FORMAT_VERSION {
        return Err(StateError::VersionMismatch {
            expected: STATE_FORMAT_VERSION,
            found: checkpoint.format_version,
        });
    }
    let Some(expected) = checkpoint.checksum else {
        return Err(StateError::MissingChecksum(path.display().to_string()));
    };
    let actual = data_checksum(&checkpoint.data)?;
    if actual != expected {
        return Err(StateError::IntegrityFailure {
            path: path.display().to_string(),
            expected,
            actual,
        });
    }
    Ok(checkpoint.data)
}

fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let content = serde_json::to_string_pretty(checkpoint)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StateError::Io(e.error))?;
    fsync_dir(&dir)?;
    Ok(())
}

/// Locked view of the store returned by [`StateStore::lock`].
pub struct StateGuard<'a> {
    data: MutexGuard<'a, StateData>,
}

impl StateGuard<'_> {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        match self.data.entries.get(key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StateError> {
        let value = serde_json::to_value(value)?;
        self.data.entries.insert(key.to_owned(), value);
        self.data.modified = true;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.data.entries.remove(key).is_some();
        if removed {
            self.data.modified = true;
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.entries.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.data.modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Service {
        name: String,
        enabled: bool,
    }

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        (dir, path)
    }

    #[test]
    fn set_and_get_typed_values() {
        let store = StateStore::in_memory();
        let svc = Service {
            name: "sshd".to_owned(),
            enabled: true,
        };
        store.lock().set("services/sshd", &svc).unwrap();

        let st = store.lock();
        assert_eq!(st.get::<Service>("services/sshd").unwrap(), Some(svc));
        assert_eq!(st.get::<Service>("services/missing").unwrap(), None);
        assert!(st.is_modified());
    }

    #[test]
    fn get_with_wrong_type_fails() {
        let store = StateStore::in_memory();
        store.lock().set("count", &3u32).unwrap();
        assert!(store.lock().get::<Service>("count").is_err());
    }

    #[test]
    fn remove_marks_modified_only_when_present() {
        let (_dir, path) = setup();
        let store = StateStore::open(&path).unwrap();
        assert!(!store.lock().remove("nothing"));
        assert!(!store.is_modified());

        store.lock().set("k", "v").unwrap();
        store.checkpoint().unwrap();
        assert!(store.lock().remove("k"));
        assert!(store.is_modified());
    }

    #[test]
    fn in_memory_checkpoint_is_noop() {
        let store = StateStore::in_memory();
        store.lock().set("k", &1).unwrap();
        assert!(!store.checkpoint().unwrap());
        assert!(store.path().is_none());
    }

    #[test]
    fn checkpoint_and_reopen() {
        let (_dir, path) = setup();
        let store = StateStore::open(&path).unwrap();
        {
            let mut st = store.lock();
            st.set("boot/slot", "a").unwrap();
            st.set("ensure/interval", &300u64).unwrap();
        }
        assert!(store.checkpoint().unwrap());
        assert!(!store.is_modified());
        assert!(!store.checkpoint().unwrap(), "unchanged state is not rewritten");

        let reopened = StateStore::open(&path).unwrap();
        let st = reopened.lock();
        assert_eq!(st.get::<String>("boot/slot").unwrap().as_deref(), Some("a"));
        assert_eq!(st.get::<u64>("ensure/interval").unwrap(), Some(300));
        assert_eq!(st.keys().collect::<Vec<_>>(), ["boot/slot", "ensure/interval"]);
        assert!(!st.is_modified());
    }

    #[test]
    fn checkpoint_leaves_no_temp_files() {
        let (dir, path) = setup();
        let store = StateStore::open(&path).unwrap();
        store.lock().set("k", "v").unwrap();
        store.checkpoint().unwrap();

        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files, [std::ffi::OsString::from("state.json")]);
    }

    #[test]
    fn tampered_checkpoint_is_rejected() {
        let (_dir, path) = setup();
        let store = StateStore::open(&path).unwrap();
        store.lock().set("owner", "alice").unwrap();
        store.checkpoint().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("alice", "mallory")).unwrap();

        match StateStore::open(&path) {
            Err(StateError::IntegrityFailure { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("tampered state must not load"),
        }
    }

    #[test]
    fn future_format_version_is_rejected() {
        let (_dir, path) = setup();
        fs::write(
            &path,
            r#"{"format_version": 99, "saved_at": "2026-01-01T00:00:00Z", "data": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            StateStore::open(&path),
            Err(StateError::VersionMismatch {
                expected: STATE_FORMAT_VERSION,
                found: 99
            })
        ));
    }

    #[test]
    fn checkpoint_without_checksum_is_rejected() {
        let (_dir, path) = setup();
        let store = StateStore::open(&path).unwrap();
        store.lock().set("owner", "alice").unwrap();
        store.checkpoint().unwrap();

        let mut raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        raw.as_object_mut().unwrap().remove("checksum");
        raw["data"]["owner"] = Value::from("mallory");
        fs::write(&path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();

        assert!(matches!(
            StateStore::open(&path),
            Err(StateError::MissingChecksum(_))
        ));
    }

    #[test]
    fn corrupt_json_is_a_serialization_error() {
        let (_dir, path) = setup();
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            StateStore::open(&path),
            Err(StateError::Serialization(_))
        ));
    }
}
