//! Local persistent store for key pairs and contacts.
//!
//! Records are JSON values addressed by `(store, id)`. Every record is keyed
//! independently, so writers to different ids never clobber each other.
//!
//! Two backends:
//!   - **MemoryStore**: process-local, used by tests and ephemeral sessions.
//!   - **JsonFileStore**: one `<store>.json` file per store under a root
//!     directory, rewritten atomically via temp+rename.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{HushError, HushResult};

/// Store holding vault key pairs
pub const KEYPAIR_STORE: &str = "keypairs";
/// Store holding imported directory contacts
pub const CONTACT_STORE: &str = "contacts";

pub trait LocalStore: Send + Sync {
    fn get(&self, store: &str, id: &str) -> HushResult<Option<Value>>;
    fn put(&self, store: &str, id: &str, value: Value) -> HushResult<()>;
    /// Returns whether a record was removed.
    fn delete(&self, store: &str, id: &str) -> HushResult<bool>;
    /// All records of one store, ordered by id.
    fn list(&self, store: &str) -> HushResult<Vec<(String, Value)>>;
}

impl<S: LocalStore + ?Sized> LocalStore for Arc<S> {
    fn get(&self, store: &str, id: &str) -> HushResult<Option<Value>> {
        (**self).get(store, id)
    }
    fn put(&self, store: &str, id: &str, value: Value) -> HushResult<()> {
        (**self).put(store, id, value)
    }
    fn delete(&self, store: &str, id: &str) -> HushResult<bool> {
        (**self).delete(store, id)
    }
    fn list(&self, store: &str) -> HushResult<Vec<(String, Value)>> {
        (**self).list(store)
    }
}

/// Read a record and deserialize it.
pub fn get_typed<S, T>(store: &S, name: &str, id: &str) -> HushResult<Option<T>>
where
    S: LocalStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get(name, id)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize a record and write it.
pub fn put_typed<S, T>(store: &S, name: &str, id: &str, record: &T) -> HushResult<()>
where
    S: LocalStore + ?Sized,
    T: Serialize,
{
    store.put(name, id, serde_json::to_value(record)?)
}

/// Read and deserialize every record of a store.
pub fn list_typed<S, T>(store: &S, name: &str) -> HushResult<Vec<T>>
where
    S: LocalStore + ?Sized,
    T: DeserializeOwned,
{
    store
        .list(name)?
        .into_iter()
        .map(|(_, value)| serde_json::from_value(value).map_err(HushError::from))
        .collect()
}

type StoreMap = BTreeMap<String, Value>;

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    stores: Mutex<BTreeMap<String, StoreMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> HushResult<std::sync::MutexGuard<'_, BTreeMap<String, StoreMap>>> {
        self.stores
            .lock()
            .map_err(|_| HushError::Store("memory store lock poisoned".into()))
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, store: &str, id: &str) -> HushResult<Option<Value>> {
        Ok(self.lock()?.get(store).and_then(|s| s.get(id)).cloned())
    }

    fn put(&self, store: &str, id: &str, value: Value) -> HushResult<()> {
        self.lock()?
            .entry(store.to_string())
            .or_default()
            .insert(id.to_string(), value);
        Ok(())
    }

    fn delete(&self, store: &str, id: &str) -> HushResult<bool> {
        Ok(self
            .lock()?
            .get_mut(store)
            .map(|s| s.remove(id).is_some())
            .unwrap_or(false))
    }

    fn list(&self, store: &str) -> HushResult<Vec<(String, Value)>> {
        Ok(self
            .lock()?
            .get(store)
            .map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

/// File-backed store: `<root>/<store>.json` per store
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles across all stores
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(root: &Path) -> HushResult<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_path(&self, store: &str) -> HushResult<PathBuf> {
        let valid = !store.is_empty()
            && store
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(HushError::Store(format!("invalid store name: {store:?}")));
        }
        Ok(self.root.join(format!("{store}.json")))
    }

    fn read_store(&self, store: &str) -> HushResult<StoreMap> {
        let path = self.store_path(store)?;
        if !path.exists() {
            return Ok(StoreMap::new());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| HushError::Store(format!("parsing {}: {e}", path.display())))
    }

    fn write_store(&self, store: &str, map: &StoreMap) -> HushResult<()> {
        let path = self.store_path(store)?;
        let json = serde_json::to_string_pretty(map)?;

        // Atomic write: write to temp file, then rename
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn modify<R>(&self, store: &str, f: impl FnOnce(&mut StoreMap) -> R) -> HushResult<R> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| HushError::Store("file store lock poisoned".into()))?;
        let mut map = self.read_store(store)?;
        let result = f(&mut map);
        self.write_store(store, &map)?;
        Ok(result)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> HushResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> HushResult<()> {
    Ok(())
}

impl LocalStore for JsonFileStore {
    fn get(&self, store: &str, id: &str) -> HushResult<Option<Value>> {
        Ok(self.read_store(store)?.remove(id))
    }

    fn put(&self, store: &str, id: &str, value: Value) -> HushResult<()> {
        self.modify(store, |map| {
            map.insert(id.to_string(), value);
        })
    }

    fn delete(&self, store: &str, id: &str) -> HushResult<bool> {
        self.modify(store, |map| map.remove(id).is_some())
    }

    fn list(&self, store: &str) -> HushResult<Vec<(String, Value)>> {
        Ok(self.read_store(store)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    fn exercise(store: &dyn LocalStore) {
        assert!(store.get(CONTACT_STORE, "alice").unwrap().is_none());

        store.put(CONTACT_STORE, "alice", json!({"n": 1})).unwrap();
        store.put(CONTACT_STORE, "bob", json!({"n": 2})).unwrap();
        store.put(KEYPAIR_STORE, "alice", json!({"n": 3})).unwrap();

        assert_eq!(store.get(CONTACT_STORE, "alice").unwrap(), Some(json!({"n": 1})));
        // Same id in a different store is a different record
        assert_eq!(store.get(KEYPAIR_STORE, "alice").unwrap(), Some(json!({"n": 3})));

        let ids: Vec<String> = store
            .list(CONTACT_STORE)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["alice", "bob"]);

        assert!(store.delete(CONTACT_STORE, "alice").unwrap());
        assert!(!store.delete(CONTACT_STORE, "alice").unwrap());
        assert!(store.get(CONTACT_STORE, "alice").unwrap().is_none());
        assert!(store.get(CONTACT_STORE, "bob").unwrap().is_some());
        assert!(store.get(KEYPAIR_STORE, "alice").unwrap().is_some());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&JsonFileStore::open(dir.path()).unwrap());
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).unwrap();
            put_typed(&store, CONTACT_STORE, "carol", &Note { body: "hi".into() }).unwrap();
        }
        let reopened = JsonFileStore::open(dir.path()).unwrap();
        let note: Option<Note> = get_typed(&reopened, CONTACT_STORE, "carol").unwrap();
        assert_eq!(note, Some(Note { body: "hi".into() }));
    }

    #[test]
    fn test_json_file_store_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.put("../escape", "x", json!(null)),
            Err(HushError::Store(_))
        ));
    }

    #[test]
    fn test_list_typed() {
        let store = MemoryStore::new();
        put_typed(&store, "notes", "b", &Note { body: "two".into() }).unwrap();
        put_typed(&store, "notes", "a", &Note { body: "one".into() }).unwrap();
        let notes: Vec<Note> = list_typed(&store, "notes").unwrap();
        assert_eq!(notes[0].body, "one");
        assert_eq!(notes[1].body, "two");
    }
}
