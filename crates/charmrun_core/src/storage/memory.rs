//! Ephemeral in-memory backend for single-run use and tests.

use super::{Storage, StorageResult};
use crate::codec::{decode, encode};
use crate::model::value::Value;
use std::collections::HashMap;

/// Process-local map of encoded documents; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        match self.documents.get(key) {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: &Value) -> StorageResult<()> {
        let document = encode(value)?;
        self.documents.insert(key.to_string(), document);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<()> {
        self.documents.remove(key);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorage;
    use crate::model::value::Value;
    use crate::storage::Storage;

    #[test]
    fn set_get_delete_cycle() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").expect("get"), None);

        storage
            .set("Charm/_stored", &Value::map([("ready", true)]))
            .expect("set");
        assert_eq!(
            storage.get("Charm/_stored").expect("get"),
            Some(Value::map([("ready", true)]))
        );

        storage.delete("Charm/_stored").expect("delete");
        storage.delete("Charm/_stored").expect("deleting twice is fine");
        assert!(storage.is_empty());
    }
}
