use super::util::embed_cache_key;
use crate::errors::Result;
use crate::storage::Store;
use moka::sync::Cache;
use std::sync::Arc;

pub type Embedding = Arc<Vec<f32>>;

/// Two-level `(model, text) -> vector` cache: a bounded in-process map, optionally
/// backed by the SQLite store so vectors survive across runs.
///
/// Purely an optimization. Entries are immutable once written and the same key
/// always maps to the same vector, so racing writers are harmless.
#[derive(Clone)]
pub struct EmbeddingCache {
    memory: Cache<String, Embedding>,
    disk: Option<Store>,
}

impl EmbeddingCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            memory: Cache::new(max_entries),
            disk: None,
        }
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.disk = Some(store);
        self
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    pub fn get(&self, model: &str, text: &str) -> Result<Option<Embedding>> {
        let key = embed_cache_key(model, text);
        if let Some(v) = self.memory.get(&key) {
            return Ok(Some(v));
        }
        let Some(store) = &self.disk else {
            return Ok(None);
        };
        match store.get_embedding(&key)? {
            Some((_, vec)) => {
                let v: Embedding = Arc::new(vec);
                self.memory.insert(key, v.clone());
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    pub fn put(&self, model: &str, text: &str, vector: Embedding) -> Result<()> {
        let key = embed_cache_key(model, text);
        if let Some(store) = &self.disk {
            store.put_embedding(&key, model, &vector)?;
        }
        self.memory.insert(key, vector);
        Ok(())
    }

    /// Drops every in-process entry and, when present, the on-disk rows.
    pub fn clear(&self) -> Result<()> {
        self.memory.invalidate_all();
        self.memory.run_pending_tasks();
        if let Some(store) = &self.disk {
            store.clear_embeddings()?;
        }
        Ok(())
    }

    pub fn memory_len(&self) -> u64 {
        self.memory.run_pending_tasks();
        self.memory.entry_count()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_hit_after_put() -> anyhow::Result<()> {
        let c = EmbeddingCache::new(16);
        assert!(c.get("m", "hello")?.is_none());
        c.put("m", "hello", Arc::new(vec![1.0, 2.0]))?;
        assert_eq!(c.get("m", "hello")?.as_deref(), Some(&vec![1.0, 2.0]));
        assert!(c.get("other", "hello")?.is_none());
        Ok(())
    }

    #[test]
    fn disk_layer_survives_new_memory_layer() -> anyhow::Result<()> {
        let store = Store::memory()?;
        store.init_schema()?;

        let first = EmbeddingCache::new(16).with_store(store.clone());
        first.put("m", "persisted", Arc::new(vec![0.25]))?;

        let second = EmbeddingCache::new(16).with_store(store);
        assert_eq!(second.get("m", "persisted")?.as_deref(), Some(&vec![0.25]));

        second.clear()?;
        assert!(second.get("m", "persisted")?.is_none());
        Ok(())
    }
}
