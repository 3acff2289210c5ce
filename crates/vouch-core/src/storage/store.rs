use crate::embeddings::util::{decode_vec_f32, encode_vec_f32};
use crate::errors::{EvalError, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite-backed persistence for the on-disk embedding cache.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| {
            EvalError::Storage(format!("failed to open sqlite db {}: {}", path.display(), e))
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn get_embedding(&self, key: &str) -> Result<Option<(String, Vec<f32>)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT model, vec FROM embeddings WHERE key = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![key])?;

        if let Some(row) = rows.next()? {
            let model: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let vec = decode_vec_f32(&blob)?;
            Ok(Some((model, vec)))
        } else {
            Ok(None)
        }
    }

    pub fn put_embedding(&self, key: &str, model: &str, vec: &[f32]) -> Result<()> {
        let conn = self.conn();
        let blob = encode_vec_f32(vec);
        let dims = vec.len() as i64;
        let created_at = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO embeddings (key, model, dims, vec, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, model, dims, blob, created_at],
        )?;
        Ok(())
    }

    pub fn count_embeddings(&self) -> Result<u64> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn clear_embeddings(&self) -> Result<u64> {
        let n = self.conn().execute("DELETE FROM embeddings", [])?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_roundtrip_in_memory() -> anyhow::Result<()> {
        let store = Store::memory()?;
        store.init_schema()?;
        assert!(store.get_embedding("k")?.is_none());

        store.put_embedding("k", "m", &[0.5, -1.0])?;
        let (model, v) = store.get_embedding("k")?.expect("stored");
        assert_eq!(model, "m");
        assert_eq!(v, vec![0.5, -1.0]);
        assert_eq!(store.count_embeddings()?, 1);

        assert_eq!(store.clear_embeddings()?, 1);
        assert_eq!(store.count_embeddings()?, 0);
        Ok(())
    }
}
