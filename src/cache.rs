// ABOUTME: Content-addressed on-disk artifact cache backed by sqlite

use crate::config::VERSION;
use crate::error::Diagnostic;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Hash of a module's source text; with the compiler version it keys
/// artifact reuse across sessions
pub fn hash_source(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// A cached compile result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub code: String,
    pub map_json: String,
    pub exports: Vec<String>,
}

pub struct ArtifactCache {
    conn: Connection,
}

impl ArtifactCache {
    /// Open (creating if needed) the store under `dir`. Rows written by
    /// other compiler versions are purged lazily here.
    pub fn open(dir: &Path) -> Result<Self, Diagnostic> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Diagnostic::resolve(dir.display().to_string(), e.to_string()))?;
        let db_path = dir.join("artifacts.db");
        let conn = Connection::open(&db_path)
            .map_err(|e| Diagnostic::resolve(db_path.display().to_string(), e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS artifacts (
                source_hash TEXT NOT NULL,
                compiler_version TEXT NOT NULL,
                code TEXT NOT NULL,
                map_json TEXT NOT NULL,
                exports TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (source_hash, compiler_version)
            );",
        )
        .map_err(|e| Diagnostic::resolve("artifact cache", e.to_string()))?;
        let purged = conn
            .execute(
                "DELETE FROM artifacts WHERE compiler_version != ?1",
                params![VERSION],
            )
            .unwrap_or(0);
        if purged > 0 {
            debug!(purged, "purged stale cache rows");
        }
        Ok(ArtifactCache { conn })
    }

    pub fn lookup(&self, source_hash: &str) -> Option<CachedArtifact> {
        self.conn
            .query_row(
                "SELECT code, map_json, exports FROM artifacts
                 WHERE source_hash = ?1 AND compiler_version = ?2",
                params![source_hash, VERSION],
                |row| {
                    let exports_json: String = row.get(2)?;
                    Ok(CachedArtifact {
                        code: row.get(0)?,
                        map_json: row.get(1)?,
                        exports: serde_json::from_str(&exports_json).unwrap_or_default(),
                    })
                },
            )
            .optional()
            .ok()
            .flatten()
    }

    pub fn store(&self, source_hash: &str, artifact: &CachedArtifact) -> Result<(), Diagnostic> {
        let exports_json =
            serde_json::to_string(&artifact.exports).expect("export names serialize");
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.conn
            .execute(
                "INSERT OR REPLACE INTO artifacts
                 (source_hash, compiler_version, code, map_json, exports, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![source_hash, VERSION, artifact.code, artifact.map_json, exports_json, now],
            )
            .map_err(|e| Diagnostic::resolve("artifact cache", e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_distinct() {
        let a = hash_source("(let x 1)");
        let b = hash_source("(let x 1)");
        let c = hash_source("(let x 2)");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_store_and_lookup_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(dir.path()).unwrap();
        let artifact = CachedArtifact {
            code: "let x;\nx = 1;\n".to_string(),
            map_json: "{}".to_string(),
            exports: vec!["x".to_string()],
        };
        let hash = hash_source("(let x 1)");
        cache.store(&hash, &artifact).unwrap();
        assert_eq!(cache.lookup(&hash), Some(artifact));
        assert_eq!(cache.lookup(&hash_source("(other)")), None);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let hash = hash_source("persist me");
        {
            let cache = ArtifactCache::open(dir.path()).unwrap();
            cache
                .store(
                    &hash,
                    &CachedArtifact {
                        code: "code".to_string(),
                        map_json: "{}".to_string(),
                        exports: Vec::new(),
                    },
                )
                .unwrap();
        }
        let cache = ArtifactCache::open(dir.path()).unwrap();
        assert!(cache.lookup(&hash).is_some());
    }
}
